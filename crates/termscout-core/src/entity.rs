//! Entity extraction from free-form terms & conditions requests.
//!
//! Rules are tried in order against a lower-cased copy of the request and the
//! first capture wins. Strict T&C phrasing comes first; the looser fallback
//! rules only run when none of the primary rules matched.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Requests shown to the user when no entity could be identified.
pub const EXAMPLE_QUERIES: [&str; 3] = [
    "What are the terms and conditions for Netflix?",
    "Show me the T&C for Spotify",
    "I need the terms for Amazon Prime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTier {
    Primary,
    Fallback,
}

/// A single capture rule. Group 1 of `pattern` is the entity span.
pub struct EntityRule {
    pub name: &'static str,
    pub tier: RuleTier,
    pattern: Regex,
}

impl EntityRule {
    fn new(name: &'static str, tier: RuleTier, pattern: &str) -> Self {
        Self {
            name,
            tier,
            pattern: Regex::new(pattern).expect("invalid entity rule regex"),
        }
    }

    /// Returns the raw (untrimmed) captured span, if the rule matches.
    pub fn try_match<'t>(&self, lowered: &'t str) -> Option<&'t str> {
        self.pattern
            .captures(lowered)
            .and_then(|caps| caps.get(1))
            .map(|span| span.as_str())
    }
}

// The `bare_terms` rule already accepts every query the two `request_*` rules
// accept, so those never fire. Kept in place so precedence stays as published.
static ENTITY_RULES: Lazy<Vec<EntityRule>> = Lazy::new(|| {
    vec![
        EntityRule::new(
            "bare_terms",
            RuleTier::Primary,
            r"(?:terms and conditions|terms & conditions|t&c|tos|terms of service|terms of use|terms) (?:for|of) ([^?.,]+)",
        ),
        EntityRule::new(
            "request_terms",
            RuleTier::Primary,
            r"(?:what are|show me|i need|find|get me) (?:the )?(?:terms and conditions|t&c|tos|terms) (?:for|of) ([^?.,]+)",
        ),
        EntityRule::new(
            "request_terms_question",
            RuleTier::Primary,
            r"(?:what are|show me|i need|find|get me) (?:the )?(?:terms and conditions|t&c|tos|terms) (?:for|of) ([^?.,]+)\?",
        ),
        EntityRule::new(
            "preposition",
            RuleTier::Fallback,
            r"(?:for|about|regarding) ([^?.,]+)",
        ),
        EntityRule::new(
            "request_before_terms",
            RuleTier::Fallback,
            r"(?:what are|show me|i need|find|get me) (?:the )?([^?.,]+) (?:terms and conditions|t&c|tos|terms)",
        ),
    ]
});

/// The ordered rule list used by [`extract_entity`].
pub fn entity_rules() -> &'static [EntityRule] {
    ENTITY_RULES.as_slice()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMatch {
    pub entity: String,
    pub rule: &'static str,
    pub tier: RuleTier,
}

/// Extract the company, product, or service name from a request.
///
/// `None` means no rule matched. A rule that captured only whitespace yields
/// `Some("")`.
pub fn extract_entity(text: &str) -> Option<String> {
    extract_entity_match(text).map(|found| found.entity)
}

/// Like [`extract_entity`] but also reports which rule produced the result.
pub fn extract_entity_match(text: &str) -> Option<EntityMatch> {
    let lowered = text.to_lowercase();

    let found = entity_rules().iter().find_map(|rule| {
        rule.try_match(&lowered).map(|span| EntityMatch {
            entity: span.trim().to_string(),
            rule: rule.name,
            tier: rule.tier,
        })
    });

    match &found {
        Some(found) => debug!(entity = %found.entity, rule = found.rule, "entity extracted"),
        None => debug!("no entity rule matched"),
    }

    found
}
