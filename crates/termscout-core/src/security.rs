/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Wrap a raw value as a secret, treating blank values as absent.
pub fn optional_secret(raw: Option<String>) -> Option<SecretValue> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(SecretValue)
}
