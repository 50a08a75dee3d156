use crate::config::AppConfig;
use crate::metrics;
use anyhow::Result;
use axum::response::sse::Event;
use dashmap::DashMap;
use serde::Serialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use termscout_core::{
    BackendSettings, ConfigLoader, CrewInputs, CrewOptions, CrewOutcome, CrewTemplates,
    SharedBackend, TermScoutError, create_backend, run_crew,
};
use tokio::sync::{Semaphore, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{self as stream, Stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const EMPTY_ENTITY_MESSAGE: &str = "Please enter a company, product, or service name.";

#[derive(Clone)]
pub struct AppState {
    report_service: Arc<ReportService>,
    assets_dir: Arc<PathBuf>,
    auth_token: Option<Arc<String>>,
}

impl AppState {
    /// Load the crew templates and connect the configured backend.
    pub fn try_new(config: &AppConfig) -> Result<Self> {
        let templates = ConfigLoader::load(Some(config.config_dir.clone()))?;
        let backend = create_backend(&config.backend)?;
        Ok(Self::with_backend(config, templates, backend))
    }

    pub fn with_backend(
        config: &AppConfig,
        templates: CrewTemplates,
        backend: SharedBackend,
    ) -> Self {
        let service = ReportService::new(
            templates,
            backend,
            config.backend.clone(),
            config.max_concurrency,
        );

        Self {
            report_service: Arc::new(service),
            assets_dir: Arc::new(config.assets_dir.clone()),
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
        }
    }

    pub fn report_service(&self) -> Arc<ReportService> {
        self.report_service.clone()
    }

    pub fn assets_dir(&self) -> Arc<PathBuf> {
        self.assets_dir.clone()
    }

    pub fn auth_token(&self) -> Option<Arc<String>> {
        self.auth_token.clone()
    }

    pub fn metrics(&self) -> ReportMetrics {
        self.report_service.metrics()
    }
}

/// Runs crews in the background and keeps their results in memory.
#[derive(Clone)]
pub struct ReportService {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    templates: Arc<CrewTemplates>,
    backend: SharedBackend,
    settings: Arc<BackendSettings>,
    reports: Arc<DashMap<String, ReportRecord>>,
    streams: Arc<DashMap<String, broadcast::Sender<ReportEvent>>>,
}

impl ReportService {
    pub fn new(
        templates: CrewTemplates,
        backend: SharedBackend,
        settings: BackendSettings,
        max_concurrency: usize,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            templates: Arc::new(templates),
            backend,
            settings: Arc::new(settings),
            reports: Arc::new(DashMap::new()),
            streams: Arc::new(DashMap::new()),
        }
    }

    /// Queue a crew run for `entity_name` and return its report id.
    ///
    /// Template problems surface here; backend failures are recorded on the report.
    pub fn start_report(&self, entity_name: &str) -> Result<String, TermScoutError> {
        let entity_name = entity_name.trim().to_string();
        if entity_name.is_empty() {
            return Err(TermScoutError::EntityNotIdentified);
        }

        let report_id = Uuid::new_v4().to_string();
        let options = CrewOptions::prepare(
            &self.templates,
            CrewInputs::new(&entity_name),
            self.backend.clone(),
            &self.settings,
        )?
        .with_session_id(report_id.clone());

        let sender = self
            .streams
            .entry(report_id.clone())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(32);
                tx
            })
            .clone();
        self.reports.insert(
            report_id.clone(),
            ReportRecord::Running {
                entity_name: entity_name.clone(),
                event: ReportEvent::started(&entity_name),
            },
        );

        let snapshot = self.metrics();
        metrics::report_started(
            &report_id,
            &entity_name,
            snapshot.running_reports,
            snapshot.available_permits,
        );

        let semaphore = self.semaphore.clone();
        let reports = self.reports.clone();
        let streams = self.streams.clone();
        let id = report_id.clone();

        tokio::spawn(async move {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    let event = ReportEvent::error(&err);
                    let _ = sender.send(event.clone());
                    reports.insert(
                        id.clone(),
                        ReportRecord::Failed {
                            entity_name,
                            error: err.to_string(),
                            event,
                        },
                    );
                    streams.remove(&id);
                    return;
                }
            };

            let result = run_crew(options).await;
            drop(permit);

            match result {
                Ok(outcome) => {
                    info!(report_id = %id, "report completed");
                    metrics::report_completed(
                        &id,
                        outcome.summary.chars().count(),
                        semaphore.available_permits(),
                    );
                    let event = ReportEvent::completed(&outcome);
                    reports.insert(
                        id.clone(),
                        ReportRecord::Completed {
                            outcome: Arc::new(outcome),
                            event: event.clone(),
                        },
                    );
                    let _ = sender.send(event);
                }
                Err(err) => {
                    error!(report_id = %id, error = %err, "report failed");
                    metrics::report_failed(&id, semaphore.available_permits(), &err.to_string());
                    let event = ReportEvent::error(&err);
                    reports.insert(
                        id.clone(),
                        ReportRecord::Failed {
                            entity_name,
                            error: err.to_string(),
                            event: event.clone(),
                        },
                    );
                    let _ = sender.send(event);
                }
            }

            streams.remove(&id);
        });

        Ok(report_id)
    }

    pub fn status(&self, report_id: &str) -> Option<ReportStatus> {
        self.reports
            .get(report_id)
            .map(|record| record.value().to_status(report_id))
    }

    pub fn list_reports(&self) -> Vec<ReportStatus> {
        let mut reports: Vec<ReportStatus> = self
            .reports
            .iter()
            .map(|entry| entry.value().to_status(entry.key()))
            .collect();
        reports.sort_by(|a, b| a.report_id.cmp(&b.report_id));
        reports
    }

    pub fn outcome(&self, report_id: &str) -> Option<Arc<CrewOutcome>> {
        self.reports
            .get(report_id)
            .and_then(|record| match record.value() {
                ReportRecord::Completed { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
    }

    pub fn metrics(&self) -> ReportMetrics {
        let running_reports = self
            .reports
            .iter()
            .filter(|entry| matches!(entry.value(), ReportRecord::Running { .. }))
            .count();

        ReportMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.semaphore.available_permits(),
            running_reports,
            total_reports: self.reports.len(),
        }
    }

    /// Latest event of the report, followed by live updates while it runs.
    pub fn event_stream(&self, report_id: &str) -> Option<SseStream> {
        // The record guard is held while subscribing so completion cannot
        // slip in between the state check and the subscription.
        let record = self.reports.get(report_id)?;
        let latest = match record.value() {
            ReportRecord::Completed { event, .. } | ReportRecord::Failed { event, .. } => {
                let event = event.clone().into_sse_event();
                let stream = stream::iter(vec![Result::<Event, Infallible>::Ok(event)]);
                return Some(Box::pin(stream));
            }
            ReportRecord::Running { event, .. } => event.clone().into_sse_event(),
        };

        let sender = self.streams.get(report_id)?;
        metrics::stream_opened(report_id, sender.receiver_count() + 1);
        let rx = sender.subscribe();
        let updates = BroadcastStream::new(rx).filter_map(|event| match event {
            Ok(event) => Some(Result::<Event, Infallible>::Ok(event.into_sse_event())),
            Err(err) => {
                warn!(error = %err, "report event stream lagged");
                None
            }
        });

        let stream = stream::iter(vec![Result::<Event, Infallible>::Ok(latest)]).chain(updates);
        Some(Box::pin(stream))
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Debug)]
pub enum ReportRecord {
    Running {
        entity_name: String,
        event: ReportEvent,
    },
    Completed {
        outcome: Arc<CrewOutcome>,
        event: ReportEvent,
    },
    Failed {
        entity_name: String,
        error: String,
        event: ReportEvent,
    },
}

impl ReportRecord {
    fn to_status(&self, report_id: &str) -> ReportStatus {
        match self {
            ReportRecord::Running { entity_name, .. } => ReportStatus {
                report_id: report_id.to_string(),
                entity_name: entity_name.clone(),
                state: ReportState::Running,
                summary: None,
                markdown: None,
                error: None,
            },
            ReportRecord::Completed { outcome, .. } => ReportStatus {
                report_id: report_id.to_string(),
                entity_name: outcome.entity_name.clone(),
                state: ReportState::Completed,
                summary: Some(outcome.summary.clone()),
                markdown: Some(report_markdown(&outcome.entity_name, &outcome.summary)),
                error: None,
            },
            ReportRecord::Failed {
                entity_name, error, ..
            } => ReportStatus {
                report_id: report_id.to_string(),
                entity_name: entity_name.clone(),
                state: ReportState::Failed,
                summary: None,
                markdown: None,
                error: Some(error.clone()),
            },
        }
    }
}

/// Page-ready rendering of a finished summary.
pub fn report_markdown(entity_name: &str, summary: &str) -> String {
    format!("# Summary of Terms and Conditions for {entity_name}\n\n{summary}")
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportStatus {
    pub report_id: String,
    pub entity_name: String,
    pub state: ReportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ReportMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_reports: usize,
    pub total_reports: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportEvent {
    pub kind: ReportEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ReportEvent {
    pub fn started(entity_name: &str) -> Self {
        Self {
            kind: ReportEventKind::Started,
            message: Some(format!("Finding terms and conditions for: {entity_name}")),
            summary: None,
        }
    }

    pub fn completed(outcome: &CrewOutcome) -> Self {
        Self {
            kind: ReportEventKind::Completed,
            message: Some("report completed".into()),
            summary: Some(outcome.summary.clone()),
        }
    }

    pub fn error(error: &impl std::fmt::Display) -> Self {
        Self {
            kind: ReportEventKind::Error,
            message: Some(format!("Error: {error}")),
            summary: None,
        }
    }

    pub fn into_sse_event(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| {
            serde_json::json!({
                "kind": ReportEventKind::Error,
                "message": "failed to serialize report event",
            })
            .to_string()
        });

        Event::default().event(self.kind.as_str()).data(data)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportEventKind {
    Started,
    Completed,
    Error,
}

impl ReportEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            ReportEventKind::Started => "started",
            ReportEventKind::Completed => "completed",
            ReportEventKind::Error => "error",
        }
    }
}
