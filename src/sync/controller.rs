// ABOUTME: Synchronization job lifecycle and per-snapshot progress reconciliation
// ABOUTME: Turns polled task snapshots into render-ready views and a final outcome

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, TimeZone, Utc};

use super::stats::{JobCounters, LogStatsExtractor};
use crate::context::EmbeddingContext;
use crate::error::ConnectorError;
use crate::filters::FilterSelection;
use crate::notifications::{Notifier, Severity};
use crate::remote::models::StartSyncRequest;
use crate::remote::{Configuration, LogEntry, RemoteClient, TaskSnapshot, TaskStatus};
use crate::settings::ProgressSettings;
use crate::utils::format_duration;

const PLACEHOLDER: &str = "-";
const DEFAULT_STATUS_TEXT: &str = "En cours...";
const START_FAILED: &str = "Erreur lors du démarrage de la synchronisation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
    Completed,
    Error,
}

/// State owned by one running job: counters and the log watermark.
#[derive(Debug, Clone)]
pub struct SyncSession {
    pub task_id: String,
    pub started_at: Instant,
    pub counters: JobCounters,
    log_watermark: usize,
    /// False until `started_at` reflects the backend's own start time.
    anchored: bool,
}

impl SyncSession {
    pub fn new(task_id: String, started_at: Instant) -> Self {
        Self {
            task_id,
            started_at,
            counters: JobCounters::default(),
            log_watermark: 0,
            anchored: true,
        }
    }

    /// Move `started_at` back to the task's start, given as unix seconds
    /// alongside the wall-clock time that corresponds to `now`.
    pub fn anchor_to_task_start(&mut self, task_start: f64, wall_now: f64, now: Instant) {
        if let Ok(behind) = Duration::try_from_secs_f64((wall_now - task_start).max(0.0)) {
            if let Some(started_at) = now.checked_sub(behind) {
                self.started_at = started_at;
            }
        }
        self.anchored = true;
    }

    pub fn logs_seen(&self) -> usize {
        self.log_watermark
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    /// Local wall-clock time of the entry, `HH:MM:SS`.
    pub time: String,
    pub message: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Success {
        message: String,
        success: u64,
    },
    Partial {
        message: String,
        success: u64,
        failed: u64,
        success_rate: f64,
    },
    Failure {
        message: String,
        failed: u64,
    },
}

impl SyncOutcome {
    pub fn title(&self) -> &'static str {
        match self {
            SyncOutcome::Success { .. } => "Synchronisation terminée avec succès!",
            SyncOutcome::Partial { .. } => "Synchronisation terminée avec des erreurs",
            SyncOutcome::Failure { .. } => "Erreur lors de la synchronisation",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SyncOutcome::Success { .. } => Severity::Success,
            SyncOutcome::Partial { .. } => Severity::Warning,
            SyncOutcome::Failure { .. } => Severity::Error,
        }
    }

    /// Banner body lines below the title.
    pub fn details(&self) -> Vec<String> {
        match self {
            SyncOutcome::Success { message, success } => vec![
                message.clone(),
                format!("{} dossiers traités avec succès", success),
            ],
            SyncOutcome::Partial {
                message,
                success,
                failed,
                success_rate,
            } => vec![
                message.clone(),
                format!("{} dossiers traités avec succès, {} en échec", success, failed),
                format!("Taux de réussite: {:.1}%", success_rate),
            ],
            SyncOutcome::Failure { message, failed } => {
                let mut lines = vec![message.clone()];
                if *failed > 0 {
                    lines.push(format!("{} erreurs détectées", failed));
                }
                lines
            }
        }
    }
}

/// Everything the progress view shows after one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub progress: u8,
    pub status_text: String,
    pub elapsed: String,
    pub throughput: String,
    pub eta: String,
    pub new_logs: Vec<LogLine>,
    pub log_count: usize,
    pub counters: JobCounters,
    /// Set only on the snapshot that ends the job.
    pub outcome: Option<SyncOutcome>,
}

fn clamp_progress(raw: Option<f64>) -> u8 {
    match raw {
        Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

fn is_error_line(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["erreur", "error", "échec", "failed"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn log_time(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1e9) as u32;
    Local
        .timestamp_opt(secs, nanos)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// `success / total`, falling back to `success + failed` when no total was reported.
pub fn success_rate(counters: &JobCounters) -> f64 {
    let denominator = if counters.total > 0 {
        counters.total
    } else {
        counters.success + counters.failed
    };
    if denominator == 0 {
        0.0
    } else {
        counters.success as f64 / denominator as f64 * 100.0
    }
}

pub struct SyncController {
    state: SyncState,
    session: Option<SyncSession>,
    extractor: LogStatsExtractor,
    settings: ProgressSettings,
    notifier: Arc<dyn Notifier>,
}

impl SyncController {
    pub fn new(settings: ProgressSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state: SyncState::Idle,
            session: None,
            extractor: LogStatsExtractor::new(settings.recovery_failure_percent),
            settings,
            notifier,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn session(&self) -> Option<&SyncSession> {
        self.session.as_ref()
    }

    fn reject(&self, message: &str, error: ConnectorError) -> Result<String, ConnectorError> {
        self.notifier.notify(message, Severity::Error);
        Err(error)
    }

    /// Submit a job. On acceptance the controller is `Running` and the task id is returned.
    pub async fn start(
        &mut self,
        client: &RemoteClient,
        config: Option<&Configuration>,
        filters: &FilterSelection,
        ctx: &EmbeddingContext,
    ) -> Result<String, ConnectorError> {
        let Some(config) = config else {
            let message = "Configuration non chargée";
            return self.reject(message, ConnectorError::Validation(message.to_string()));
        };

        if self.state == SyncState::Running {
            let message = "Une synchronisation est déjà en cours";
            return self.reject(message, ConnectorError::Validation(message.to_string()));
        }

        let request = StartSyncRequest {
            config,
            filters: filters.to_sync_filters(),
            otp_config_id: config.otp_config_id,
            grist_user_id: &ctx.user_id,
            grist_doc_id: &ctx.doc_id,
        };

        let response = match client.start_sync(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to start synchronization: {:#}", e);
                let message = START_FAILED;
                return self.reject(message, ConnectorError::Network(message.to_string()));
            }
        };

        let task_id = match (response.success, response.task_id) {
            (true, Some(task_id)) => task_id,
            (_, _) => {
                let message = response
                    .message
                    .unwrap_or_else(|| START_FAILED.to_string());
                tracing::warn!(
                    missing = ?response.missing_fields,
                    "Synchronization rejected: {}",
                    message
                );
                return self.reject(&message, ConnectorError::Backend(message.clone()));
            }
        };

        self.begin(task_id.clone(), Instant::now());
        tracing::info!(task_id = %task_id, "Synchronization started");
        self.notifier
            .notify("Synchronisation démarrée", Severity::Success);
        Ok(task_id)
    }

    /// Attach to a task with fresh counters, as of `started_at`.
    pub fn begin(&mut self, task_id: String, started_at: Instant) {
        self.session = Some(SyncSession::new(task_id, started_at));
        self.state = SyncState::Running;
    }

    /// Follow a task that was started elsewhere.
    ///
    /// Timing is measured from the task's reported start once the first
    /// snapshot carrying it arrives.
    pub fn attach(&mut self, task_id: String) {
        self.begin(task_id, Instant::now());
        if let Some(session) = self.session.as_mut() {
            session.anchored = false;
        }
    }

    /// Reconcile a snapshot against wall-clock now.
    pub fn apply_snapshot(&mut self, snapshot: &TaskSnapshot) -> Option<ProgressView> {
        self.apply_snapshot_at(snapshot, Instant::now())
    }

    /// Reconcile a snapshot. Returns `None` when no job was ever started.
    pub fn apply_snapshot_at(
        &mut self,
        snapshot: &TaskSnapshot,
        now: Instant,
    ) -> Option<ProgressView> {
        let settings = self.settings;
        let extractor = self.extractor;
        let session = self.session.as_mut()?;

        if !session.anchored {
            if let Some(task_start) = snapshot.start_time {
                let wall_now = Utc::now().timestamp_millis() as f64 / 1000.0;
                session.anchor_to_task_start(task_start, wall_now, now);
            }
        }

        let progress = clamp_progress(snapshot.progress);
        let status_text = snapshot
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS_TEXT.to_string());

        let elapsed_secs = now.saturating_duration_since(session.started_at).as_secs_f64();
        let elapsed = format_duration(elapsed_secs);

        // Rates use the counters as of the previous snapshot.
        let success = session.counters.success;
        let (throughput, eta) = if elapsed_secs > settings.warmup_secs && success > 0 {
            let throughput = format!("{:.1} dossiers/s", success as f64 / elapsed_secs);
            let eta = if progress > 0 && progress < 100 {
                let percent_per_sec = f64::from(progress) / elapsed_secs;
                let remaining = f64::from(100 - progress) / percent_per_sec;
                if remaining > 0.0 && remaining < settings.eta_ceiling_secs {
                    format_duration(remaining)
                } else {
                    PLACEHOLDER.to_string()
                }
            } else {
                PLACEHOLDER.to_string()
            };
            (throughput, eta)
        } else if elapsed_secs > 0.0 && success == 0 {
            ("0.0 dossiers/s".to_string(), PLACEHOLDER.to_string())
        } else {
            (PLACEHOLDER.to_string(), PLACEHOLDER.to_string())
        };

        let mut new_logs = Vec::new();
        if snapshot.logs.len() > session.log_watermark {
            for LogEntry { timestamp, message } in &snapshot.logs[session.log_watermark..] {
                new_logs.push(LogLine {
                    time: log_time(*timestamp),
                    message: message.clone(),
                    is_error: is_error_line(message),
                });
                extractor.apply(&mut session.counters, message);
            }
            session.log_watermark = snapshot.logs.len();
        }

        let counters = session.counters;
        let log_count = session.log_watermark;

        let mut outcome = None;
        if snapshot.status.is_terminal() && self.state == SyncState::Running {
            let result = Self::conclude(snapshot, &counters);
            self.state = match snapshot.status {
                TaskStatus::Completed => SyncState::Completed,
                _ => SyncState::Error,
            };
            tracing::info!(
                status = ?snapshot.status,
                success = counters.success,
                failed = counters.failed,
                total = counters.total,
                "Synchronization finished"
            );
            self.notifier.notify(result.title(), result.severity());
            outcome = Some(result);
        }

        Some(ProgressView {
            progress,
            status_text,
            elapsed,
            throughput,
            eta,
            new_logs,
            log_count,
            counters,
            outcome,
        })
    }

    fn conclude(snapshot: &TaskSnapshot, counters: &JobCounters) -> SyncOutcome {
        let message = snapshot
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| snapshot.error.clone())
            .unwrap_or_default();
        let completed = snapshot.status == TaskStatus::Completed;

        if completed && counters.failed == 0 {
            SyncOutcome::Success {
                message,
                success: counters.success,
            }
        } else if completed && counters.success > 0 {
            SyncOutcome::Partial {
                message,
                success: counters.success,
                failed: counters.failed,
                success_rate: success_rate(counters),
            }
        } else {
            SyncOutcome::Failure {
                message,
                failed: counters.failed,
            }
        }
    }
}
