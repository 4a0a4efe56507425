// ABOUTME: Client-side settings loaded from an optional TOML file
// ABOUTME: Holds the backend location and the tunable thresholds of the progress view

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root URL of the connector backend (the part before `/api/...`).
    pub backend_url: String,
    pub http_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub realtime_timeout_secs: u64,
    pub progress: ProgressSettings,
}

/// Thresholds used while reconciling task snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// No throughput or ETA is shown before this many seconds.
    pub warmup_secs: f64,
    /// ETAs at or beyond this are treated as noise.
    pub eta_ceiling_secs: f64,
    /// Recovery percentages below this count the missing dossiers as failures.
    pub recovery_failure_percent: f64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            warmup_secs: 10.0,
            eta_ceiling_secs: 86_400.0,
            recovery_failure_percent: 80.0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".to_string(),
            http_timeout_secs: 30,
            poll_interval_secs: 2,
            realtime_timeout_secs: 5,
            progress: ProgressSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;

        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn realtime_timeout(&self) -> Duration {
        Duration::from_secs(self.realtime_timeout_secs)
    }
}
