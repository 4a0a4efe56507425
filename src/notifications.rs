// ABOUTME: Transient user notifications keyed by severity
// ABOUTME: Errors stay visible for 10 seconds, everything else for 5

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn dismiss_after(self) -> Duration {
        match self {
            Severity::Error => Duration::from_secs(10),
            _ => Duration::from_secs(5),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub expires_at: Instant,
}

/// Anything that can surface a message to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Keeps live notifications until their auto-dismiss deadline passes.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    active: Mutex<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notification, dropping any that expired before `now`.
    pub fn push_at(&self, message: &str, severity: Severity, now: Instant) {
        let notification = Notification {
            message: message.to_string(),
            severity,
            expires_at: now + severity.dismiss_after(),
        };
        if let Ok(mut active) = self.active.lock() {
            active.retain(|n| n.expires_at > now);
            active.push(notification);
        }
    }

    /// Drop notifications whose timer has elapsed, returning how many remain.
    pub fn prune(&self, now: Instant) -> usize {
        match self.active.lock() {
            Ok(mut active) => {
                active.retain(|n| n.expires_at > now);
                active.len()
            }
            Err(_) => 0,
        }
    }

    /// Close one notification before its timer fires.
    pub fn dismiss(&self, index: usize) {
        if let Ok(mut active) = self.active.lock() {
            if index < active.len() {
                active.remove(index);
            }
        }
    }

    /// Whether a notification of this severity is still showing at `now`.
    pub fn showing(&self, severity: Severity, now: Instant) -> bool {
        self.active
            .lock()
            .map(|active| {
                active
                    .iter()
                    .any(|n| n.severity == severity && n.expires_at > now)
            })
            .unwrap_or(false)
    }

    pub fn active(&self) -> Vec<Notification> {
        self.active
            .lock()
            .map(|active| active.clone())
            .unwrap_or_default()
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, message: &str, severity: Severity) {
        self.push_at(message, severity, Instant::now());
    }
}

/// Prints notifications on the terminal.
///
/// The printed line is what users see; the log only gets a debug trace.
#[derive(Debug, Default)]
pub struct TerminalNotifier {
    center: NotificationCenter,
}

impl TerminalNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn center(&self) -> &NotificationCenter {
        &self.center
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        tracing::debug!(severity = severity.label(), "Notification: {}", message);
        match severity {
            Severity::Error => eprintln!("✗ {}", message),
            Severity::Warning => println!("⚠ {}", message),
            Severity::Success => println!("✓ {}", message),
            Severity::Info => println!("ℹ {}", message),
        }
        self.center.notify(message, severity);
    }
}

/// Collects notifications in memory; used to assert on user feedback.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(String, Severity)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<(String, Severity)> {
        self.messages().pop()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((message.to_string(), severity));
        }
    }
}
