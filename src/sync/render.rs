// ABOUTME: Terminal rendering of the synchronization progress view
// ABOUTME: Drives an indicatif bar and prints log lines and the final banner above it

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::controller::{LogLine, ProgressView, SyncOutcome};

pub struct ProgressRenderer {
    bar: ProgressBar,
    show_logs: bool,
}

/// One log line as printed: `[HH:MM:SS] message`, errors flagged.
pub fn format_log_line(line: &LogLine) -> String {
    if line.is_error {
        format!("[{}] ✗ {}", line.time, line.message)
    } else {
        format!("[{}]   {}", line.time, line.message)
    }
}

/// Banner lines for the end-of-job summary.
pub fn format_outcome(outcome: &SyncOutcome) -> Vec<String> {
    let marker = match outcome {
        SyncOutcome::Success { .. } => "✓",
        SyncOutcome::Partial { .. } => "⚠",
        SyncOutcome::Failure { .. } => "✗",
    };
    let mut lines = vec![format!("{} {}", marker, outcome.title())];
    lines.extend(
        outcome
            .details()
            .into_iter()
            .filter(|l| !l.is_empty())
            .map(|l| format!("  {}", l)),
    );
    lines
}

impl ProgressRenderer {
    pub fn new(show_logs: bool) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar.set_message("Initialisation...");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar, show_logs }
    }

    pub fn render(&self, view: &ProgressView) {
        if self.show_logs {
            for line in &view.new_logs {
                self.bar.println(format_log_line(line));
            }
        }

        self.bar.set_position(u64::from(view.progress));
        self.bar.set_message(format!(
            "{} | {} | {} traités | {} | ETA {}",
            view.status_text, view.elapsed, view.counters.success, view.throughput, view.eta
        ));

        if let Some(outcome) = &view.outcome {
            self.bar.finish_and_clear();
            for line in format_outcome(outcome) {
                println!("{}", line);
            }
            println!("  {} lignes de log", view.log_count);
        }
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_lines_are_flagged() {
        let line = LogLine {
            time: "10:00:00".to_string(),
            message: "Échecs: 2".to_string(),
            is_error: true,
        };
        assert_eq!(format_log_line(&line), "[10:00:00] ✗ Échecs: 2");
    }

    #[test]
    fn test_outcome_banner() {
        let banner = format_outcome(&SyncOutcome::Failure {
            message: String::new(),
            failed: 0,
        });
        assert_eq!(banner, vec!["✗ Erreur lors de la synchronisation".to_string()]);

        let banner = format_outcome(&SyncOutcome::Success {
            message: "Done".to_string(),
            success: 75,
        });
        assert_eq!(banner[2], "  75 dossiers traités avec succès");
    }
}
