// ABOUTME: Derives running job counters from the backend's free-text log lines
// ABOUTME: Total, success and failure are independent passes over ordered pattern tables

use once_cell::sync::Lazy;
use regex::Regex;

/// Counters accumulated over one synchronization job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounters {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
}

impl JobCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuccessUpdate {
    /// Final tally, replaces whatever was accumulated.
    Overwrite,
    /// Per-batch count, accumulates.
    Add,
    /// Raise to at least this value.
    AtLeast,
}

struct SuccessRule {
    pattern: Regex,
    update: SuccessUpdate,
    /// Case-sensitive marker that disables the rule for this message.
    unless_contains: Option<&'static str>,
}

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("invalid log statistics pattern")
}

static TOTAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(r"(?i)Nombre total de dossiers trouvés:\s*(\d+)"),
        pattern(r"(?i)Après filtrage:\s*(\d+)\s+dossiers"),
        pattern(r"(?i)(\d+)\s+dossiers?\s+(?:trouvés?|à traiter)"),
    ]
});

static SUCCESS_RULES: Lazy<Vec<SuccessRule>> = Lazy::new(|| {
    vec![
        SuccessRule {
            pattern: pattern(r"(?i)Dossiers traités avec succès:\s*(\d+)"),
            update: SuccessUpdate::Overwrite,
            unless_contains: None,
        },
        SuccessRule {
            pattern: pattern(r"(?i)Lot\s+\d+\s+terminé:\s*(\d+)\s+dossiers?\s+traités?\s+avec\s+succès"),
            update: SuccessUpdate::Add,
            unless_contains: None,
        },
        // TODO: confirm with the backend team whether upsert batches report a
        // running total; if they report per-batch counts this should add.
        SuccessRule {
            pattern: pattern(r"(?i)Upsert par lot de\s*(\d+)\s+dossiers(?:\.\.\.|…)"),
            update: SuccessUpdate::AtLeast,
            unless_contains: Some("ERREUR"),
        },
        SuccessRule {
            pattern: pattern(r"(?i)Création par lot:\s*(\d+)\s+enregistrements?\s+créés?\s+avec\s+succès"),
            update: SuccessUpdate::Add,
            unless_contains: None,
        },
        SuccessRule {
            pattern: pattern(
                r"(?i)Mise à jour par lot:\s*(\d+)\s+enregistrements?\s+mis à jour avec succès",
            ),
            update: SuccessUpdate::Add,
            unless_contains: None,
        },
    ]
});

static FAILURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(r"(?i)(\d+)\s+dossiers?\s+en\s+échec"),
        pattern(r"(?i)Échecs?:\s*(\d+)"),
        pattern(r"(?i)(\d+)\s+erreurs?\s+détectées?"),
        pattern(r"(?i)(\d+)\s+dossiers?\s+n'ont\s+pas\s+pu\s+être\s+récupérés"),
    ]
});

static RECOVERY_PATTERN: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)(\d+)/(\d+)\s+dossiers?\s+récupérés?\s+\((\d+(?:\.\d+)?)%\)"));

const FATAL_MARKERS: [&str; 4] = [
    "erreur lors de la récupération du dossier",
    "max retries exceeded",
    "sslerror",
    "timeout",
];

fn first_count<'a>(patterns: impl IntoIterator<Item = &'a Regex>, message: &str) -> Option<u64> {
    patterns
        .into_iter()
        .find_map(|re| re.captures(message)?.get(1)?.as_str().parse().ok())
}

fn is_fatal(message: &str) -> bool {
    let lower = message.to_lowercase();
    FATAL_MARKERS.iter().any(|m| lower.contains(m))
        || (lower.contains("connection") && lower.contains("failed"))
}

/// Reducer from `(counters, log line)` to updated counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogStatsExtractor {
    recovery_failure_percent: f64,
}

impl Default for LogStatsExtractor {
    fn default() -> Self {
        Self::new(80.0)
    }
}

impl LogStatsExtractor {
    pub fn new(recovery_failure_percent: f64) -> Self {
        Self {
            recovery_failure_percent,
        }
    }

    /// Fold one log message into the counters. Unrecognized lines are no-ops.
    pub fn apply(&self, counters: &mut JobCounters, message: &str) {
        self.apply_total(counters, message);
        self.apply_success(counters, message);
        self.apply_failures(counters, message);
    }

    fn apply_total(&self, counters: &mut JobCounters, message: &str) {
        if let Some(total) = first_count(TOTAL_PATTERNS.iter(), message) {
            if total > counters.total {
                counters.total = total;
                tracing::debug!(total, "Total dossiers updated");
            }
        }
    }

    fn apply_success(&self, counters: &mut JobCounters, message: &str) {
        for rule in SUCCESS_RULES.iter() {
            if rule.unless_contains.is_some_and(|marker| message.contains(marker)) {
                continue;
            }
            let Some(count) = first_count([&rule.pattern], message) else {
                continue;
            };

            counters.success = match rule.update {
                SuccessUpdate::Overwrite => count,
                SuccessUpdate::Add => counters.success.saturating_add(count),
                SuccessUpdate::AtLeast => counters.success.max(count),
            };
            tracing::debug!(
                update = ?rule.update,
                count,
                success = counters.success,
                "Success count updated"
            );
            return;
        }
    }

    fn apply_failures(&self, counters: &mut JobCounters, message: &str) {
        if let Some(failed) = first_count(FAILURE_PATTERNS.iter(), message) {
            if failed > counters.failed {
                counters.failed = failed;
                tracing::debug!(failed, "Failure count updated");
            }
        }

        if let Some(caps) = RECOVERY_PATTERN.captures(message) {
            let recovered: Option<u64> = caps[1].parse().ok();
            let expected: Option<u64> = caps[2].parse().ok();
            let percent: Option<f64> = caps[3].parse().ok();

            if let (Some(recovered), Some(expected), Some(percent)) =
                (recovered, expected, percent)
            {
                if percent < self.recovery_failure_percent {
                    let missing = expected.saturating_sub(recovered);
                    counters.failed = counters.failed.max(missing);
                    tracing::debug!(missing, percent, "Failures inferred from low recovery rate");
                }
            }
        }

        if is_fatal(message) {
            counters.failed = counters.failed.saturating_add(1);
            tracing::debug!(failed = counters.failed, "Individual failure detected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> JobCounters {
        let extractor = LogStatsExtractor::default();
        let mut counters = JobCounters::default();
        for line in lines {
            extractor.apply(&mut counters, line);
        }
        counters
    }

    #[test]
    fn test_total_from_each_phrasing() {
        assert_eq!(run(&["Nombre total de dossiers trouvés: 150"]).total, 150);
        assert_eq!(run(&["Après filtrage: 42 dossiers"]).total, 42);
        assert_eq!(run(&["12 dossiers à traiter"]).total, 12);
        assert_eq!(run(&["1 dossier trouvé"]).total, 1);
    }

    #[test]
    fn test_total_never_decreases() {
        let counters = run(&[
            "Nombre total de dossiers trouvés: 150",
            "Après filtrage: 90 dossiers",
        ]);
        assert_eq!(counters.total, 150);
    }

    #[test]
    fn test_final_success_overwrites_accumulated() {
        let counters = run(&[
            "Lot 1 terminé: 30 dossiers traités avec succès",
            "Lot 2 terminé: 30 dossiers traités avec succès",
            "Dossiers traités avec succès: 75",
        ]);
        assert_eq!(counters.success, 75);

        let counters = run(&[
            "Création par lot: 500 enregistrements créés avec succès",
            "Dossiers traités avec succès: 3",
        ]);
        assert_eq!(counters.success, 3);
    }

    #[test]
    fn test_batch_successes_add_up() {
        let counters = run(&[
            "Lot 1 terminé: 25 dossiers traités avec succès",
            "Lot 2 terminé: 17 dossiers traités avec succès",
        ]);
        assert_eq!(counters.success, 42);
    }

    #[test]
    fn test_create_and_update_batches_add_up() {
        let counters = run(&[
            "Création par lot: 10 enregistrements créés avec succès",
            "Mise à jour par lot: 5 enregistrements mis à jour avec succès",
            "Mise à jour par lot: 1 enregistrement mis à jour avec succès",
        ]);
        assert_eq!(counters.success, 16);
    }

    #[test]
    fn test_upsert_raises_to_at_least() {
        let counters = run(&[
            "Lot 1 terminé: 40 dossiers traités avec succès",
            "Upsert par lot de 25 dossiers...",
        ]);
        assert_eq!(counters.success, 40);

        let counters = run(&[
            "Upsert par lot de 25 dossiers...",
            "Upsert par lot de 30 dossiers...",
        ]);
        assert_eq!(counters.success, 30);
    }

    #[test]
    fn test_upsert_ignored_when_error_marker_present() {
        let counters = run(&["ERREUR Upsert par lot de 25 dossiers..."]);
        assert_eq!(counters.success, 0);
    }

    #[test]
    fn test_upsert_announcement_needs_ellipsis() {
        let counters = run(&["Upsert par lot de 25 dossiers"]);
        assert_eq!(counters.success, 0);

        let counters = run(&["Upsert par lot de 25 dossiers…"]);
        assert_eq!(counters.success, 25);
    }

    #[test]
    fn test_one_batch_rule_per_line() {
        let counters = run(&[
            "Lot 1 terminé: 10 dossiers traités avec succès - Création par lot: 10 enregistrements créés avec succès",
        ]);
        assert_eq!(counters.success, 10);
    }

    #[test]
    fn test_fatal_increment_saturates() {
        let counters = run(&["Échecs: 18446744073709551615", "Read timeout"]);
        assert_eq!(counters.failed, u64::MAX);
    }

    #[test]
    fn test_explicit_failures_never_decrease() {
        let counters = run(&["3 dossiers en échec", "Échecs: 2"]);
        assert_eq!(counters.failed, 3);

        let counters = run(&["Échecs: 2", "5 erreurs détectées"]);
        assert_eq!(counters.failed, 5);

        let counters = run(&["4 dossiers n'ont pas pu être récupérés"]);
        assert_eq!(counters.failed, 4);
    }

    #[test]
    fn test_recovery_ratio_above_threshold_is_ignored() {
        let counters = run(&["90/100 dossiers récupérés (90.0%)"]);
        assert_eq!(counters.failed, 0);

        let counters = run(&["80/100 dossiers récupérés (80%)"]);
        assert_eq!(counters.failed, 0);
    }

    #[test]
    fn test_low_recovery_ratio_implies_failures() {
        let counters = run(&["50/100 dossiers récupérés (50.0%)"]);
        assert_eq!(counters.failed, 50);

        let counters = run(&["70 dossiers en échec", "50/100 dossiers récupérés (50%)"]);
        assert_eq!(counters.failed, 70);
    }

    #[test]
    fn test_recovery_threshold_is_configurable() {
        let extractor = LogStatsExtractor::new(95.0);
        let mut counters = JobCounters::default();
        extractor.apply(&mut counters, "90/100 dossiers récupérés (90%)");
        assert_eq!(counters.failed, 10);
    }

    #[test]
    fn test_fatal_markers_increment_once_per_line() {
        let counters = run(&[
            "Erreur lors de la récupération du dossier 1234",
            "HTTPSConnectionPool: Max retries exceeded with url",
            "SSLError: certificate verify failed",
            "Connection to host failed",
            "Read TIMEOUT after 30s",
        ]);
        assert_eq!(counters.failed, 5);
    }

    #[test]
    fn test_categories_are_independent() {
        let counters = run(&[
            "Nombre total de dossiers trouvés: 10 - Dossiers traités avec succès: 8 - Échecs: 2",
        ]);
        assert_eq!(
            counters,
            JobCounters {
                total: 10,
                success: 8,
                failed: 2
            }
        );
    }

    #[test]
    fn test_unrelated_lines_are_noops() {
        let counters = run(&[
            "=== CONFIGURATION DES FILTRES ===",
            "○ Statuts: AUCUN FILTRE (tous les dossiers)",
        ]);
        assert_eq!(counters, JobCounters::default());
    }

    #[test]
    fn test_reset() {
        let mut counters = run(&["Échecs: 2"]);
        counters.reset();
        assert_eq!(counters, JobCounters::default());
    }
}
