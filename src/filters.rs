// ABOUTME: Client-side filter selection for dossier synchronization
// ABOUTME: Mirrors date inputs and status/group checklists, renders the active-filter summary

use chrono::NaiveDate;

use crate::context::EmbeddingContext;
use crate::error::ConnectorError;
use crate::notifications::{Notifier, Severity};
use crate::remote::{Configuration, RemoteClient, SyncFilters};
use crate::utils::format_date;

/// Dossier states offered by Démarches Simplifiées, in display order.
pub const DOSSIER_STATUSES: [(&str, &str); 5] = [
    ("en_construction", "En construction"),
    ("en_instruction", "En instruction"),
    ("accepte", "Accepté"),
    ("refuse", "Refusé"),
    ("sans_suite", "Classé sans suite"),
];

/// What gets sent to the backend. Empty sets and missing dates mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub statuses: Vec<String>,
    pub groups: Vec<String>,
}

fn iso(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            tracing::warn!("Ignoring unparseable stored filter date {:?}", raw);
            None
        }
    }
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.date_start.is_none()
            && self.date_end.is_none()
            && self.statuses.is_empty()
            && self.groups.is_empty()
    }

    pub fn to_sync_filters(&self) -> SyncFilters {
        SyncFilters {
            date_depot_debut: iso(self.date_start),
            date_depot_fin: iso(self.date_end),
            statuts_dossiers: self.statuses.join(","),
            groupes_instructeurs: self.groups.join(","),
        }
    }

    /// Copy the selection into the `filter_*` fields of a configuration payload.
    pub fn write_into(&self, config: &mut Configuration) {
        config.filter_date_start = Some(iso(self.date_start));
        config.filter_date_end = Some(iso(self.date_end));
        config.filter_statuses = Some(self.statuses.join(","));
        config.filter_groups = Some(self.groups.join(","));
    }

    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            date_start: parse_date(config.filter_date_start.as_deref()),
            date_end: parse_date(config.filter_date_end.as_deref()),
            statuses: split_list(config.filter_statuses.as_deref()),
            groups: split_list(config.filter_groups.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOption {
    pub value: String,
    pub label: Option<String>,
    pub checked: bool,
}

/// An ordered set of checkboxes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checklist {
    options: Vec<FilterOption>,
}

impl Checklist {
    pub fn from_options<'a>(options: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            options: options
                .into_iter()
                .map(|(value, label)| FilterOption {
                    value: value.to_string(),
                    label: Some(label.to_string()),
                    checked: false,
                })
                .collect(),
        }
    }

    pub fn options(&self) -> &[FilterOption] {
        &self.options
    }

    /// Set one box. Unknown values are appended without a label so a saved
    /// selection survives before its options are loaded.
    pub fn set(&mut self, value: &str, checked: bool) {
        match self.options.iter_mut().find(|o| o.value == value) {
            Some(option) => option.checked = checked,
            None if checked => self.options.push(FilterOption {
                value: value.to_string(),
                label: None,
                checked: true,
            }),
            None => {}
        }
    }

    pub fn toggle(&mut self, value: &str) {
        let checked = self.is_checked(value);
        self.set(value, !checked);
    }

    pub fn is_checked(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value && o.checked)
    }

    pub fn clear(&mut self) {
        for option in &mut self.options {
            option.checked = false;
        }
    }

    /// Checked values in traversal order.
    pub fn checked(&self) -> Vec<String> {
        self.options
            .iter()
            .filter(|o| o.checked)
            .map(|o| o.value.clone())
            .collect()
    }

    /// Replace the options, keeping boxes that were already checked.
    pub fn replace_options(&mut self, options: Vec<(String, String)>) {
        let previously_checked = self.checked();
        self.options = options
            .into_iter()
            .map(|(value, label)| FilterOption {
                value,
                label: Some(label),
                checked: false,
            })
            .collect();
        for value in previously_checked {
            self.set(&value, true);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterManager {
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
    statuses: Checklist,
    groups: Checklist,
}

impl Default for FilterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterManager {
    pub fn new() -> Self {
        Self {
            date_start: None,
            date_end: None,
            statuses: Checklist::from_options(DOSSIER_STATUSES),
            groups: Checklist::default(),
        }
    }

    /// Restore the selection saved in a configuration.
    pub fn from_selection(selection: &FilterSelection) -> Self {
        let mut manager = Self::new();
        manager.date_start = selection.date_start;
        manager.date_end = selection.date_end;
        for status in &selection.statuses {
            manager.statuses.set(status, true);
        }
        for group in &selection.groups {
            manager.groups.set(group, true);
        }
        manager
    }

    /// Set the date bounds from `YYYY-MM-DD` inputs; empty input clears a bound.
    pub fn set_dates(
        &mut self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), ConnectorError> {
        let parse = |raw: Option<&str>| -> Result<Option<NaiveDate>, ConnectorError> {
            match raw.map(str::trim) {
                None | Some("") => Ok(None),
                Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
                    .map(Some)
                    .map_err(|_| ConnectorError::Validation(format!("Date invalide: {}", v))),
            }
        };
        let start = parse(start)?;
        let end = parse(end)?;
        self.date_start = start;
        self.date_end = end;
        Ok(())
    }

    pub fn statuses(&self) -> &Checklist {
        &self.statuses
    }

    pub fn statuses_mut(&mut self) -> &mut Checklist {
        &mut self.statuses
    }

    pub fn groups(&self) -> &Checklist {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut Checklist {
        &mut self.groups
    }

    pub fn selection(&self) -> FilterSelection {
        FilterSelection {
            date_start: self.date_start,
            date_end: self.date_end,
            statuses: self.statuses.checked(),
            groups: self.groups.checked(),
        }
    }

    /// Human-readable list of active filters; empty when nothing filters.
    pub fn summary(&self) -> Vec<String> {
        let mut active = Vec::new();

        if let Some(start) = self.date_start {
            active.push(format!("Date de début: {}", format_date(&iso(Some(start)))));
        }
        if let Some(end) = self.date_end {
            active.push(format!("Date de fin: {}", format_date(&iso(Some(end)))));
        }

        let statuses = self.statuses.checked();
        if !statuses.is_empty() {
            active.push(format!("Statuts: {}", statuses.join(", ")));
        }

        let groups: Vec<String> = self
            .groups
            .options()
            .iter()
            .filter(|o| o.checked)
            .map(|o| match &o.label {
                Some(label) => format!("{} (#{})", label, o.value),
                None => format!("Groupe #{}", o.value),
            })
            .collect();
        if !groups.is_empty() {
            active.push(format!("Groupes: {}", groups.join(", ")));
        }

        active
    }

    pub fn apply(&self, notifier: &dyn Notifier) -> Vec<String> {
        let summary = self.summary();
        notifier.notify("Filtres appliqués avec succès", Severity::Success);
        summary
    }

    /// Clear every filter. Persisting the cleared selection is up to the caller.
    pub fn reset(&mut self, notifier: &dyn Notifier) {
        self.date_start = None;
        self.date_end = None;
        self.statuses.clear();
        self.groups.clear();
        notifier.notify("Filtres réinitialisés", Severity::Info);
    }

    /// Fetch instructor groups and turn them into checkboxes.
    pub async fn load_groups(
        &mut self,
        client: &RemoteClient,
        ctx: Option<&EmbeddingContext>,
        notifier: &dyn Notifier,
    ) -> Result<usize, ConnectorError> {
        match client.get_groups(ctx).await {
            Ok(groups) if groups.is_empty() => {
                notifier.notify(
                    "Aucun groupe instructeur disponible ou connexion non établie",
                    Severity::Info,
                );
                Ok(0)
            }
            Ok(groups) => {
                let count = groups.len();
                self.groups.replace_options(groups);
                tracing::info!(count, "Instructor groups loaded");
                Ok(count)
            }
            Err(e) => {
                tracing::error!("Failed to load instructor groups: {:#}", e);
                let message = "Erreur lors du chargement des groupes instructeurs";
                notifier.notify(message, Severity::Error);
                Err(ConnectorError::Network(message.to_string()))
            }
        }
    }
}
