// ABOUTME: Configuration form logic over the backend configuration resource
// ABOUTME: Loads, validates, saves and deletes the connector configuration

use crate::context::EmbeddingContext;
use crate::error::ConnectorError;
use crate::filters::FilterSelection;
use crate::notifications::{Notifier, Severity};
use crate::remote::models::{
    DEFAULT_BATCH_SIZE, DEFAULT_DS_API_URL, DEFAULT_GRIST_BASE_URL, DEFAULT_MAX_WORKERS,
};
use crate::remote::{Configuration, RemoteClient, Secret};

pub const DELETE_CONFIRMATION: &str =
    "Êtes-vous sûr de vouloir supprimer cette configuration ? Cette action est irréversible.";

/// Fields a configuration must carry before a sync can start.
pub const REQUIRED_FOR_SYNC: [&str; 5] = [
    "ds_api_token",
    "demarche_number",
    "grist_base_url",
    "grist_api_key",
    "grist_doc_id",
];

/// Badge shown next to a secret input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretStatus {
    pub configured: bool,
    pub label: &'static str,
    pub placeholder: &'static str,
}

/// Result of checking a stored configuration for completeness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCheck {
    Complete { demarche_number: u64, grist_doc_id: String },
    Incomplete { missing: Vec<&'static str> },
}

/// Editable state of the configuration form.
///
/// Secret inputs start empty; leaving them empty keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigForm {
    pub otp_config_id: Option<i64>,
    pub ds_api_token: String,
    pub ds_api_url: String,
    pub demarche_number: String,
    pub grist_base_url: String,
    pub grist_api_key: String,
    pub grist_doc_id: String,
    pub grist_user_id: String,
    pub batch_size: u32,
    pub max_workers: u32,
    pub parallel: bool,
    /// Configuration as last loaded from the backend.
    pub stored: Configuration,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl ConfigForm {
    /// Fill the form from a fetched configuration; the document ids always come
    /// from the embedding context.
    pub fn populate(config: &Configuration, ctx: &EmbeddingContext) -> Self {
        let context_base_url = ctx.api_base_url.clone().unwrap_or_default();
        let mut form = ConfigForm {
            otp_config_id: config.otp_config_id,
            ds_api_url: DEFAULT_DS_API_URL.to_string(),
            grist_base_url: context_base_url,
            grist_doc_id: ctx.doc_id.clone(),
            grist_user_id: ctx.user_id.clone(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            parallel: true,
            stored: config.clone(),
            ..Default::default()
        };

        if config.ds_token_configured() {
            form.ds_api_url = config
                .ds_api_url
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_DS_API_URL.to_string());
            form.demarche_number = config
                .demarche_number
                .map(|n| n.to_string())
                .unwrap_or_default();
            form.grist_base_url = config
                .grist_base_url
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_GRIST_BASE_URL.to_string());
            form.batch_size = config.batch_size.filter(|v| *v > 0).unwrap_or(DEFAULT_BATCH_SIZE);
            form.max_workers = config.max_workers.filter(|v| *v > 0).unwrap_or(DEFAULT_MAX_WORKERS);
            form.parallel = config.parallel.unwrap_or(false);
        }

        form
    }

    pub fn ds_token_status(&self) -> SecretStatus {
        if !self.ds_api_token.trim().is_empty() || self.stored.ds_token_configured() {
            SecretStatus {
                configured: true,
                label: "Token configuré",
                placeholder: "Token déjà configuré (laissez vide pour conserver)",
            }
        } else {
            SecretStatus {
                configured: false,
                label: "Token requis",
                placeholder: "",
            }
        }
    }

    pub fn grist_key_status(&self) -> SecretStatus {
        if !self.grist_api_key.trim().is_empty() || self.stored.grist_key_configured() {
            SecretStatus {
                configured: true,
                label: "Clé API configurée",
                placeholder: "Clé API déjà configurée (laissez vide pour conserver)",
            }
        } else {
            SecretStatus {
                configured: false,
                label: "Clé API requise",
                placeholder: "",
            }
        }
    }

    /// Check the fields the backend needs to accept a save.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        let creating = self.otp_config_id.is_none();
        if creating && self.ds_api_token.trim().is_empty() && !self.stored.ds_token_configured() {
            return Err(ConnectorError::missing_field("ds_api_token"));
        }
        if self.demarche_number.trim().is_empty() {
            return Err(ConnectorError::missing_field("demarche_number"));
        }
        if self.demarche_number.trim().parse::<u64>().is_err() {
            return Err(ConnectorError::Validation(format!(
                "Numéro de démarche invalide: {}",
                self.demarche_number.trim()
            )));
        }
        for (field, value) in [
            ("grist_base_url", &self.grist_base_url),
            ("grist_doc_id", &self.grist_doc_id),
            ("grist_user_id", &self.grist_user_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConnectorError::missing_field(field));
            }
        }
        Ok(())
    }

    /// Build the save payload. Call [`ConfigForm::validate`] first.
    pub fn to_configuration(&self, filters: &FilterSelection) -> Configuration {
        let mut config = Configuration {
            otp_config_id: self.otp_config_id,
            ds_api_token: Secret::from_input(&self.ds_api_token),
            ds_api_url: non_empty(&self.ds_api_url),
            demarche_number: self.demarche_number.trim().parse().ok(),
            grist_base_url: non_empty(&self.grist_base_url),
            grist_api_key: Secret::from_input(&self.grist_api_key),
            grist_doc_id: non_empty(&self.grist_doc_id),
            grist_user_id: non_empty(&self.grist_user_id),
            batch_size: Some(self.batch_size),
            max_workers: Some(self.max_workers),
            parallel: Some(self.parallel),
            ..Default::default()
        };
        filters.write_into(&mut config);
        config
    }
}

/// Report which required fields a stored configuration lacks.
///
/// Masked secrets only count when the backend flags them as stored.
pub fn check_configuration(config: &Configuration) -> ConfigCheck {
    let present = |field: &str| -> bool {
        match field {
            "ds_api_token" => config.has_ds_token || config.ds_api_token.revealed().is_some(),
            "grist_api_key" => config.has_grist_key || config.grist_api_key.revealed().is_some(),
            "demarche_number" => config.demarche_number.is_some(),
            "grist_base_url" => config.grist_base_url.as_deref().is_some_and(|v| !v.is_empty()),
            "grist_doc_id" => config.grist_doc_id.is_some(),
            _ => false,
        }
    };

    let missing: Vec<&'static str> = REQUIRED_FOR_SYNC
        .into_iter()
        .filter(|field| !present(field))
        .collect();

    match (missing.is_empty(), config.demarche_number, &config.grist_doc_id) {
        (true, Some(demarche_number), Some(doc_id)) => ConfigCheck::Complete {
            demarche_number,
            grist_doc_id: doc_id.clone(),
        },
        _ => ConfigCheck::Incomplete { missing },
    }
}

/// Fetch the configuration scoped to the current document and fill the form.
pub async fn load_configuration(
    client: &RemoteClient,
    ctx: &EmbeddingContext,
    notifier: &dyn Notifier,
) -> Result<ConfigForm, ConnectorError> {
    match client.get_config(Some(ctx)).await {
        Ok(config) => {
            tracing::info!(
                otp_config_id = ?config.otp_config_id,
                has_ds_token = config.ds_token_configured(),
                "Configuration loaded"
            );
            Ok(ConfigForm::populate(&config, ctx))
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            let message = format!("Erreur lors du chargement de la configuration : {}", e);
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Network(message))
        }
    }
}

/// Validate and persist the form with the given filters.
///
/// Returns the backend configuration id on success and records it in the form.
pub async fn save_configuration(
    client: &RemoteClient,
    form: &mut ConfigForm,
    filters: &FilterSelection,
    notifier: &dyn Notifier,
) -> Result<Option<i64>, ConnectorError> {
    if let Err(e) = form.validate() {
        notifier.notify(e.user_message(), Severity::Error);
        return Err(e);
    }

    let payload = form.to_configuration(filters);
    match client.save_config(&payload).await {
        Ok(response) if response.success => {
            if response.otp_config_id.is_some() {
                form.otp_config_id = response.otp_config_id;
            }
            form.stored = payload;
            form.stored.otp_config_id = form.otp_config_id;
            let (ds_set, grist_set) = (
                form.ds_token_status().configured,
                form.grist_key_status().configured,
            );
            form.stored.has_ds_token |= ds_set;
            form.stored.has_grist_key |= grist_set;
            tracing::info!(otp_config_id = ?form.otp_config_id, "Configuration saved");
            notifier.notify("Configuration sauvegardée avec succès", Severity::Success);
            Ok(form.otp_config_id)
        }
        Ok(response) => {
            let message = response
                .message
                .unwrap_or_else(|| "Erreur lors de la sauvegarde".to_string());
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Backend(message))
        }
        Err(e) => {
            tracing::error!("Failed to save configuration: {:#}", e);
            let message = "Erreur lors de la sauvegarde de la configuration".to_string();
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Network(message))
        }
    }
}

/// Delete a stored configuration after the user confirms.
///
/// Returns `Ok(false)` when the user declined.
pub async fn delete_configuration(
    client: &RemoteClient,
    otp_config_id: Option<i64>,
    confirm: impl FnOnce(&str) -> bool,
    notifier: &dyn Notifier,
) -> Result<bool, ConnectorError> {
    let id = otp_config_id.ok_or_else(|| {
        ConnectorError::Validation("ID de configuration requis pour la suppression".to_string())
    })?;

    if !confirm(DELETE_CONFIRMATION) {
        tracing::debug!(otp_config_id = id, "Deletion cancelled by user");
        return Ok(false);
    }

    match client.delete_config(id).await {
        Ok(response) if response.success => {
            tracing::info!(otp_config_id = id, "Configuration deleted");
            notifier.notify("Configuration supprimée avec succès", Severity::Success);
            Ok(true)
        }
        Ok(response) => {
            let message = response
                .message
                .unwrap_or_else(|| "Erreur lors de la suppression".to_string());
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Backend(message))
        }
        Err(e) => {
            tracing::error!("Erreur lors de la suppression: {:#}", e);
            let message = "Erreur lors de la suppression".to_string();
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Network(message))
        }
    }
}
