// ABOUTME: Automatic daily synchronization toggle for a saved configuration
// ABOUTME: Thin wrapper over the backend schedule resource with user feedback

use crate::error::ConnectorError;
use crate::notifications::{Notifier, Severity};
use crate::remote::models::ScheduleStatus;
use crate::remote::RemoteClient;

fn require_id(otp_config_id: Option<i64>) -> Result<i64, ConnectorError> {
    otp_config_id.ok_or_else(|| {
        ConnectorError::Validation(
            "Sauvegardez la configuration avant de programmer la synchronisation".to_string(),
        )
    })
}

pub async fn schedule_status(
    client: &RemoteClient,
    otp_config_id: Option<i64>,
    notifier: &dyn Notifier,
) -> Result<ScheduleStatus, ConnectorError> {
    let id = require_id(otp_config_id)?;
    match client.get_schedule(id).await {
        Ok(status) if status.success => Ok(status),
        Ok(status) => {
            let message = status
                .message
                .unwrap_or_else(|| "Planning introuvable".to_string());
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Backend(message))
        }
        Err(e) => {
            tracing::error!("Failed to read schedule: {:#}", e);
            let message = "Erreur lors de la récupération du planning".to_string();
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Network(message))
        }
    }
}

pub async fn set_auto_sync(
    client: &RemoteClient,
    otp_config_id: Option<i64>,
    enabled: bool,
    notifier: &dyn Notifier,
) -> Result<(), ConnectorError> {
    let id = require_id(otp_config_id)?;
    match client.set_schedule(id, enabled).await {
        Ok(response) if response.success => {
            tracing::info!(otp_config_id = id, enabled, "Auto-sync schedule updated");
            let message = if enabled {
                "Synchronisation automatique activée"
            } else {
                "Synchronisation automatique désactivée"
            };
            notifier.notify(message, Severity::Success);
            Ok(())
        }
        Ok(response) => {
            let message = response
                .message
                .unwrap_or_else(|| "Erreur lors de la mise à jour du planning".to_string());
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Backend(message))
        }
        Err(e) => {
            tracing::error!("Failed to update schedule: {:#}", e);
            let message = "Erreur lors de la mise à jour du planning".to_string();
            notifier.notify(&message, Severity::Error);
            Err(ConnectorError::Network(message))
        }
    }
}
