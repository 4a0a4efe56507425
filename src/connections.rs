// ABOUTME: Connection checks for Démarches Simplifiées, Grist and the real-time channel
// ABOUTME: Every check resolves to a pass/fail outcome and a user notification

use std::time::Duration;

use crate::context::EmbeddingContext;
use crate::form::ConfigForm;
use crate::notifications::{Notifier, Severity};
use crate::remote::{ConnectionTestRequest, RemoteClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    pub success: bool,
    pub message: String,
}

impl ConnectionOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeOutcome {
    Connected { session_id: String },
    Failed(String),
    TimedOut,
}

impl RealtimeOutcome {
    pub fn message(&self) -> String {
        match self {
            RealtimeOutcome::Connected { session_id } => {
                format!("WebSocket connecté avec succès (ID: {})", session_id)
            }
            RealtimeOutcome::Failed(reason) => format!("Erreur de connexion WebSocket: {}", reason),
            RealtimeOutcome::TimedOut => "Timeout de connexion WebSocket".to_string(),
        }
    }
}

/// Summary of testing every API a stored configuration can reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReport {
    /// `(api label, outcome)` in test order.
    pub results: Vec<(&'static str, ConnectionOutcome)>,
}

impl ExternalReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|(_, o)| o.success).count()
    }
}

pub struct ConnectionTester<'a> {
    client: &'a RemoteClient,
    ctx: Option<&'a EmbeddingContext>,
    notifier: &'a dyn Notifier,
}

impl<'a> ConnectionTester<'a> {
    pub fn new(
        client: &'a RemoteClient,
        ctx: Option<&'a EmbeddingContext>,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            client,
            ctx,
            notifier,
        }
    }

    /// Stored secrets are only revealed by a fresh configuration fetch.
    async fn reload_secret(
        &self,
        pick: fn(&crate::remote::Configuration) -> Option<String>,
    ) -> Option<String> {
        match self.client.get_config(self.ctx).await {
            Ok(latest) => pick(&latest),
            Err(e) => {
                tracing::error!("Failed to reload configuration: {:#}", e);
                None
            }
        }
    }

    async fn run(&self, request: ConnectionTestRequest, api: &str) -> ConnectionOutcome {
        match self.client.test_connection(&request).await {
            Ok(response) => {
                let message = response.message.unwrap_or_default();
                let severity = if response.success {
                    Severity::Success
                } else {
                    Severity::Error
                };
                tracing::info!(api, success = response.success, "Connection test finished");
                self.notifier.notify(&message, severity);
                ConnectionOutcome {
                    success: response.success,
                    message,
                }
            }
            Err(e) => {
                tracing::error!(api, "Connection test failed: {:#}", e);
                self.notifier
                    .notify("Erreur lors du test de connexion", Severity::Error);
                ConnectionOutcome::failed(format!("Erreur de connexion: {}", e))
            }
        }
    }

    pub async fn test_demarches(&self, form: &ConfigForm) -> ConnectionOutcome {
        let mut token = form.ds_api_token.trim().to_string();
        if token.is_empty() && form.stored.ds_token_configured() {
            token = self
                .reload_secret(|c| c.ds_api_token.revealed().map(str::to_string))
                .await
                .unwrap_or_default();
        }

        if token.is_empty() {
            return ConnectionOutcome::failed(
                "Token API requis. Veuillez saisir votre token ou vérifier qu'il est sauvegardé.",
            );
        }

        let request = ConnectionTestRequest::Demarches {
            api_token: token,
            api_url: form.ds_api_url.clone(),
            demarche_number: form.demarche_number.trim().to_string(),
        };
        self.run(request, "demarches").await
    }

    pub async fn test_grist(&self, form: &ConfigForm) -> ConnectionOutcome {
        let mut key = form.grist_api_key.trim().to_string();
        if key.is_empty() && form.stored.grist_key_configured() {
            key = self
                .reload_secret(|c| c.grist_api_key.revealed().map(str::to_string))
                .await
                .unwrap_or_default();
        }

        if key.is_empty() {
            return ConnectionOutcome::failed(
                "Clé API Grist requise. Veuillez saisir votre clé ou vérifier qu'elle est sauvegardée.",
            );
        }
        if form.grist_base_url.trim().is_empty() {
            return ConnectionOutcome::failed("URL de base Grist requise");
        }
        if form.grist_doc_id.trim().is_empty() {
            return ConnectionOutcome::failed("ID du document Grist requis");
        }

        let request = ConnectionTestRequest::Grist {
            base_url: form.grist_base_url.trim().to_string(),
            api_key: key,
            doc_id: form.grist_doc_id.trim().to_string(),
        };
        self.run(request, "grist").await
    }

    /// Test every API the stored configuration exposes credentials for.
    pub async fn test_external(&self) -> Option<ExternalReport> {
        let config = match self.client.get_config(self.ctx).await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load configuration for tests: {:#}", e);
                self.notifier
                    .notify(&format!("Erreur lors des tests: {}", e), Severity::Error);
                return None;
            }
        };

        let mut requests = Vec::new();
        if let (Some(token), Some(number)) =
            (config.ds_api_token.revealed(), config.demarche_number)
        {
            requests.push((
                "Démarches Simplifiées",
                ConnectionTestRequest::Demarches {
                    api_token: token.to_string(),
                    api_url: config.ds_api_url.clone().unwrap_or_default(),
                    demarche_number: number.to_string(),
                },
            ));
        }
        if let (Some(key), Some(base_url), Some(doc_id)) = (
            config.grist_api_key.revealed(),
            config.grist_base_url.as_deref().filter(|v| !v.is_empty()),
            config.grist_doc_id.as_deref(),
        ) {
            requests.push((
                "Grist",
                ConnectionTestRequest::Grist {
                    base_url: base_url.to_string(),
                    api_key: key.to_string(),
                    doc_id: doc_id.to_string(),
                },
            ));
        }

        if requests.is_empty() {
            self.notifier
                .notify("Aucune API configurée pour le test", Severity::Warning);
            return Some(ExternalReport { results: Vec::new() });
        }

        let mut results = Vec::with_capacity(requests.len());
        for (label, request) in requests {
            let outcome = match self.client.test_connection(&request).await {
                Ok(response) => ConnectionOutcome {
                    success: response.success,
                    message: response.message.unwrap_or_default(),
                },
                Err(e) => {
                    tracing::error!(api = label, "Connection test failed: {:#}", e);
                    ConnectionOutcome::failed(format!("Erreur de connexion: {}", e))
                }
            };
            results.push((label, outcome));
        }

        let report = ExternalReport { results };
        let total = report.results.len();
        let passed = report.passed();
        if passed == total {
            self.notifier.notify(
                &format!("Tous les tests de connexion réussis ({}/{})", passed, total),
                Severity::Success,
            );
        } else {
            self.notifier.notify(
                &format!("{}/{} connexions réussies", passed, total),
                Severity::Warning,
            );
        }
        Some(report)
    }

    /// Smoke-test the real-time channel, giving up after `timeout`.
    pub async fn test_realtime(&self, timeout: Duration) -> RealtimeOutcome {
        let outcome = match tokio::time::timeout(timeout, self.client.realtime_handshake()).await {
            Ok(Ok(session_id)) => RealtimeOutcome::Connected { session_id },
            Ok(Err(e)) => RealtimeOutcome::Failed(format!("{:#}", e)),
            Err(_) => RealtimeOutcome::TimedOut,
        };

        let severity = match outcome {
            RealtimeOutcome::Connected { .. } => Severity::Success,
            RealtimeOutcome::Failed(_) => Severity::Error,
            RealtimeOutcome::TimedOut => Severity::Warning,
        };
        self.notifier.notify(&outcome.message(), severity);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::RecordingNotifier;
    use crate::remote::Configuration;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RemoteClient {
        RemoteClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn grist_form() -> ConfigForm {
        ConfigForm {
            grist_api_key: "test-key".to_string(),
            grist_base_url: "https://grist.example.com".to_string(),
            grist_doc_id: "doc123".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_grist_success_notifies_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/test-connection"))
            .and(body_json(json!({
                "type": "grist",
                "base_url": "https://grist.example.com",
                "api_key": "test-key",
                "doc_id": "doc123"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "Connexion Grist OK"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let notifier = RecordingNotifier::new();
        let outcome = ConnectionTester::new(&client, None, &notifier)
            .test_grist(&grist_form())
            .await;

        assert!(outcome.success);
        assert_eq!(
            notifier.last(),
            Some(("Connexion Grist OK".to_string(), Severity::Success))
        );
    }

    #[tokio::test]
    async fn test_grist_requires_each_field() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let notifier = RecordingNotifier::new();
        let tester = ConnectionTester::new(&client, None, &notifier);

        let mut form = grist_form();
        form.grist_doc_id.clear();
        assert_eq!(tester.test_grist(&form).await.message, "ID du document Grist requis");

        form.grist_base_url.clear();
        assert_eq!(tester.test_grist(&form).await.message, "URL de base Grist requise");

        form.grist_api_key.clear();
        assert!(tester
            .test_grist(&form)
            .await
            .message
            .starts_with("Clé API Grist requise"));
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_demarches_reloads_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ds_api_token": "stored-token"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/test-connection"))
            .and(body_json(json!({
                "type": "demarches",
                "api_token": "stored-token",
                "api_url": "",
                "demarche_number": "42"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "Démarche introuvable"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let notifier = RecordingNotifier::new();
        let form = ConfigForm {
            demarche_number: "42".to_string(),
            stored: Configuration {
                has_ds_token: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let outcome = ConnectionTester::new(&client, None, &notifier)
            .test_demarches(&form)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Démarche introuvable");
        assert_eq!(notifier.last().unwrap().1, Severity::Error);
    }

    #[tokio::test]
    async fn test_external_reports_partial_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ds_api_token": "token",
                "demarche_number": "123",
                "grist_api_key": "key",
                "grist_base_url": "base",
                "grist_doc_id": "doc"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/test-connection"))
            .and(body_json(
                json!({"type": "demarches", "api_token": "token", "api_url": "", "demarche_number": "123"}),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "DS OK"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/test-connection"))
            .and(body_json(
                json!({"type": "grist", "base_url": "base", "api_key": "key", "doc_id": "doc"}),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "Grist failed"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let notifier = RecordingNotifier::new();
        let report = ConnectionTester::new(&client, None, &notifier)
            .test_external()
            .await
            .unwrap();

        assert_eq!(report.passed(), 1);
        assert_eq!(report.results[1].1.message, "Grist failed");
        assert_eq!(
            notifier.last(),
            Some(("1/2 connexions réussies".to_string(), Severity::Warning))
        );
    }

    #[tokio::test]
    async fn test_external_with_masked_secrets_tests_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ds_api_token": "***",
                "grist_api_key": "***"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let notifier = RecordingNotifier::new();
        let report = ConnectionTester::new(&client, None, &notifier)
            .test_external()
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(notifier.last().unwrap().0, "Aucune API configurée pour le test");
    }

    #[tokio::test]
    async fn test_realtime_handshake() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/socket.io/"))
            .and(query_param("EIO", "4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"0{"sid":"test-socket-id","upgrades":["websocket"],"pingInterval":25000}"#),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let notifier = RecordingNotifier::new();
        let outcome = ConnectionTester::new(&client, None, &notifier)
            .test_realtime(Duration::from_secs(5))
            .await;

        assert_eq!(
            outcome,
            RealtimeOutcome::Connected {
                session_id: "test-socket-id".to_string()
            }
        );
        assert!(notifier.last().unwrap().0.contains("test-socket-id"));
    }

    #[tokio::test]
    async fn test_realtime_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/socket.io/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let notifier = RecordingNotifier::new();
        let outcome = ConnectionTester::new(&client, None, &notifier)
            .test_realtime(Duration::from_millis(50))
            .await;

        assert_eq!(outcome, RealtimeOutcome::TimedOut);
        assert_eq!(
            notifier.last(),
            Some(("Timeout de connexion WebSocket".to_string(), Severity::Warning))
        );
    }
}
