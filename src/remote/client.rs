// ABOUTME: HTTP client for the connector backend REST API
// ABOUTME: Handles configuration CRUD, connection tests, job submission and task polling

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use super::models::{
    ApiResponse, Configuration, ConnectionTestRequest, SaveConfigResponse, ScheduleStatus,
    StartSyncRequest, StartSyncResponse, TaskSnapshot,
};
use crate::context::EmbeddingContext;

pub struct RemoteClient {
    client: Client,
    api_base_url: String,
}

impl RemoteClient {
    pub fn new(api_base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.api_base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// Resource URL, scoped to the document and user when a context is known.
    fn scoped_url(&self, path: &str, ctx: Option<&EmbeddingContext>) -> String {
        match ctx {
            Some(ctx) => format!("{}{}", self.url(path), ctx.query_params()),
            None => self.url(path),
        }
    }

    /// Decode a JSON body whatever the status code.
    ///
    /// The backend reports logical failures as `{success: false, message}`
    /// with 4xx/5xx codes, so the envelope is what callers need to see.
    async fn read_envelope<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;

        serde_json::from_str(&body).with_context(|| {
            format!("Failed to parse {} response (status {}): {}", what, status, body)
        })
    }

    /// Decode a JSON body, failing on non-success status codes.
    async fn read_success<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(body);
            anyhow::bail!("{} failed with status {}: {}", what, status, detail);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    pub async fn get_config(&self, ctx: Option<&EmbeddingContext>) -> Result<Configuration> {
        let response = self
            .client
            .get(self.scoped_url("/api/config", ctx))
            .send()
            .await
            .context("Failed to load configuration from the backend")?;

        Self::read_success(response, "Configuration load").await
    }

    pub async fn save_config(&self, config: &Configuration) -> Result<SaveConfigResponse> {
        let response = self
            .client
            .post(self.url("/api/config"))
            .json(config)
            .send()
            .await
            .context("Failed to send configuration to the backend")?;

        Self::read_envelope(response, "configuration save").await
    }

    pub async fn delete_config(&self, otp_config_id: i64) -> Result<ApiResponse> {
        let response = self
            .client
            .delete(self.url(&format!("/api/config/{}", otp_config_id)))
            .send()
            .await
            .context("Failed to delete configuration")?;

        Self::read_envelope(response, "configuration delete").await
    }

    /// Instructor groups as ordered `(id, label)` pairs.
    pub async fn get_groups(
        &self,
        ctx: Option<&EmbeddingContext>,
    ) -> Result<Vec<(String, String)>> {
        let response = self
            .client
            .get(self.scoped_url("/api/groups", ctx))
            .send()
            .await
            .context("Failed to load instructor groups")?;
        let raw: Vec<(Value, String)> = Self::read_success(response, "Group listing").await?;

        Ok(raw
            .into_iter()
            .map(|(id, label)| {
                let id = match id {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (id, label)
            })
            .collect())
    }

    pub async fn test_connection(&self, request: &ConnectionTestRequest) -> Result<ApiResponse> {
        let response = self
            .client
            .post(self.url("/api/test-connection"))
            .json(request)
            .send()
            .await
            .context("Failed to reach the connection test endpoint")?;

        Self::read_envelope(response, "connection test").await
    }

    pub async fn start_sync(&self, request: &StartSyncRequest<'_>) -> Result<StartSyncResponse> {
        let response = self
            .client
            .post(self.url("/api/start-sync"))
            .json(request)
            .send()
            .await
            .context("Failed to submit synchronization job to the backend")?;

        Self::read_envelope(response, "job submission").await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot> {
        let response = self
            .client
            .get(self.url(&format!("/api/task/{}", task_id)))
            .send()
            .await
            .context("Failed to get task status. The backend may be unavailable")?;

        Self::read_success(response, "Task status").await
    }

    pub async fn get_schedule(&self, otp_config_id: i64) -> Result<ScheduleStatus> {
        let response = self
            .client
            .get(self.url("/api/schedule"))
            .query(&[("otp_config_id", otp_config_id)])
            .send()
            .await
            .context("Failed to read auto-sync schedule")?;

        Self::read_envelope(response, "schedule status").await
    }

    pub async fn set_schedule(&self, otp_config_id: i64, enabled: bool) -> Result<ApiResponse> {
        let body = serde_json::json!({ "otp_config_id": otp_config_id });
        let request = if enabled {
            self.client.post(self.url("/api/schedule"))
        } else {
            self.client.delete(self.url("/api/schedule"))
        };

        let response = request
            .json(&body)
            .send()
            .await
            .context("Failed to update auto-sync schedule")?;

        Self::read_envelope(response, "schedule update").await
    }

    /// Open a Socket.IO session over long-polling and return its session id.
    pub async fn realtime_handshake(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url("/socket.io/"))
            .query(&[("EIO", "4"), ("transport", "polling")])
            .send()
            .await
            .context("Failed to reach the real-time endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("Real-time handshake rejected with status {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read real-time handshake")?;
        // Engine.IO "open" packets are the digit 0 followed by a JSON payload.
        let payload = body
            .strip_prefix('0')
            .context("Unexpected real-time handshake packet")?;
        let open: Value =
            serde_json::from_str(payload).context("Invalid real-time handshake payload")?;

        open.get("sid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Real-time handshake carried no session id")
    }

    /// Fetch snapshots until the task reaches a terminal status.
    pub async fn poll_until_complete(
        &self,
        task_id: &str,
        interval: Duration,
        mut callback: impl FnMut(&TaskSnapshot),
    ) -> Result<TaskSnapshot> {
        loop {
            let snapshot = self.get_task(task_id).await?;
            callback(&snapshot);

            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::models::{Secret, TaskStatus};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RemoteClient {
        RemoteClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client =
            RemoteClient::new("https://api.example.com/".to_string(), Duration::from_secs(30));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url(), "https://api.example.com");
    }

    #[tokio::test]
    async fn test_get_config_scoped_by_context() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .and(query_param("grist_user_id", "5"))
            .and(query_param("grist_doc_id", "doc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "otp_config_id": 3,
                "demarche_number": "123",
                "has_ds_token": true
            })))
            .mount(&server)
            .await;

        let ctx = EmbeddingContext {
            doc_id: "doc123".to_string(),
            user_id: "5".to_string(),
            api_base_url: None,
        };
        let config = client_for(&server).get_config(Some(&ctx)).await.unwrap();

        assert_eq!(config.otp_config_id, Some(3));
        assert_eq!(config.demarche_number, Some(123));
        assert_eq!(config.ds_api_token, Secret::Absent);
        assert!(config.ds_token_configured());
    }

    #[tokio::test]
    async fn test_get_config_surfaces_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"success": false, "message": "base indisponible"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).get_config(None).await.unwrap_err();
        assert!(err.to_string().contains("base indisponible"));
    }

    #[tokio::test]
    async fn test_start_sync_rejection_is_an_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/start-sync"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "message": "Configuration incomplète. Champs manquants: grist_api_key",
                "missing_fields": ["grist_api_key"]
            })))
            .mount(&server)
            .await;

        let config = Configuration::default();
        let request = StartSyncRequest {
            config: &config,
            filters: Default::default(),
            otp_config_id: None,
            grist_user_id: "5",
            grist_doc_id: "doc",
        };
        let response = client_for(&server).start_sync(&request).await.unwrap();

        assert!(!response.success);
        assert_eq!(response.missing_fields, vec!["grist_api_key".to_string()]);
    }

    #[tokio::test]
    async fn test_groups_accept_numeric_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/groups"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([[1, "Paris"], ["2", "Lyon"]])),
            )
            .mount(&server)
            .await;

        let groups = client_for(&server).get_groups(None).await.unwrap();
        assert_eq!(
            groups,
            vec![
                ("1".to_string(), "Paris".to_string()),
                ("2".to_string(), "Lyon".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_schedule_toggle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/schedule"))
            .and(body_json(json!({"otp_config_id": 9})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "Schedule enabled"})),
            )
            .mount(&server)
            .await;

        let response = client_for(&server).set_schedule(9, true).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("Schedule enabled"));
    }

    #[tokio::test]
    async fn test_poll_until_complete_stops_on_terminal_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/task/task_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "running", "progress": 40, "message": "En cours", "logs": []
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/task/task_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed", "progress": 100, "message": "Done", "logs": []
            })))
            .mount(&server)
            .await;

        let mut seen = 0;
        let last = client_for(&server)
            .poll_until_complete("task_1", Duration::from_millis(10), |_| seen += 1)
            .await
            .unwrap();

        assert_eq!(seen, 3);
        assert_eq!(last.status, TaskStatus::Completed);
    }
}
