// ABOUTME: Resolves the host document identity the connector works for
// ABOUTME: The host handshake is injected so the rest of the crate can be tested without it

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde_json::Value;

use crate::error::ConnectorError;

/// Access token handed out by the host document.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub token: String,
    /// Document base URL, e.g. `https://grist.example.com/o/team/api/docs/abc`.
    pub base_url: String,
}

/// The handshake surface of the host platform.
#[async_trait]
pub trait EmbeddingHost: Send + Sync {
    /// Announce the widget and request full document access.
    async fn ready(&self) -> Result<()>;

    async fn access_token(&self) -> Result<TokenInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingContext {
    pub doc_id: String,
    pub user_id: String,
    pub api_base_url: Option<String>,
}

impl EmbeddingContext {
    /// Query string scoping backend calls to this document and user.
    pub fn query_params(&self) -> String {
        format!(
            "?grist_user_id={}&grist_doc_id={}",
            urlencoding::encode(&self.user_id),
            urlencoding::encode(&self.doc_id)
        )
    }
}

/// Keep everything up to and including the first `/api` segment.
pub fn api_base_url_from_doc_base_url(doc_base_url: &str) -> Option<String> {
    let idx = doc_base_url.find("/api")?;
    if idx == 0 {
        return None;
    }
    Some(doc_base_url[..idx + "/api".len()].to_string())
}

fn decode_token_payload(token: &str) -> Result<Value> {
    let segment = token
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow!("access token is not a JWT"))?;
    let segment = segment.trim_end_matches('=');

    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD_NO_PAD.decode(segment))
        .context("access token payload is not base64")?;

    serde_json::from_slice(&bytes).context("access token payload is not JSON")
}

fn claim_as_string(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn try_resolve(host: &dyn EmbeddingHost) -> Result<EmbeddingContext> {
    host.ready().await?;
    let info = host.access_token().await?;
    let payload = decode_token_payload(&info.token)?;

    let doc_id = claim_as_string(&payload, "docId");
    let user_id = claim_as_string(&payload, "userId");

    match (doc_id, user_id) {
        (Some(doc_id), Some(user_id)) => Ok(EmbeddingContext {
            doc_id,
            user_id,
            api_base_url: api_base_url_from_doc_base_url(&info.base_url),
        }),
        _ => Err(anyhow!("Impossible de récupérer le user id ou le doc id")),
    }
}

/// Run the host handshake and extract the document identity.
///
/// Every failure collapses into [`ConnectorError::Context`] with the message
/// asking the user to grant full document access.
pub async fn resolve_context(host: &dyn EmbeddingHost) -> Result<EmbeddingContext, ConnectorError> {
    try_resolve(host).await.map_err(|e| {
        tracing::warn!("Embedding context unavailable: {:#}", e);
        ConnectorError::context_unavailable()
    })
}

/// Host backed by a token and base URL supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    token: Option<String>,
    base_url: Option<String>,
}

impl StaticHost {
    pub fn new(token: Option<String>, base_url: Option<String>) -> Self {
        Self { token, base_url }
    }
}

#[async_trait]
impl EmbeddingHost for StaticHost {
    async fn ready(&self) -> Result<()> {
        if self.token.is_none() {
            anyhow::bail!("host not available");
        }
        Ok(())
    }

    async fn access_token(&self) -> Result<TokenInfo> {
        let token = self.token.clone().context("no access token provided")?;
        Ok(TokenInfo {
            token,
            base_url: self.base_url.clone().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
pub(crate) fn fake_token(payload: &Value) -> String {
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("eyJhbGciOiJIUzI1NiJ9.{}.signature", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_base_url_truncates_at_first_api_segment() {
        assert_eq!(
            api_base_url_from_doc_base_url("https://grist.example.com/o/docs/api/docs/abc123"),
            Some("https://grist.example.com/o/docs/api".to_string())
        );
        assert_eq!(
            api_base_url_from_doc_base_url("https://grist.example.com/api/docs/x/api"),
            Some("https://grist.example.com/api".to_string())
        );
        assert_eq!(api_base_url_from_doc_base_url("https://grist.example.com"), None);
    }

    #[test]
    fn test_query_params_are_encoded() {
        let ctx = EmbeddingContext {
            doc_id: "doc 1".to_string(),
            user_id: "42".to_string(),
            api_base_url: None,
        };
        assert_eq!(ctx.query_params(), "?grist_user_id=42&grist_doc_id=doc%201");
    }

    #[tokio::test]
    async fn test_resolve_context_from_token() {
        let token = fake_token(&json!({"docId": "abc123", "userId": 7}));
        let host = StaticHost::new(
            Some(token),
            Some("https://grist.example.com/api/docs/abc123".to_string()),
        );

        let ctx = resolve_context(&host).await.unwrap();
        assert_eq!(ctx.doc_id, "abc123");
        assert_eq!(ctx.user_id, "7");
        assert_eq!(ctx.api_base_url.as_deref(), Some("https://grist.example.com/api"));
    }

    #[tokio::test]
    async fn test_missing_identity_is_context_error() {
        let token = fake_token(&json!({"docId": "abc123"}));
        let host = StaticHost::new(Some(token), None);

        let err = resolve_context(&host).await.unwrap_err();
        assert_eq!(err, ConnectorError::context_unavailable());
    }

    #[tokio::test]
    async fn test_no_host_is_context_error() {
        let host = StaticHost::default();
        let err = resolve_context(&host).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Context(_)));
    }
}
