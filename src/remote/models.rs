// ABOUTME: Data structures exchanged with the connector backend
// ABOUTME: These are serialized to JSON for API communication

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire sentinel the backend uses for a stored secret it will not reveal.
pub const MASKED_SECRET: &str = "***";

pub const DEFAULT_DS_API_URL: &str = "https://www.demarches-simplifiees.fr/api/v2/graphql";
pub const DEFAULT_GRIST_BASE_URL: &str = "https://grist.numerique.gouv.fr/api";
pub const DEFAULT_BATCH_SIZE: u32 = 25;
pub const DEFAULT_MAX_WORKERS: u32 = 2;

/// A credential as seen by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Secret {
    #[default]
    Absent,
    /// Stored on the backend but not sent back.
    Masked,
    Revealed(String),
}

impl Secret {
    pub fn from_input(value: &str) -> Self {
        match value.trim() {
            "" => Secret::Absent,
            MASKED_SECRET => Secret::Masked,
            v => Secret::Revealed(v.to_string()),
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Secret::Absent)
    }

    pub fn revealed(&self) -> Option<&str> {
        match self {
            Secret::Revealed(v) => Some(v),
            _ => None,
        }
    }
}

impl Serialize for Secret {
    // An empty string tells the backend to keep what it already stores.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.revealed().unwrap_or(""))
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.map(|v| Secret::from_input(&v)).unwrap_or_default())
    }
}

/// Strings that the backend sometimes sends as numbers.
mod lenient_string {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Numeric identifiers the form submits as strings.
mod numeric_id {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(n) => s.serialize_str(&n.to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| de::Error::custom("identifier must be a positive integer")),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid identifier: {}", s))),
            _ => Ok(None),
        }
    }
}

/// Connector configuration as stored by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_config_id: Option<i64>,
    #[serde(default)]
    pub ds_api_token: Secret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_api_url: Option<String>,
    #[serde(default, with = "numeric_id")]
    pub demarche_number: Option<u64>,
    #[serde(default)]
    pub grist_base_url: Option<String>,
    #[serde(default)]
    pub grist_api_key: Secret,
    #[serde(default, deserialize_with = "lenient_string::deserialize")]
    pub grist_doc_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string::deserialize")]
    pub grist_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub filter_date_start: Option<String>,
    #[serde(default)]
    pub filter_date_end: Option<String>,
    #[serde(default)]
    pub filter_statuses: Option<String>,
    #[serde(default)]
    pub filter_groups: Option<String>,
    #[serde(default, skip_serializing)]
    pub has_ds_token: bool,
    #[serde(default, skip_serializing)]
    pub has_grist_key: bool,
}

impl Configuration {
    pub fn ds_token_configured(&self) -> bool {
        self.has_ds_token || self.ds_api_token.is_present()
    }

    pub fn grist_key_configured(&self) -> bool {
        self.has_grist_key || self.grist_api_key.is_present()
    }
}

/// Generic `{success, message}` envelope returned by mutating endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveConfigResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub otp_config_id: Option<i64>,
}

/// Filters in the form the sync endpoint expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncFilters {
    pub date_depot_debut: String,
    pub date_depot_fin: String,
    pub statuts_dossiers: String,
    pub groupes_instructeurs: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartSyncRequest<'a> {
    pub config: &'a Configuration,
    pub filters: SyncFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_config_id: Option<i64>,
    pub grist_user_id: &'a str,
    pub grist_doc_id: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartSyncResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

/// Body of `POST /api/test-connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionTestRequest {
    Demarches {
        api_token: String,
        api_url: String,
        demarche_number: String,
    },
    Grist {
        base_url: String,
        api_key: String,
        doc_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
    #[serde(other)]
    Other,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogEntry {
    /// Unix time in seconds.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub message: String,
}

/// One polled report of a backend job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
