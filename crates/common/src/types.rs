use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Google service-account credential, as found in a downloaded key file.
///
/// Only the fields the relay needs are kept; everything else in the file
/// (`type`, `private_key_id`, `client_id`, ...) is ignored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountCredential {
    /// Identity of the signer; used as both `iss` and `sub`
    pub client_email: String,
    /// PEM-encoded PKCS8 RSA private key
    pub private_key: String,
    /// Push gateway routing target
    pub project_id: String,
}

impl ServiceAccountCredential {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Inbound database-webhook body. Only `record` is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerPayload {
    #[serde(default)]
    pub record: Option<NotificationRecord>,
}

/// The inserted notification row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Target user; uuid/text keys arrive as strings, integer keys as numbers
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Custom key/value data forwarded to the device
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Row id; string or numeric depending on the table's key type
    #[serde(default)]
    pub id: Option<Value>,
}

impl NotificationRecord {
    /// The target user rendered as a string, if present and non-empty.
    pub fn target_user(&self) -> Option<String> {
        match self.user_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The row id rendered as a string, as sent in `data.notification_id`.
    pub fn notification_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Result of delivering one notification to one push token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Gateway accepted the message; `response` is its JSON answer.
    Delivered { token: String, response: Value },
    /// Transport failure (`http_status` is `None`) or a non-2xx answer.
    Failed {
        token: String,
        http_status: Option<u16>,
        error: String,
        response: Option<Value>,
    },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    /// Device token this outcome belongs to.
    pub fn token(&self) -> &str {
        match self {
            DispatchOutcome::Delivered { token, .. } | DispatchOutcome::Failed { token, .. } => {
                token
            }
        }
    }
}
