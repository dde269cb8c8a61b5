use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use write_behind::Message;

/// An audit event emitted by the authorization server.
/// Audit events are only ever written; nothing reads them back through this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique tag of the event
    pub tag: String,
    pub initiator: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub actor_ip: Option<String>,
    #[serde(default)]
    pub actor_browser: Option<String>,
    #[serde(default)]
    pub actor_platform: Option<String>,
    pub tenant_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Action code, e.g. `token.issued`
    pub action: String,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        tag: impl Into<String>,
        tenant_id: impl Into<String>,
        initiator: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            initiator: initiator.into(),
            target: None,
            actor_ip: None,
            actor_browser: None,
            actor_platform: None,
            tenant_id: tenant_id.into(),
            user_id: None,
            action: action.into(),
            page: None,
            description: None,
            timestamp: Utc::now(),
        }
    }
}

impl Message for AuditRecord {
    type Key = String;
    const KIND: &'static str = "audit";

    fn natural_key(&self) -> String {
        self.tag.clone()
    }
}
