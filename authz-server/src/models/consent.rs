use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use write_behind::Message;

/// Identifies a consent: one per client and principal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsentKey {
    pub registered_client_id: String,
    pub principal_name: String,
}

impl ConsentKey {
    pub fn new(registered_client_id: impl Into<String>, principal_name: impl Into<String>) -> Self {
        Self {
            registered_client_id: registered_client_id.into(),
            principal_name: principal_name.into(),
        }
    }
}

/// Scopes a principal granted to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub tenant_id: String,
    pub registered_client_id: String,
    pub principal_name: String,
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub invalidated: bool,
    pub modified_at: DateTime<Utc>,
}

impl ConsentRecord {
    pub fn new(
        tenant_id: impl Into<String>,
        registered_client_id: impl Into<String>,
        principal_name: impl Into<String>,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            registered_client_id: registered_client_id.into(),
            principal_name: principal_name.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
            invalidated: false,
            modified_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ConsentKey {
        ConsentKey::new(&self.registered_client_id, &self.principal_name)
    }

    /// Marks the consent as revoked
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.invalidated = true;
        self.modified_at = now;
    }
}

impl Message for ConsentRecord {
    type Key = ConsentKey;
    const KIND: &'static str = "consent";

    fn natural_key(&self) -> ConsentKey {
        self.key()
    }
}
