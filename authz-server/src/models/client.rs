use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An OAuth2 client registration.
///
/// `client_secret` holds ciphertext as stored; only callers of the client service
/// ever see the decrypted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub tenant_id: String,
    pub client_name: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uris: BTreeSet<String>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub grant_types: BTreeSet<String>,
    pub client_id_issued_at: DateTime<Utc>,
}
