use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use write_behind::Message;

/// A token issued as part of an authorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OAuthToken {
    pub fn new(
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_at,
            metadata: HashMap::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// The kinds of values an authorization can be looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    State,
    AuthorizationCode,
    AccessToken,
    RefreshToken,
    IdToken,
}

impl TokenType {
    pub const ALL: [TokenType; 5] = [
        TokenType::State,
        TokenType::AuthorizationCode,
        TokenType::AccessToken,
        TokenType::RefreshToken,
        TokenType::IdToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::State => "state",
            TokenType::AuthorizationCode => "authorization_code",
            TokenType::AccessToken => "access_token",
            TokenType::RefreshToken => "refresh_token",
            TokenType::IdToken => "id_token",
        }
    }
}

/// State of one OAuth2 authorization: granted scopes and the tokens issued for it.
///
/// Unique on `id` and on (client, principal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub id: String,
    pub tenant_id: String,
    pub registered_client_id: String,
    pub principal_name: String,
    pub authorization_grant_type: String,
    #[serde(default)]
    pub authorized_scopes: BTreeSet<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub authorization_code: Option<OAuthToken>,
    #[serde(default)]
    pub access_token: Option<OAuthToken>,
    #[serde(default)]
    pub refresh_token: Option<OAuthToken>,
    #[serde(default)]
    pub id_token: Option<OAuthToken>,
    #[serde(default)]
    pub invalidated: bool,
    pub modified_at: DateTime<Utc>,
}

impl AuthorizationRecord {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        registered_client_id: impl Into<String>,
        principal_name: impl Into<String>,
        authorization_grant_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            registered_client_id: registered_client_id.into(),
            principal_name: principal_name.into(),
            authorization_grant_type: authorization_grant_type.into(),
            authorized_scopes: BTreeSet::new(),
            state: None,
            authorization_code: None,
            access_token: None,
            refresh_token: None,
            id_token: None,
            invalidated: false,
            modified_at: Utc::now(),
        }
    }

    /// The value of the given token type, if the authorization carries one
    pub fn token_value(&self, token_type: TokenType) -> Option<&str> {
        let token = match token_type {
            TokenType::State => return self.state.as_deref(),
            TokenType::AuthorizationCode => &self.authorization_code,
            TokenType::AccessToken => &self.access_token,
            TokenType::RefreshToken => &self.refresh_token,
            TokenType::IdToken => &self.id_token,
        };
        token.as_ref().map(|token| token.value.as_str())
    }

    /// Every value this authorization can be looked up by
    pub fn lookup_values(&self) -> Vec<(TokenType, &str)> {
        TokenType::ALL
            .iter()
            .filter_map(|&token_type| self.token_value(token_type).map(|value| (token_type, value)))
            .collect()
    }

    /// Whether `value` matches this authorization, restricted to `token_type` when given
    pub fn matches_token(&self, value: &str, token_type: Option<TokenType>) -> bool {
        match token_type {
            Some(token_type) => self.token_value(token_type) == Some(value),
            None => self.lookup_values().iter().any(|(_, v)| *v == value),
        }
    }

    /// Marks the authorization and every token it carries as no longer usable
    pub fn invalidate(&mut self, now: DateTime<Utc>) {
        self.invalidated = true;
        self.modified_at = now;
    }
}

impl Message for AuthorizationRecord {
    type Key = String;
    const KIND: &'static str = "authorization";

    fn natural_key(&self) -> String {
        self.id.clone()
    }
}
