//! Durable storage ports. The server ships an in-memory implementation; a SQL-backed
//! store implements the same traits.

use crate::models::{
    AuditRecord, AuthorizationRecord, ConsentKey, ConsentRecord, RegisteredClient, TokenType,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn save_audit(&self, record: &AuditRecord) -> Result<(), PersistenceError>;
}

/// Authorizations are upserted by id; saving an authorization for a (client,
/// principal) pair that already has one replaces it.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Upserts the whole batch in one transaction
    async fn save_authorizations(
        &self,
        batch: &[AuthorizationRecord],
    ) -> Result<(), PersistenceError>;

    async fn find_authorization_by_id(
        &self,
        id: &str,
    ) -> Result<Option<AuthorizationRecord>, PersistenceError>;

    async fn find_authorization_by_token(
        &self,
        value: &str,
        token_type: Option<TokenType>,
    ) -> Result<Option<AuthorizationRecord>, PersistenceError>;

    async fn find_authorization_by_client_and_principal(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> Result<Option<AuthorizationRecord>, PersistenceError>;
}

#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Upserts the whole batch in one transaction
    async fn save_consents(&self, batch: &[ConsentRecord]) -> Result<(), PersistenceError>;

    async fn find_consent(&self, key: &ConsentKey)
        -> Result<Option<ConsentRecord>, PersistenceError>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_client(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, PersistenceError>;
}
