use super::{AuditStore, AuthorizationStore, ClientStore, ConsentStore, PersistenceError};
use crate::models::{
    AuditRecord, AuthorizationRecord, ConsentKey, ConsentRecord, RegisteredClient, TokenType,
};
use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    audits: HashMap<String, AuditRecord>,
    authorizations: HashMap<String, AuthorizationRecord>,
    consents: HashMap<ConsentKey, ConsentRecord>,
    clients: HashMap<String, RegisteredClient>,
    failing_audit_tags: HashSet<String>,
}

/// In-memory store.
///
/// Upserts keep the newer record: a write whose `modified_at` is older than the
/// stored one is skipped, so a redelivered stale message cannot roll a record back.
/// The store can be switched offline to simulate an outage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
    batch_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again) with `Unavailable`
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Makes saving the audit with this tag fail with a constraint violation
    pub fn reject_audit(&self, tag: impl Into<String>) {
        self.write().failing_audit_tags.insert(tag.into());
    }

    pub fn insert_client(&self, client: RegisteredClient) {
        self.write()
            .clients
            .insert(client.client_id.clone(), client);
    }

    pub fn audit(&self, tag: &str) -> Option<AuditRecord> {
        self.read().audits.get(tag).cloned()
    }

    pub fn audit_count(&self) -> usize {
        self.read().audits.len()
    }

    pub fn authorization_count(&self) -> usize {
        self.read().authorizations.len()
    }

    pub fn consent_count(&self) -> usize {
        self.read().consents.len()
    }

    /// Number of successful batch writes (authorizations and consents)
    pub fn batch_writes(&self) -> usize {
        self.batch_writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(PersistenceError::Unavailable(
                "memory store is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn save_audit(&self, record: &AuditRecord) -> Result<(), PersistenceError> {
        self.check_available()?;
        let mut tables = self.write();
        if tables.failing_audit_tags.contains(&record.tag) {
            return Err(PersistenceError::Constraint(format!(
                "audit '{}' rejected",
                record.tag
            )));
        }
        tables.audits.insert(record.tag.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl AuthorizationStore for MemoryStore {
    async fn save_authorizations(
        &self,
        batch: &[AuthorizationRecord],
    ) -> Result<(), PersistenceError> {
        self.check_available()?;
        if let Some(record) = batch.iter().find(|r| r.id.is_empty()) {
            return Err(PersistenceError::Constraint(format!(
                "authorization for client '{}' has no id",
                record.registered_client_id
            )));
        }

        let mut tables = self.write();
        for record in batch {
            if let Some(existing) = tables.authorizations.get(&record.id) {
                if existing.modified_at > record.modified_at {
                    debug!("Skipping stale write of authorization '{}'", record.id);
                    continue;
                }
            }
            // one authorization per (client, principal)
            tables.authorizations.retain(|id, existing| {
                *id == record.id
                    || existing.registered_client_id != record.registered_client_id
                    || existing.principal_name != record.principal_name
            });
            tables
                .authorizations
                .insert(record.id.clone(), record.clone());
        }
        self.batch_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_authorization_by_id(
        &self,
        id: &str,
    ) -> Result<Option<AuthorizationRecord>, PersistenceError> {
        self.check_available()?;
        Ok(self.read().authorizations.get(id).cloned())
    }

    async fn find_authorization_by_token(
        &self,
        value: &str,
        token_type: Option<TokenType>,
    ) -> Result<Option<AuthorizationRecord>, PersistenceError> {
        self.check_available()?;
        Ok(self
            .read()
            .authorizations
            .values()
            .find(|record| record.matches_token(value, token_type))
            .cloned())
    }

    async fn find_authorization_by_client_and_principal(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> Result<Option<AuthorizationRecord>, PersistenceError> {
        self.check_available()?;
        Ok(self
            .read()
            .authorizations
            .values()
            .find(|record| {
                record.registered_client_id == registered_client_id
                    && record.principal_name == principal_name
            })
            .cloned())
    }
}

#[async_trait]
impl ConsentStore for MemoryStore {
    async fn save_consents(&self, batch: &[ConsentRecord]) -> Result<(), PersistenceError> {
        self.check_available()?;
        let mut tables = self.write();
        for record in batch {
            let key = record.key();
            if let Some(existing) = tables.consents.get(&key) {
                if existing.modified_at > record.modified_at {
                    debug!("Skipping stale write of consent {:?}", key);
                    continue;
                }
            }
            tables.consents.insert(key, record.clone());
        }
        self.batch_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_consent(
        &self,
        key: &ConsentKey,
    ) -> Result<Option<ConsentRecord>, PersistenceError> {
        self.check_available()?;
        Ok(self.read().consents.get(key).cloned())
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn find_client(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, PersistenceError> {
        self.check_available()?;
        Ok(self.read().clients.get(client_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn authorization(id: &str, client: &str, principal: &str) -> AuthorizationRecord {
        AuthorizationRecord::new(id, "tenant", client, principal, "authorization_code")
    }

    #[tokio::test]
    async fn test_authorization_upsert_replaces_same_client_and_principal() {
        let store = MemoryStore::new();
        store
            .save_authorizations(&[authorization("a1", "c1", "alice")])
            .await
            .unwrap();

        store
            .save_authorizations(&[authorization("a2", "c1", "alice")])
            .await
            .unwrap();

        assert_eq!(store.authorization_count(), 1);
        assert!(store.find_authorization_by_id("a1").await.unwrap().is_none());
        let found = store
            .find_authorization_by_client_and_principal("c1", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "a2");
    }

    #[tokio::test]
    async fn test_stale_write_is_skipped() {
        let store = MemoryStore::new();
        let mut newer = authorization("a1", "c1", "alice");
        newer.invalidated = true;
        let mut older = newer.clone();
        older.invalidated = false;
        older.modified_at = newer.modified_at - Duration::seconds(5);

        store.save_authorizations(&[newer]).await.unwrap();
        store.save_authorizations(&[older]).await.unwrap();

        let stored = store.find_authorization_by_id("a1").await.unwrap().unwrap();
        assert!(stored.invalidated);
    }

    #[tokio::test]
    async fn test_batch_with_missing_id_is_rejected_whole() {
        let store = MemoryStore::new();
        let result = store
            .save_authorizations(&[authorization("a1", "c1", "alice"), authorization("", "c2", "bob")])
            .await;

        assert!(matches!(result, Err(PersistenceError::Constraint(_))));
        assert_eq!(store.authorization_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);

        let consent = ConsentRecord::new("t", "c1", "alice", ["read"]);
        assert!(store.save_consents(&[consent.clone()]).await.is_err());
        assert!(store.find_consent(&consent.key()).await.is_err());

        store.set_available(true);
        store.save_consents(&[consent.clone()]).await.unwrap();
        assert_eq!(
            store.find_consent(&consent.key()).await.unwrap(),
            Some(consent)
        );
    }

    #[tokio::test]
    async fn test_find_by_token() {
        let store = MemoryStore::new();
        let mut record = authorization("a1", "c1", "alice");
        record.refresh_token = Some(crate::models::OAuthToken::new("rt", Utc::now(), None));
        store.save_authorizations(&[record]).await.unwrap();

        let by_any = store.find_authorization_by_token("rt", None).await.unwrap();
        let by_type = store
            .find_authorization_by_token("rt", Some(TokenType::RefreshToken))
            .await
            .unwrap();
        let wrong_type = store
            .find_authorization_by_token("rt", Some(TokenType::AccessToken))
            .await
            .unwrap();

        assert_eq!(by_any.map(|r| r.id), Some("a1".to_string()));
        assert!(by_type.is_some());
        assert!(wrong_type.is_none());
    }
}
