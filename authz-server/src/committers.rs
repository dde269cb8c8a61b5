//! Batch committers for the three message kinds.

use crate::models::{AuditRecord, AuthorizationRecord, ConsentKey, ConsentRecord};
use crate::persistence::{AuditStore, AuthorizationStore, ConsentStore};
use async_trait::async_trait;
use log::{error, warn};
use std::sync::Arc;
use write_behind::committer::all_failed;
use write_behind::{BatchCommitter, FailureSet};

/// Saves audits one at a time; a failing audit does not affect the others
pub struct AuditCommitter {
    store: Arc<dyn AuditStore>,
}

impl AuditCommitter {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BatchCommitter<AuditRecord> for AuditCommitter {
    async fn commit(&self, batch: &[AuditRecord]) -> FailureSet<String> {
        let mut failures = FailureSet::new();
        for record in batch {
            if let Err(e) = self.store.save_audit(record).await {
                warn!("Failed to save audit '{}': {}", record.tag, e);
                failures.insert(record.tag.clone());
            }
        }
        failures
    }
}

/// Upserts authorizations in one batch; any error fails the whole batch
pub struct AuthorizationCommitter {
    store: Arc<dyn AuthorizationStore>,
}

impl AuthorizationCommitter {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BatchCommitter<AuthorizationRecord> for AuthorizationCommitter {
    async fn commit(&self, batch: &[AuthorizationRecord]) -> FailureSet<String> {
        match self.store.save_authorizations(batch).await {
            Ok(()) => FailureSet::new(),
            Err(e) => {
                error!("Failed to save {} authorization(s): {}", batch.len(), e);
                all_failed(batch)
            }
        }
    }
}

/// Upserts consents in one batch; any error fails the whole batch
pub struct ConsentCommitter {
    store: Arc<dyn ConsentStore>,
}

impl ConsentCommitter {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BatchCommitter<ConsentRecord> for ConsentCommitter {
    async fn commit(&self, batch: &[ConsentRecord]) -> FailureSet<ConsentKey> {
        match self.store.save_consents(batch).await {
            Ok(()) => FailureSet::new(),
            Err(e) => {
                error!("Failed to save {} consent(s): {}", batch.len(), e);
                all_failed(batch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn audits(tags: &[&str]) -> Vec<AuditRecord> {
        tags.iter()
            .map(|tag| AuditRecord::new(*tag, "tenant", "system", "token.issued"))
            .collect()
    }

    #[tokio::test]
    async fn test_audit_failures_are_itemwise() {
        let store = Arc::new(MemoryStore::new());
        store.reject_audit("e2");
        let committer = AuditCommitter::new(store.clone());

        let failures = committer.commit(&audits(&["e1", "e2", "e3"])).await;

        assert_eq!(failures, FailureSet::from(["e2".to_string()]));
        assert_eq!(store.audit_count(), 2);
        assert!(store.audit("e3").is_some());
    }

    #[tokio::test]
    async fn test_authorization_failure_fails_whole_batch() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let committer = AuthorizationCommitter::new(store.clone());
        let batch = vec![
            AuthorizationRecord::new("a1", "t", "c1", "alice", "authorization_code"),
            AuthorizationRecord::new("a2", "t", "c1", "bob", "authorization_code"),
        ];

        let failures = committer.commit(&batch).await;

        assert_eq!(
            failures,
            FailureSet::from(["a1".to_string(), "a2".to_string()])
        );
    }

    #[tokio::test]
    async fn test_consent_batch_is_saved() {
        let store = Arc::new(MemoryStore::new());
        let committer = ConsentCommitter::new(store.clone());
        let batch = vec![
            ConsentRecord::new("t", "c1", "alice", ["read"]),
            ConsentRecord::new("t", "c1", "bob", ["read", "write"]),
        ];

        let failures = committer.commit(&batch).await;

        assert!(failures.is_empty());
        assert_eq!(store.consent_count(), 2);
        assert_eq!(store.batch_writes(), 1);
    }
}
