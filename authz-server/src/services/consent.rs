use super::{CacheBridge, ServiceError};
use crate::cache::hashed_key;
use crate::models::{ConsentKey, ConsentRecord};
use crate::persistence::ConsentStore;
use chrono::Utc;
use log::debug;
use std::sync::Arc;
use write_behind::{publish_message, Message, Publisher};

fn consent_key(key: &ConsentKey) -> String {
    hashed_key(
        "consent",
        &format!("{}\n{}", key.registered_client_id, key.principal_name),
    )
}

#[derive(Clone)]
pub struct ConsentService {
    cache: CacheBridge,
    publisher: Arc<dyn Publisher>,
    queue: String,
    store: Arc<dyn ConsentStore>,
}

impl ConsentService {
    pub fn new(
        cache: CacheBridge,
        publisher: Arc<dyn Publisher>,
        queue: impl Into<String>,
        store: Arc<dyn ConsentStore>,
    ) -> Self {
        Self {
            cache,
            publisher,
            queue: queue.into(),
            store,
        }
    }

    /// Caches the consent and queues its durable write
    pub async fn save(&self, consent: &ConsentRecord) -> Result<(), ServiceError> {
        self.cache.put(&consent_key(&consent.key()), consent).await;
        publish_message(self.publisher.as_ref(), &self.queue, consent)
            .await
            .map_err(|source| ServiceError::Publish {
                kind: ConsentRecord::KIND,
                source,
            })
    }

    pub async fn find(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> Result<Option<ConsentRecord>, ServiceError> {
        let key = ConsentKey::new(registered_client_id, principal_name);
        if let Some(consent) = self.cache.get(&consent_key(&key)).await {
            return Ok(Some(consent));
        }
        Ok(self.store.find_consent(&key).await?)
    }

    /// Revokes a consent. Returns the revoked record, or `None` if there was no consent.
    pub async fn revoke(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> Result<Option<ConsentRecord>, ServiceError> {
        let Some(mut consent) = self.find(registered_client_id, principal_name).await? else {
            debug!(
                "No consent of '{}' for client '{}' to revoke",
                principal_name, registered_client_id
            );
            return Ok(None);
        };
        consent.revoke(Utc::now());
        self.save(&consent).await?;
        Ok(Some(consent))
    }
}
