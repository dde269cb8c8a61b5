use super::{CacheBridge, ServiceError};
use crate::cache::hashed_key;
use crate::models::{AuthorizationRecord, TokenType};
use crate::persistence::AuthorizationStore;
use chrono::Utc;
use log::debug;
use std::sync::Arc;
use write_behind::{publish_message, Message, Publisher};

fn id_key(id: &str) -> String {
    format!("authorization:id:{id}")
}

fn token_key(value: &str) -> String {
    hashed_key("authorization:token", value)
}

fn principal_key(registered_client_id: &str, principal_name: &str) -> String {
    hashed_key(
        "authorization:principal",
        &format!("{registered_client_id}\n{principal_name}"),
    )
}

/// Stores and looks up authorizations.
///
/// The record is cached under its id; every token value and the (client, principal)
/// pair are cached as pointers to that id.
#[derive(Clone)]
pub struct AuthorizationService {
    cache: CacheBridge,
    publisher: Arc<dyn Publisher>,
    queue: String,
    store: Arc<dyn AuthorizationStore>,
}

impl AuthorizationService {
    pub fn new(
        cache: CacheBridge,
        publisher: Arc<dyn Publisher>,
        queue: impl Into<String>,
        store: Arc<dyn AuthorizationStore>,
    ) -> Self {
        Self {
            cache,
            publisher,
            queue: queue.into(),
            store,
        }
    }

    /// Caches the authorization under every lookup key and queues its durable write
    pub async fn save(&self, authorization: &AuthorizationRecord) -> Result<(), ServiceError> {
        self.cache.put(&id_key(&authorization.id), authorization).await;
        for (_, value) in authorization.lookup_values() {
            self.cache.put(&token_key(value), &authorization.id).await;
        }
        self.cache
            .put(
                &principal_key(
                    &authorization.registered_client_id,
                    &authorization.principal_name,
                ),
                &authorization.id,
            )
            .await;

        publish_message(self.publisher.as_ref(), &self.queue, authorization)
            .await
            .map_err(|source| ServiceError::Publish {
                kind: AuthorizationRecord::KIND,
                source,
            })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<AuthorizationRecord>, ServiceError> {
        if let Some(authorization) = self.cache.get(&id_key(id)).await {
            return Ok(Some(authorization));
        }
        Ok(self.store.find_authorization_by_id(id).await?)
    }

    /// Finds the authorization holding `value` as state or token, restricted to
    /// `token_type` when given
    pub async fn find_by_token(
        &self,
        value: &str,
        token_type: Option<TokenType>,
    ) -> Result<Option<AuthorizationRecord>, ServiceError> {
        if let Some(authorization) = self.cached_by_pointer(&token_key(value)).await {
            if authorization.matches_token(value, token_type) {
                return Ok(Some(authorization));
            }
        }
        Ok(self
            .store
            .find_authorization_by_token(value, token_type)
            .await?)
    }

    pub async fn find_by_client_and_principal(
        &self,
        registered_client_id: &str,
        principal_name: &str,
    ) -> Result<Option<AuthorizationRecord>, ServiceError> {
        let key = principal_key(registered_client_id, principal_name);
        if let Some(authorization) = self.cached_by_pointer(&key).await {
            if authorization.registered_client_id == registered_client_id
                && authorization.principal_name == principal_name
            {
                return Ok(Some(authorization));
            }
        }
        Ok(self
            .store
            .find_authorization_by_client_and_principal(registered_client_id, principal_name)
            .await?)
    }

    /// Invalidates an authorization through the regular write path. Returns the
    /// invalidated record, or `None` if the id is unknown.
    pub async fn invalidate(&self, id: &str) -> Result<Option<AuthorizationRecord>, ServiceError> {
        let Some(mut authorization) = self.find_by_id(id).await? else {
            debug!("No authorization '{}' to invalidate", id);
            return Ok(None);
        };
        authorization.invalidate(Utc::now());
        self.save(&authorization).await?;
        Ok(Some(authorization))
    }

    async fn cached_by_pointer(&self, key: &str) -> Option<AuthorizationRecord> {
        let id: String = self.cache.get(key).await?;
        self.cache.get(&id_key(&id)).await
    }
}
