use super::{CacheBridge, ServiceError};
use crate::models::RegisteredClient;
use crate::persistence::ClientStore;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct CipherError(pub String);

/// Encryption of client secrets at rest
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// Cipher for deployments that keep client secrets unencrypted
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCipher;

impl Cipher for PassthroughCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        Ok(ciphertext.to_string())
    }
}

fn client_key(client_id: &str) -> String {
    format!("client:{client_id}")
}

/// Read access to client registrations.
///
/// The cache holds registrations exactly as stored, secret still encrypted. Every
/// lookup decrypts into a fresh copy, so a cached entry is never modified.
#[derive(Clone)]
pub struct ClientService {
    cache: CacheBridge,
    store: Arc<dyn ClientStore>,
    cipher: Arc<dyn Cipher>,
}

impl ClientService {
    pub fn new(cache: CacheBridge, store: Arc<dyn ClientStore>, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            cache,
            store,
            cipher,
        }
    }

    pub async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, ServiceError> {
        let key = client_key(client_id);
        let stored = match self.cache.get::<RegisteredClient>(&key).await {
            Some(client) => client,
            None => match self.store.find_client(client_id).await? {
                Some(client) => {
                    self.cache.put(&key, &client).await;
                    client
                }
                None => return Ok(None),
            },
        };
        Ok(Some(self.decrypted(stored)?))
    }

    fn decrypted(&self, mut client: RegisteredClient) -> Result<RegisteredClient, CipherError> {
        if let Some(secret) = client.client_secret.take() {
            client.client_secret = Some(self.cipher.decrypt(&secret)?);
        }
        Ok(client)
    }
}
