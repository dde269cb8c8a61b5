use crate::broker::{BrokerChannel, DeliveryTag};
use crate::error::DispatchError;
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// Receives the decoded payload of a delivery for one message kind
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Kind code this handler is responsible for
    fn kind(&self) -> &str;

    /// Takes ownership of a delivery. The handler settles it, now or later.
    async fn handle(
        &self,
        tag: DeliveryTag,
        channel: Arc<dyn BrokerChannel>,
        payload: serde_json::Value,
    ) -> Result<(), DispatchError>;
}

/// Maps message kinds to their handlers. Built once at startup and shared.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::default()
    }

    /// Returns the handler registered for `kind`
    pub fn dispatch(&self, kind: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[derive(Default)]
pub struct CommandRegistryBuilder {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistryBuilder {
    /// Registers a handler under its kind. The first handler registered for a kind
    /// wins; later registrations for the same kind are ignored.
    pub fn register(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        match self.handlers.entry(handler.kind().to_string()) {
            Entry::Occupied(entry) => {
                warn!(
                    "Handler for kind '{}' already registered, ignoring the new one",
                    entry.key()
                );
            }
            Entry::Vacant(entry) => {
                info!("Registered handler for kind '{}'", entry.key());
                entry.insert(handler);
            }
        }
        self
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            handlers: self.handlers,
        }
    }
}
