use crate::broker::{Delivery, DeliverySource};
use crate::command::Envelope;
use crate::error::DispatchError;
use crate::registry::CommandRegistry;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pause after a failed fetch before asking the source again
const FETCH_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Pulls delivery batches from a source and routes every delivery through the registry.
///
/// The consumer stops when it is shut down or dropped.
#[derive(Debug)]
pub struct Consumer {
    name: String,
    shutdown_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Consumer {
    /// Starts consuming from `source`, fetching at most `prefetch` deliveries at a time.
    ///
    /// The source must cap its unacknowledged deliveries at the pipeline capacity as
    /// well (see [`LocalBroker::subscribe`](crate::LocalBroker::subscribe)); otherwise a
    /// burst can overflow the queue.
    pub fn start<S: DeliverySource + 'static>(
        name: impl Into<String>,
        source: S,
        registry: Arc<CommandRegistry>,
        prefetch: usize,
    ) -> Self {
        let name = name.into();
        let shutdown_token = CancellationToken::new();
        let handle = tokio::spawn(consume(
            name.clone(),
            source,
            registry,
            prefetch.max(1),
            shutdown_token.clone(),
        ));

        Self {
            name,
            shutdown_token,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops fetching and waits for the current batch to be routed
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Consumer '{}' terminated abnormally: {}", self.name, e);
            }
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

async fn consume<S: DeliverySource>(
    name: String,
    source: S,
    registry: Arc<CommandRegistry>,
    prefetch: usize,
    shutdown_token: CancellationToken,
) {
    info!("Consumer '{}' started (prefetch: {})", name, prefetch);
    loop {
        let batch = tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!("Consumer '{}' shutting down", name);
                break;
            }
            batch = source.next_batch(prefetch) => batch,
        };

        match batch {
            Ok(deliveries) => {
                debug!("Consumer '{}' received {} deliveries", name, deliveries.len());
                for delivery in deliveries {
                    // failures are logged and settled inside route
                    let _ = route(&registry, delivery).await;
                }
            }
            Err(e) => {
                warn!("Consumer '{}' failed to fetch deliveries: {}", name, e);
                tokio::select! {
                    _ = shutdown_token.cancelled() => break,
                    _ = tokio::time::sleep(FETCH_RETRY_INTERVAL) => {}
                }
            }
        }
    }
}

/// Decodes a delivery's envelope and hands it to the handler for its kind.
///
/// Deliveries that cannot be decoded or have no handler would fail the same way on
/// every redelivery, so they are rejected without requeue.
pub async fn route(registry: &CommandRegistry, delivery: Delivery) -> Result<(), DispatchError> {
    let Delivery {
        tag, channel, body, ..
    } = delivery;

    let result = match Envelope::decode(&body) {
        Ok(envelope) => match registry.dispatch(&envelope.kind) {
            Some(handler) => handler.handle(tag, channel.clone(), envelope.payload).await,
            None => Err(DispatchError::UnknownKind(envelope.kind)),
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &result {
        error!(
            "Discarding delivery {} from channel {}: {}",
            tag,
            channel.id(),
            e
        );
        if let Err(reject_err) = channel.reject(tag, false).await {
            error!(
                "Failed to reject delivery {} on channel {}: {}",
                tag,
                channel.id(),
                reject_err
            );
        }
    }
    result
}
