use crate::cache::Cache;
use crate::committers::{AuditCommitter, AuthorizationCommitter, ConsentCommitter};
use crate::config::{AppConfig, PipelineConfig};
use crate::models::{AuditRecord, AuthorizationRecord, ConsentRecord};
use crate::persistence::MemoryStore;
use crate::services::{
    AuditService, AuthorizationService, CacheBridge, Cipher, ClientService, ConsentService,
    PassthroughCipher,
};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use write_behind::{
    CommandRegistry, Consumer, FlushDriver, LocalBroker, LocalChannel, Message, Publisher,
    StatsSnapshot, WriteBehind,
};

/// Snapshot of one pipeline for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub kind: &'static str,
    pub queue: String,
    /// Commands buffered in memory
    pub depth: usize,
    pub capacity: usize,
    /// Messages waiting at the broker
    pub pending: usize,
    pub stats: StatsSnapshot,
}

impl PipelineStatus {
    pub fn is_saturated(&self) -> bool {
        self.depth >= self.capacity
    }
}

/// The write-behind pipelines, one per message kind
#[derive(Clone)]
pub struct Pipelines {
    pub audit: Arc<WriteBehind<AuditRecord>>,
    pub authorization: Arc<WriteBehind<AuthorizationRecord>>,
    pub consent: Arc<WriteBehind<ConsentRecord>>,
}

impl Pipelines {
    pub fn new(store: Arc<MemoryStore>, config: &PipelineConfig) -> Self {
        let options = config.options();
        Self {
            audit: Arc::new(WriteBehind::new(
                AuditCommitter::new(store.clone()),
                options.clone(),
            )),
            authorization: Arc::new(WriteBehind::new(
                AuthorizationCommitter::new(store.clone()),
                options.clone(),
            )),
            consent: Arc::new(WriteBehind::new(ConsentCommitter::new(store), options)),
        }
    }

    /// Registry routing every message kind to its pipeline
    pub fn registry(&self) -> CommandRegistry {
        CommandRegistry::builder()
            .register(self.audit.clone())
            .register(self.authorization.clone())
            .register(self.consent.clone())
            .build()
    }

    /// Flushes every pipeline once
    pub async fn flush_all(&self) {
        tokio::join!(
            self.audit.flush(),
            self.authorization.flush(),
            self.consent.flush()
        );
    }
}

/// Background tasks moving messages from the broker into durable storage
struct Workers {
    consumers: Vec<Consumer>,
    flush_drivers: Vec<FlushDriver>,
    channels: Vec<Arc<LocalChannel>>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<Cache>,
    pub broker: LocalBroker,
    pub store: Arc<MemoryStore>,
    pub pipelines: Pipelines,
    pub authorizations: AuthorizationService,
    pub consents: ConsentService,
    pub audits: AuditService,
    pub clients: ClientService,
    workers: Arc<Mutex<Option<Workers>>>,
}

impl AppState {
    /// Builds the state and starts a consumer and a flush driver per message kind.
    /// Must be called within a Tokio runtime.
    pub fn start(config: AppConfig, cache: Cache) -> Self {
        Self::start_with_cipher(config, cache, Arc::new(PassthroughCipher))
    }

    pub fn start_with_cipher(config: AppConfig, cache: Cache, cipher: Arc<dyn Cipher>) -> Self {
        let mut state = Self::build(config, cache, cipher);
        let workers = state.start_workers();
        state.workers = Arc::new(Mutex::new(Some(workers)));
        state
    }

    fn build(config: AppConfig, cache: Cache, cipher: Arc<dyn Cipher>) -> Self {
        let cache = Arc::new(cache);
        let bridge = CacheBridge::new(cache.clone(), Duration::from_secs(config.cache.ttl_secs));
        let broker = LocalBroker::new();
        let publisher: Arc<dyn Publisher> = Arc::new(broker.clone());
        let store = Arc::new(MemoryStore::new());
        let queues = &config.pipeline.queues;

        Self {
            pipelines: Pipelines::new(store.clone(), &config.pipeline),
            authorizations: AuthorizationService::new(
                bridge.clone(),
                publisher.clone(),
                &queues.authorization,
                store.clone(),
            ),
            consents: ConsentService::new(
                bridge.clone(),
                publisher.clone(),
                &queues.consent,
                store.clone(),
            ),
            audits: AuditService::new(publisher, &queues.audit),
            clients: ClientService::new(bridge, store.clone(), cipher),
            config: Arc::new(config),
            cache,
            broker,
            store,
            workers: Arc::new(Mutex::new(None)),
        }
    }

    fn start_workers(&self) -> Workers {
        let pipeline = &self.config.pipeline;
        let registry = Arc::new(self.pipelines.registry());
        let period = pipeline.flush_period();

        let mut consumers = Vec::new();
        let mut channels = Vec::new();
        for queue in [
            &pipeline.queues.audit,
            &pipeline.queues.authorization,
            &pipeline.queues.consent,
        ] {
            // a channel per queue, so a cumulative ack never covers another kind
            let subscription = self.broker.subscribe(queue, pipeline.capacity);
            channels.push(subscription.channel().clone());
            consumers.push(Consumer::start(
                queue.clone(),
                subscription,
                registry.clone(),
                pipeline.capacity,
            ));
        }

        let flush_drivers = vec![
            FlushDriver::start(self.pipelines.audit.clone(), period),
            FlushDriver::start(self.pipelines.authorization.clone(), period),
            FlushDriver::start(self.pipelines.consent.clone(), period),
        ];

        info!(
            "Started write-behind pipelines for {:?} (flush period: {:?}, capacity: {})",
            registry.kinds(),
            period,
            pipeline.capacity
        );
        Workers {
            consumers,
            flush_drivers,
            channels,
        }
    }

    /// Status of every pipeline
    pub fn pipeline_statuses(&self) -> Vec<PipelineStatus> {
        let queues = &self.config.pipeline.queues;
        vec![
            self.status_of(&self.pipelines.audit, &queues.audit),
            self.status_of(&self.pipelines.authorization, &queues.authorization),
            self.status_of(&self.pipelines.consent, &queues.consent),
        ]
    }

    fn status_of<T: Message>(&self, pipeline: &WriteBehind<T>, queue: &str) -> PipelineStatus {
        PipelineStatus {
            kind: pipeline.kind(),
            queue: queue.to_string(),
            depth: pipeline.depth(),
            capacity: pipeline.capacity(),
            pending: self.broker.ready_count(queue),
            stats: pipeline.stats(),
        }
    }

    /// Stops consuming, flushes what is buffered and closes the broker channels so
    /// anything left unacknowledged is redelivered on the next start
    pub async fn shutdown(&self) {
        let Some(workers) = self.workers.lock().await.take() else {
            return;
        };
        for consumer in workers.consumers {
            consumer.shutdown().await;
        }
        for driver in workers.flush_drivers {
            driver.shutdown().await;
        }
        for channel in workers.channels {
            channel.close();
        }
        info!("Write-behind pipelines stopped");
    }
}
