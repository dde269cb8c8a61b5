use super::ServiceError;
use crate::models::AuditRecord;
use std::sync::Arc;
use write_behind::{publish_message, Message, Publisher};

/// Records audit events. Audits are write-only: they are published for batch
/// persistence and never cached or read back.
#[derive(Clone)]
pub struct AuditService {
    publisher: Arc<dyn Publisher>,
    queue: String,
}

impl AuditService {
    pub fn new(publisher: Arc<dyn Publisher>, queue: impl Into<String>) -> Self {
        Self {
            publisher,
            queue: queue.into(),
        }
    }

    pub async fn record(&self, audit: &AuditRecord) -> Result<(), ServiceError> {
        publish_message(self.publisher.as_ref(), &self.queue, audit)
            .await
            .map_err(|source| ServiceError::Publish {
                kind: AuditRecord::KIND,
                source,
            })
    }
}
