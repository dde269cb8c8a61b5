use crate::command::QueuedCommand;
use log::warn;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bounded in-memory holding area for the commands of one message kind.
///
/// Many consumers may `offer` concurrently while a single flusher calls `drain_all`.
/// Both operations take the same short lock, so an offer racing a drain lands either
/// in that drain or in the next one, never in both and never nowhere.
#[derive(Debug)]
pub struct CommandQueue<T> {
    kind: &'static str,
    capacity: usize,
    items: Mutex<VecDeque<QueuedCommand<T>>>,
}

impl<T> CommandQueue<T> {
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    /// Queues a command unless the queue is full.
    ///
    /// Never waits. A full queue hands the command back to the caller, which decides
    /// what happens to the delivery.
    pub fn offer(&self, command: QueuedCommand<T>) -> Result<(), QueuedCommand<T>> {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            let depth = items.len();
            drop(items);
            warn!(
                "Command queue '{}' is full (depth: {}), not queueing delivery {} from channel {}",
                self.kind,
                depth,
                command.delivery_tag,
                command.channel.id()
            );
            return Err(command);
        }
        items.push_back(command);
        Ok(())
    }

    /// Removes and returns every queued command in arrival order
    pub fn drain_all(&self) -> Vec<QueuedCommand<T>> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedCommand<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
