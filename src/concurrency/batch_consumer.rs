//! Batched write consumer, grounded in
//! `examples/original_source/main.py`'s `CSVDatabase._start_batch_consumer`/
//! `_process_write_commands`: sleep, drain up to `batch_size` commands,
//! apply each under the write lock, flush the backend if anything changed.
//!
//! A single bad command (malformed syntax, unknown column, arity mismatch)
//! is logged and skipped — it does not abort the rest of the batch, and it
//! does not stop the consumer loop.

use super::queue::{QueueItem, TaskQueue};
use super::rwlock::FairRwLock;
use crate::cache::CacheCoordinator;
use crate::storage::Backend;
use std::sync::Arc;
use std::time::Duration;

pub fn spawn_batch_consumer(
    queue: Arc<dyn TaskQueue>,
    lock: FairRwLock,
    backend: Arc<dyn Backend>,
    cache: Option<Arc<CacheCoordinator>>,
    batch_size: usize,
    delay: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        'consumer: loop {
            tokio::time::sleep(delay).await;

            let items = match queue.get(batch_size).await {
                Ok(items) => items,
                Err(err) => {
                    tracing::error!(%err, "batch consumer failed to pull commands from queue");
                    continue;
                }
            };
            if items.is_empty() {
                continue;
            }

            let mut closed = false;
            let _write_guard = lock.write();
            for item in items {
                let raw = match item {
                    QueueItem::Command(raw) => raw,
                    QueueItem::Close => {
                        closed = true;
                        break;
                    }
                };
                if let Err(err) =
                    crate::service::apply_mutation(backend.as_ref(), cache.as_deref(), &raw).await
                {
                    tracing::warn!(%err, command = %raw, "mutation command failed, skipping");
                }
            }

            if backend.is_dirty() {
                if let Err(err) = backend.write().await {
                    tracing::error!(%err, "failed to flush backend after batch");
                }
            }

            if closed {
                tracing::info!("batch consumer observed close sentinel, exiting");
                break 'consumer;
            }
        }
    })
}
