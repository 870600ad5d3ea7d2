//! Concurrency substrate: the fair read/write lock, the mutation task
//! queue, and the batched write consumer, grounded in
//! `examples/original_source/threading_lib/` and `main.py`'s
//! `CSVDatabase` orchestration.

pub mod batch_consumer;
pub mod broker_queue;
pub mod queue;
pub mod rwlock;

pub use batch_consumer::spawn_batch_consumer;
pub use broker_queue::BrokerQueue;
pub use queue::{LocalQueue, QueueItem, TaskQueue};
pub use rwlock::FairRwLock;
