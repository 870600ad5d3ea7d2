//! Broker-backed task queue (the `use_rabbitmq` mode), grounded
//! in `examples/original_source/threading_lib/task_queue.py`'s
//! `RabbitMQQueue`: a durable queue, `delivery_mode=2` publishes, and
//! `basic_get`-then-ack draining instead of a consumer subscription (so
//! `get(max)` can return a bounded batch the same way `LocalQueue::get`
//! does).

use super::queue::{QueueItem, TaskQueue};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicGetOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

pub struct BrokerQueue {
    connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl BrokerQueue {
    pub async fn connect(amqp_url: &str, queue_name: &str) -> AppResult<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| AppError::backend("amqp_connect", e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| AppError::backend("amqp_channel", e.to_string()))?;
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| AppError::backend("amqp_declare", e.to_string()))?;
        Ok(Self { connection, channel, queue_name: queue_name.to_string() })
    }
}

#[async_trait]
impl TaskQueue for BrokerQueue {
    async fn put(&self, command: String) -> AppResult<()> {
        self.channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                command.as_bytes(),
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| AppError::backend("amqp_publish", e.to_string()))?
            .await
            .map_err(|e| AppError::backend("amqp_publish_confirm", e.to_string()))?;
        Ok(())
    }

    /// There is no close sentinel on a broker queue — shutdown is signaled
    /// out of band (the process stopping), so `get` never yields
    /// `QueueItem::Close`.
    async fn get(&self, max: usize) -> AppResult<Vec<QueueItem>> {
        let mut items = Vec::new();
        for _ in 0..max.max(1) {
            let message = self
                .channel
                .basic_get(&self.queue_name, BasicGetOptions::default())
                .await
                .map_err(|e| AppError::backend("amqp_get", e.to_string()))?;
            let Some(message) = message else { break };
            message
                .delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| AppError::backend("amqp_ack", e.to_string()))?;
            let body = String::from_utf8_lossy(&message.delivery.data).into_owned();
            items.push(QueueItem::Command(body));
        }
        Ok(items)
    }

    async fn close(&self) -> AppResult<()> {
        self.connection
            .close(0, "shutting down")
            .await
            .map_err(|e| AppError::backend("amqp_close", e.to_string()))?;
        Ok(())
    }
}
