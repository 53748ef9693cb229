use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

use bytes::Bytes;

use crate::{message::BasicProperties, newtype_name, queue::QueueName};

newtype_name!(
    /// Identifies a consumer within its queue.
    pub ConsumerTag
);

/// Returned by a delivery callback that could not hand the message on, for example because the
/// connection of the consumer is gone. The message stays in its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("consumer can't accept deliveries")]
pub struct Undeliverable;

/// Called with every message pushed to a consumer.
pub type DeliveryCallback = Arc<
    dyn Fn(&ConsumerTag, &BasicProperties, &Bytes) -> Result<(), Undeliverable> + Send + Sync,
>;

#[derive(Clone)]
pub struct Consumer {
    pub tag: ConsumerTag,
    pub queue: QueueName,
    /// Messages are acknowledged by the broker as soon as they were delivered
    pub auto_ack: bool,
    pub callback: DeliveryCallback,
}

impl Consumer {
    pub fn new(
        tag: impl Into<ConsumerTag>,
        queue: impl Into<QueueName>,
        auto_ack: bool,
        callback: impl Fn(&ConsumerTag, &BasicProperties, &Bytes) -> Result<(), Undeliverable>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            tag: tag.into(),
            queue: queue.into(),
            auto_ack,
            callback: Arc::new(callback),
        }
    }

    pub fn deliver(&self, properties: &BasicProperties, body: &Bytes) -> Result<(), Undeliverable> {
        (self.callback)(&self.tag, properties, body)
    }
}

impl Debug for Consumer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("tag", &self.tag)
            .field("queue", &self.queue)
            .field("auto_ack", &self.auto_ack)
            .finish_non_exhaustive()
    }
}
