use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use bytes::Bytes;
use hare_datastructure::Identified;
use hare_storage::LogEntry;
use serde::{Deserialize, Serialize};

pub type Message = Arc<MessageInner>;

/// Assigned by the virtual host when a message is appended to a queue. Unique per process and
/// increasing in the order messages were published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Written to disk if the queue is durable
    Durable,
    Transient,
}

impl Default for DeliveryMode {
    fn default() -> Self {
        Self::Transient
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicProperties {
    pub id: MessageId,
    pub routing_key: String,
    pub delivery_mode: DeliveryMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInner {
    pub properties: BasicProperties,
    pub body: Bytes,
}

impl MessageInner {
    pub fn new(properties: BasicProperties, body: Bytes) -> Message {
        Arc::new(Self { properties, body })
    }

    pub fn id(&self) -> MessageId {
        self.properties.id
    }

    pub fn is_persistent(&self) -> bool {
        self.properties.delivery_mode == DeliveryMode::Durable
    }
}

impl Identified for MessageInner {
    type Id = MessageId;

    fn id(&self) -> MessageId {
        self.properties.id
    }
}

impl LogEntry for MessageInner {
    fn log_id(&self) -> u64 {
        self.properties.id.get()
    }
}
