use hare_storage::Record;
use serde::{Deserialize, Serialize};

use crate::{newtype_name, registry::Entity, Arguments};

newtype_name!(
    /// The name of a queue. A newtype wrapper around `Arc<str>`, which guarantees cheap clones.
    pub QueueName
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    /// The visible name of the queue
    pub name: QueueName,
    /// Whether the queue and its persistent messages should be kept when the server restarts
    pub durable: bool,
    /// The queue belongs to the connection that declared it and is deleted when it closes
    pub exclusive: bool,
    /// Whether the queue will automatically be deleted when no consumer uses it anymore.
    /// The queue can always be manually deleted.
    pub auto_delete: bool,
    #[serde(default)]
    pub arguments: Arguments,
}

impl Queue {
    pub fn new(name: impl Into<QueueName>) -> Self {
        Self {
            name: name.into(),
            durable: false,
            exclusive: false,
            auto_delete: false,
            arguments: Arguments::new(),
        }
    }

    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    #[must_use]
    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    #[must_use]
    pub fn arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }
}

impl Record for Queue {
    fn record_key(&self) -> String {
        self.name.to_string()
    }
}

impl Entity for Queue {
    type Name = QueueName;

    const KIND: &'static str = "queue";

    fn name(&self) -> &QueueName {
        &self.name
    }

    /// Exclusive queues go away with their connection, so they are never persisted.
    fn is_durable(&self) -> bool {
        self.durable && !self.exclusive
    }
}
