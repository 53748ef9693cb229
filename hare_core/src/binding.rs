use hare_storage::Record;
use serde::{Deserialize, Serialize};

use crate::{exchange::ExchangeName, queue::QueueName};

/// Exchange `exchange` delivers to `queue` when a message's routing key matches `binding_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub exchange: ExchangeName,
    pub queue: QueueName,
    pub binding_key: String,
}

impl Binding {
    pub fn new(
        exchange: impl Into<ExchangeName>,
        queue: impl Into<QueueName>,
        binding_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            binding_key: binding_key.into(),
        }
    }

    /// The key under which the binding between the two is persisted.
    pub fn key_for(exchange: &str, queue: &str) -> String {
        format!("{exchange}\0{queue}")
    }
}

impl Record for Binding {
    fn record_key(&self) -> String {
        Self::key_for(&self.exchange, &self.queue)
    }
}
