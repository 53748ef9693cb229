use std::{collections::HashMap, sync::Arc};

use hare_core::{
    consumer::{Consumer, ConsumerTag},
    queue::QueueName,
    BrokerError, Result,
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// The consumers of every queue, each queue with its own round-robin cursor.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    queues: Mutex<HashMap<QueueName, Arc<Mutex<QueueConsumers>>>>,
}

#[derive(Debug, Default)]
struct QueueConsumers {
    consumers: Vec<Consumer>,
    /// index of the consumer that gets the next message
    cursor: usize,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a consumer to its queue. Tags are unique per queue.
    pub fn register(&self, consumer: Consumer) -> Result<()> {
        let queue = self.queue_consumers_or_insert(&consumer.queue);
        let mut queue = queue.lock();

        if queue.consumers.iter().any(|other| other.tag == consumer.tag) {
            return Err(BrokerError::DuplicateConsumerTag {
                queue: consumer.queue.to_string(),
                tag: consumer.tag.to_string(),
            });
        }

        debug!(queue = %consumer.queue, tag = %consumer.tag, auto_ack = consumer.auto_ack, "Registered consumer");
        queue.consumers.push(consumer);
        Ok(())
    }

    pub fn cancel(&self, queue: &str, tag: &str) -> Option<Consumer> {
        let consumers = self.queue_consumers(queue)?;
        let mut consumers = consumers.lock();

        let index = consumers
            .consumers
            .iter()
            .position(|consumer| consumer.tag.as_str() == tag)?;
        let consumer = consumers.consumers.remove(index);

        // keep pointing at the same next consumer
        if index < consumers.cursor {
            consumers.cursor -= 1;
        }
        if consumers.cursor >= consumers.consumers.len() {
            consumers.cursor = 0;
        }

        info!(%queue, %tag, "Consumer cancelled");
        Some(consumer)
    }

    /// Picks the consumer that is next in line and moves the cursor on.
    pub fn choose(&self, queue: &str) -> Option<Consumer> {
        let consumers = self.queue_consumers(queue)?;
        let mut consumers = consumers.lock();

        if consumers.consumers.is_empty() {
            return None;
        }

        let index = consumers.cursor % consumers.consumers.len();
        consumers.cursor = (index + 1) % consumers.consumers.len();

        let consumer = consumers.consumers[index].clone();
        debug!(%queue, tag = %consumer.tag, "Chose consumer");
        Some(consumer)
    }

    pub fn consumer_count(&self, queue: &str) -> usize {
        self.queue_consumers(queue)
            .map_or(0, |consumers| consumers.lock().consumers.len())
    }

    /// Forgets all consumers of the queue, returning them.
    pub fn remove_queue(&self, queue: &str) -> Vec<Consumer> {
        match self.queues.lock().remove(queue) {
            Some(consumers) => std::mem::take(&mut consumers.lock().consumers),
            None => Vec::new(),
        }
    }

    /// The tags of the consumers of the queue, in registration order.
    pub fn tags(&self, queue: &str) -> Vec<ConsumerTag> {
        self.queue_consumers(queue).map_or_else(Vec::new, |consumers| {
            consumers
                .lock()
                .consumers
                .iter()
                .map(|consumer| consumer.tag.clone())
                .collect()
        })
    }

    fn queue_consumers(&self, queue: &str) -> Option<Arc<Mutex<QueueConsumers>>> {
        self.queues.lock().get(queue).cloned()
    }

    fn queue_consumers_or_insert(&self, queue: &QueueName) -> Arc<Mutex<QueueConsumers>> {
        Arc::clone(self.queues.lock().entry(queue.clone()).or_default())
    }
}
