use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::Arc,
};

use bytes::Bytes;
use hare_core::{
    consumer::Consumer,
    exchange::Exchange,
    message::{DeliveryMode, Message, MessageId},
    queue::{Queue, QueueName},
    BrokerError, Result,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::{
    connection::ConnectionRegistry,
    consumer::ConsumerRegistry,
    queue_worker::{QueueEvent, QueueEventSender, QueueTask, QUEUE_EVENT_CAPACITY},
    virtual_host::VirtualHost,
};

/// The running broker: a virtual host, the consumers of its queues, one worker task per queue and
/// the open connections. Cheap to clone.
///
/// Must be created inside a tokio runtime, the queue workers are spawned onto it.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    vhost: Arc<VirtualHost>,
    consumers: Arc<ConsumerRegistry>,
    workers: Mutex<HashMap<QueueName, QueueEventSender>>,
    connections: ConnectionRegistry,
}

impl Broker {
    /// Starts a worker for every queue the virtual host already has.
    pub fn start(vhost: VirtualHost) -> Self {
        let broker = Self {
            inner: Arc::new(BrokerInner {
                vhost: Arc::new(vhost),
                consumers: Arc::new(ConsumerRegistry::new()),
                workers: Mutex::default(),
                connections: ConnectionRegistry::default(),
            }),
        };

        for queue in broker.inner.vhost.all_queues() {
            broker.spawn_worker(queue.name);
        }

        info!(vhost = %broker.inner.vhost.name(), "Started broker");
        broker
    }

    pub fn vhost(&self) -> &VirtualHost {
        &self.inner.vhost
    }

    pub fn consumers(&self) -> &ConsumerRegistry {
        &self.inner.consumers
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.inner.connections
    }

    pub fn declare_exchange(&self, exchange: Exchange) -> Result<bool> {
        self.inner.vhost.declare_exchange(exchange)
    }

    pub fn delete_exchange(&self, name: &str) -> Result<bool> {
        Ok(self.inner.vhost.delete_exchange(name)?.is_some())
    }

    pub fn declare_queue(&self, queue: Queue) -> Result<bool> {
        let name = queue.name.clone();
        let created = self.inner.vhost.declare_queue(queue)?;

        if created {
            self.spawn_worker(name.clone());
            // a recovered durable queue may have messages already
            self.notify(&name);
        }
        Ok(created)
    }

    /// Deletes the queue, its consumers and its worker.
    pub fn delete_queue(&self, name: &str) -> Result<bool> {
        if self.inner.vhost.delete_queue(name)?.is_none() {
            return Ok(false);
        }

        let consumers = self.inner.consumers.remove_queue(name);
        debug!(queue = %name, consumers = consumers.len(), "Dropped consumers of deleted queue");

        if let Some(worker) = self.inner.workers.lock().remove(name) {
            let _ = worker.try_send(QueueEvent::Shutdown);
        }
        Ok(true)
    }

    pub fn bind(&self, exchange: &str, queue: &str, binding_key: &str) -> Result<()> {
        self.inner.vhost.bind(exchange, queue, binding_key)
    }

    pub fn unbind(&self, exchange: &str, queue: &str) -> Result<bool> {
        self.inner.vhost.unbind(exchange, queue)
    }

    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        delivery_mode: DeliveryMode,
        body: Bytes,
    ) -> Result<Vec<QueueName>> {
        let queues = self
            .inner
            .vhost
            .publish(exchange, routing_key, delivery_mode, body)?;

        for queue in &queues {
            self.notify(queue);
        }
        Ok(queues)
    }

    /// The front of the queue, without removing it.
    pub fn get(&self, queue: &str) -> Result<Option<Message>> {
        self.inner.vhost.consume(queue)
    }

    pub fn query(&self) -> Result<Option<Bytes>> {
        self.inner.vhost.query_any()
    }

    /// Registers the consumer and pushes it whatever the queue has.
    pub fn subscribe(&self, consumer: Consumer) -> Result<()> {
        if !self.inner.vhost.exists_queue(&consumer.queue) {
            return Err(BrokerError::not_found("queue", consumer.queue.as_str()));
        }

        let queue = consumer.queue.clone();
        self.inner.consumers.register(consumer)?;
        self.notify(&queue);
        Ok(())
    }

    /// Returns whether the consumer existed. An auto-delete queue is deleted together with its
    /// last consumer.
    pub fn cancel(&self, queue: &str, tag: &str) -> Result<bool> {
        if self.inner.consumers.cancel(queue, tag).is_none() {
            return Ok(false);
        }

        let auto_delete = self
            .inner
            .vhost
            .select_queue(queue)
            .map_or(false, |queue| queue.auto_delete);

        if auto_delete && self.inner.consumers.consumer_count(queue) == 0 {
            info!(%queue, "Deleting auto-delete queue after its last consumer");
            self.delete_queue(queue)?;
        }
        Ok(true)
    }

    pub fn ack(&self, queue: &str, id: MessageId) -> Result<bool> {
        let removed = self.inner.vhost.ack(queue, id)?;
        self.notify(queue);
        Ok(removed)
    }

    /// Makes a message that was pushed but never acked available again.
    pub fn release(&self, queue: &str, id: MessageId) {
        if self.inner.vhost.release(queue, id) {
            debug!(%queue, %id, "Released message");
            self.notify(queue);
        }
    }

    /// Tells the worker of the queue to push messages to the consumers.
    pub fn notify(&self, queue: &str) {
        let workers = self.inner.workers.lock();

        let worker = match workers.get(queue) {
            Some(worker) => worker,
            None => return,
        };

        match worker.try_send(QueueEvent::MessageAvailable) {
            // the worker has a notification pending already and will drain the queue
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => warn!(%queue, "Queue worker is gone"),
        }
    }

    /// Closes all connections and stops the queue workers.
    pub fn shutdown(&self) {
        info!("Shutting down broker");

        self.inner.connections.close_all();

        for (queue, worker) in self.inner.workers.lock().drain() {
            if worker.try_send(QueueEvent::Shutdown).is_err() {
                debug!(%queue, "Queue worker stopped already");
            }
        }
    }

    fn spawn_worker(&self, queue: QueueName) {
        let (event_send, event_recv) = mpsc::channel(QUEUE_EVENT_CAPACITY);

        let task = QueueTask::new(
            Arc::clone(&self.inner.vhost),
            Arc::clone(&self.inner.consumers),
            event_recv,
            queue.clone(),
        );

        self.inner.workers.lock().insert(queue, event_send);
        tokio::spawn(async move { task.start().await });
    }
}

impl Debug for Broker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("vhost", &self.inner.vhost)
            .finish_non_exhaustive()
    }
}
