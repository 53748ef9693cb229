use std::{
    collections::{HashMap, HashSet},
    fmt::{Debug, Formatter},
    sync::Arc,
};

use bytes::Bytes;
use hare_core::{
    connection::{ChannelId, ConEventSender, ConnectionEvent, ConnectionId},
    consumer::{Consumer, ConsumerTag, Undeliverable},
    message::{BasicProperties, MessageId},
    methods::{Method, RequestId, Response},
    queue::QueueName,
    BrokerError, Result,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{broker::Broker, methods};

/// The queues declared as exclusive by one connection.
pub type ExclusiveQueues = Arc<Mutex<HashSet<QueueName>>>;

/// One logical session of a client. Consumers started on a channel and messages delivered to it
/// belong to it and are cleaned up when it closes.
pub struct Channel {
    pub id: ChannelId,
    pub connection_id: ConnectionId,
    pub broker: Broker,
    pub(crate) exclusive_queues: ExclusiveQueues,
    events: ConEventSender,
    consumers: Mutex<Vec<(QueueName, ConsumerTag)>>,
    deliveries: Arc<Mutex<Deliveries>>,
}

#[derive(Debug, Default)]
struct Deliveries {
    closed: bool,
    /// pushed to a consumer of this channel and not acked yet
    unacked: Vec<(QueueName, MessageId)>,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        connection_id: ConnectionId,
        broker: Broker,
        events: ConEventSender,
        exclusive_queues: ExclusiveQueues,
    ) -> Self {
        Self {
            id,
            connection_id,
            broker,
            exclusive_queues,
            events,
            consumers: Mutex::default(),
            deliveries: Arc::default(),
        }
    }

    pub fn handle(&self, rid: RequestId, method: Method) -> Response {
        methods::handle_method(self, rid, method)
    }

    /// Starts a consumer whose deliveries are sent to the client of this channel.
    pub fn subscribe(&self, queue: QueueName, tag: ConsumerTag, auto_ack: bool) -> Result<()> {
        let deliveries = Arc::clone(&self.deliveries);
        let events = self.events.clone();
        let cid = self.id.clone();
        let delivered_from = queue.clone();

        let callback = move |tag: &ConsumerTag, properties: &BasicProperties, body: &Bytes| {
            let mut deliveries = deliveries.lock();
            if deliveries.closed {
                return Err(Undeliverable);
            }

            events
                .send(ConnectionEvent::Response(Response::Deliver {
                    cid: cid.clone(),
                    consumer_tag: tag.clone(),
                    properties: properties.clone(),
                    body: body.clone(),
                }))
                .map_err(|_| Undeliverable)?;

            if !auto_ack {
                deliveries.unacked.push((delivered_from.clone(), properties.id));
            }
            Ok(())
        };

        let consumer = Consumer::new(tag.clone(), queue.clone(), auto_ack, callback);
        self.broker.subscribe(consumer)?;
        self.consumers.lock().push((queue, tag));
        Ok(())
    }

    pub fn cancel(&self, queue: &str, tag: &str) -> Result<()> {
        let mut consumers = self.consumers.lock();

        let index = consumers
            .iter()
            .position(|(q, t)| q.as_str() == queue && t.as_str() == tag)
            .ok_or_else(|| BrokerError::not_found("consumer", tag))?;

        consumers.remove(index);
        drop(consumers);

        self.broker.cancel(queue, tag)?;
        Ok(())
    }

    pub fn ack(&self, queue: &str, id: MessageId) -> Result<()> {
        self.deliveries
            .lock()
            .unacked
            .retain(|(q, unacked)| !(q.as_str() == queue && *unacked == id));

        self.broker.ack(queue, id)?;
        Ok(())
    }

    /// Cancels the consumers of the channel and makes all unacked messages available again.
    pub fn close(&self) {
        let consumers = std::mem::take(&mut *self.consumers.lock());
        for (queue, tag) in consumers {
            if let Err(err) = self.broker.cancel(&queue, &tag) {
                warn!(%queue, %tag, %err, "Failed to cancel consumer of closed channel");
            }
        }

        let unacked = {
            let mut deliveries = self.deliveries.lock();
            deliveries.closed = true;
            std::mem::take(&mut deliveries.unacked)
        };

        if !unacked.is_empty() {
            debug!(channel = %self.id, count = unacked.len(), "Releasing unacked messages");
        }
        for (queue, id) in unacked {
            self.broker.release(&queue, id);
        }
    }
}

impl Debug for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

/// The channels of one connection.
pub struct ChannelRegistry {
    connection_id: ConnectionId,
    broker: Broker,
    events: ConEventSender,
    exclusive_queues: ExclusiveQueues,
    channels: Mutex<HashMap<ChannelId, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new(
        connection_id: ConnectionId,
        broker: Broker,
        events: ConEventSender,
        exclusive_queues: ExclusiveQueues,
    ) -> Self {
        Self {
            connection_id,
            broker,
            events,
            exclusive_queues,
            channels: Mutex::default(),
        }
    }

    /// Opening a channel that is open already does nothing.
    pub fn open(&self, id: ChannelId) -> Arc<Channel> {
        let mut channels = self.channels.lock();

        let channel = channels.entry(id.clone()).or_insert_with(|| {
            info!(channel = %id, connection = %self.connection_id, "Opened channel");
            Arc::new(Channel::new(
                id,
                self.connection_id,
                self.broker.clone(),
                self.events.clone(),
                Arc::clone(&self.exclusive_queues),
            ))
        });

        Arc::clone(channel)
    }

    /// Returns whether the channel was open.
    pub fn close(&self, id: &str) -> bool {
        let channel = self.channels.lock().remove(id);

        match channel {
            Some(channel) => {
                channel.close();
                info!(channel = %id, connection = %self.connection_id, "Closed channel");
                true
            }
            None => false,
        }
    }

    pub fn select(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.lock().get(id).cloned()
    }

    pub fn close_all(&self) {
        let channels = std::mem::take(&mut *self.channels.lock());
        for (id, channel) in channels {
            channel.close();
            debug!(channel = %id, "Closed channel");
        }
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for ChannelRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("connection_id", &self.connection_id)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
