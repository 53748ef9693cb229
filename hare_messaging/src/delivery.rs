//! Pushing messages from a queue to its consumers.

use hare_core::{consumer::Consumer, message::Message, Result};
use tracing::{debug, trace, warn};

use crate::{consumer::ConsumerRegistry, virtual_host::VirtualHost};

#[derive(Debug)]
pub enum PushOutcome {
    Delivered { consumer: Consumer, message: Message },
    /// No message that could be pushed
    Empty,
    /// The queue has messages but nobody to consume them
    NoConsumer,
    /// The chosen consumer did not take the message, it was made available again
    Undeliverable { consumer: Consumer },
}

/// Pushes the oldest unclaimed message of the queue to the next consumer.
///
/// The message stays claimed until it is acked, unless the consumer acks automatically, in which
/// case it is removed right away.
pub fn push_once(vhost: &VirtualHost, consumers: &ConsumerRegistry, queue: &str) -> Result<PushOutcome> {
    let message = match vhost.claim_front(queue)? {
        Some(message) => message,
        None => return Ok(PushOutcome::Empty),
    };

    let consumer = match consumers.choose(queue) {
        Some(consumer) => consumer,
        None => {
            vhost.release(queue, message.id());
            return Ok(PushOutcome::NoConsumer);
        }
    };

    if let Err(err) = consumer.deliver(&message.properties, &message.body) {
        warn!(%queue, tag = %consumer.tag, id = %message.id(), %err, "Failed to deliver message");
        vhost.release(queue, message.id());
        return Ok(PushOutcome::Undeliverable { consumer });
    }

    trace!(%queue, tag = %consumer.tag, id = %message.id(), "Delivered message");

    if consumer.auto_ack {
        vhost.ack(queue, message.id())?;
    }

    Ok(PushOutcome::Delivered { consumer, message })
}

/// Pushes messages until the queue has none left or nobody takes them. Returns how many messages
/// were delivered.
pub fn drain(vhost: &VirtualHost, consumers: &ConsumerRegistry, queue: &str) -> Result<usize> {
    let mut delivered = 0;
    // every consumer may refuse once before we give up
    let mut refusals = 0;

    loop {
        match push_once(vhost, consumers, queue)? {
            PushOutcome::Delivered { .. } => {
                delivered += 1;
                refusals = 0;
            }
            PushOutcome::Undeliverable { .. } => {
                refusals += 1;
                if refusals >= consumers.consumer_count(queue).max(1) {
                    debug!(%queue, delivered, "No consumer takes messages right now");
                    break;
                }
            }
            PushOutcome::Empty | PushOutcome::NoConsumer => break,
        }
    }

    Ok(delivered)
}
