use hare_core::{
    queue::{Queue, QueueName},
    Arguments,
};
use tracing::debug;

use crate::{
    channel::Channel,
    methods::{MethodResponse, Reply},
};

pub fn declare(
    channel: &Channel,
    name: QueueName,
    durable: bool,
    exclusive: bool,
    auto_delete: bool,
    arguments: Arguments,
) -> MethodResponse {
    let queue = Queue::new(name.clone())
        .durable(durable)
        .exclusive(exclusive)
        .auto_delete(auto_delete)
        .arguments(arguments);

    debug!(%name, "Creating queue");

    let created = channel.broker.declare_queue(queue)?;

    if created && exclusive {
        channel.exclusive_queues.lock().insert(name);
    }

    Ok(Reply::Ok)
}

pub fn delete(channel: &Channel, name: &str) -> MethodResponse {
    if channel.broker.delete_queue(name)? {
        channel.exclusive_queues.lock().remove(name);
    } else {
        debug!(%name, "Queue to delete does not exist");
    }
    Ok(Reply::Ok)
}

pub fn bind(channel: &Channel, exchange: &str, queue: &str, binding_key: &str) -> MethodResponse {
    channel.broker.bind(exchange, queue, binding_key)?;
    Ok(Reply::Ok)
}

pub fn unbind(channel: &Channel, exchange: &str, queue: &str) -> MethodResponse {
    if !channel.broker.unbind(exchange, queue)? {
        debug!(%exchange, %queue, "Queue was not bound");
    }
    Ok(Reply::Ok)
}
