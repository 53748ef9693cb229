use hare_core::{
    consumer::ConsumerTag,
    message::MessageId,
    methods::GetOk,
    queue::QueueName,
};
use tracing::{debug, info};

use crate::{
    channel::Channel,
    methods::{MethodResponse, Reply},
};

pub fn consume(
    channel: &Channel,
    queue: QueueName,
    consumer_tag: ConsumerTag,
    auto_ack: bool,
) -> MethodResponse {
    let consumer_tag = if consumer_tag.is_empty() {
        ConsumerTag::from(format!("ctag-{}", hare_core::random_uuid()))
    } else {
        consumer_tag
    };

    channel.subscribe(queue.clone(), consumer_tag.clone(), auto_ack)?;

    info!(channel = %channel.id, %queue, %consumer_tag, "Consumer started consuming");
    Ok(Reply::Ok)
}

pub fn cancel(channel: &Channel, queue: &str, consumer_tag: &str) -> MethodResponse {
    channel.cancel(queue, consumer_tag)?;
    Ok(Reply::Ok)
}

pub fn get(channel: &Channel, queue: &str) -> MethodResponse {
    let message = channel.broker.get(queue)?.map(|message| GetOk {
        properties: message.properties.clone(),
        body: message.body.clone(),
    });

    Ok(Reply::Get(message))
}

pub fn query(channel: &Channel) -> MethodResponse {
    let body = channel.broker.query()?.unwrap_or_default();
    debug!(len = body.len(), "Answered query");
    Ok(Reply::Query(body))
}

pub fn ack(channel: &Channel, queue: &str, id: MessageId) -> MethodResponse {
    channel.ack(queue, id)?;
    Ok(Reply::Ok)
}
