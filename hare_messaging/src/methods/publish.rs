use bytes::Bytes;
use hare_core::message::DeliveryMode;
use tracing::debug;

use crate::{
    channel::Channel,
    methods::{MethodResponse, Reply},
};

pub fn publish(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    delivery_mode: DeliveryMode,
    body: Bytes,
) -> MethodResponse {
    debug!(%exchange, %routing_key, ?delivery_mode, len = body.len(), "Publishing message");

    let queues = channel
        .broker
        .publish(exchange, routing_key, delivery_mode, body)?;

    debug!(%exchange, queues = queues.len(), "Published message");
    Ok(Reply::Ok)
}
