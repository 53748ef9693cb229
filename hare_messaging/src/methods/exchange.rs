use hare_core::{
    exchange::{Exchange, ExchangeName, ExchangeType},
    Arguments,
};
use tracing::{debug, info};

use crate::{
    channel::Channel,
    methods::{MethodResponse, Reply},
};

pub fn declare(
    channel: &Channel,
    name: ExchangeName,
    kind: ExchangeType,
    durable: bool,
    auto_delete: bool,
    arguments: Arguments,
) -> MethodResponse {
    let exchange = Exchange::new(name.clone(), kind)
        .durable(durable)
        .auto_delete(auto_delete)
        .arguments(arguments);

    if channel.broker.declare_exchange(exchange)? {
        info!(%name, %kind, "Created exchange");
    } else {
        debug!(%name, "Exchange exists already");
    }

    Ok(Reply::Ok)
}

pub fn delete(channel: &Channel, name: &str) -> MethodResponse {
    if !channel.broker.delete_exchange(name)? {
        debug!(%name, "Exchange to delete does not exist");
    }
    Ok(Reply::Ok)
}
