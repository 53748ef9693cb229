mod consume;
mod exchange;
mod publish;
mod queue;

use bytes::Bytes;
use hare_core::{
    methods::{GetOk, Method, RequestId, Response},
    BrokerError, Result,
};
use tracing::{trace, warn};

use crate::channel::Channel;

/// What a successful method answers with, before the ids are attached.
#[derive(Debug)]
enum Reply {
    Ok,
    Query(Bytes),
    Get(Option<GetOk>),
}

type MethodResponse = Result<Reply>;

/// This is the entrypoint of methods not handled by the connection itself. Every error is turned
/// into a response with `ok: false`.
pub fn handle_method(channel: &Channel, rid: RequestId, method: Method) -> Response {
    use Method::*;

    let method_name = method.name();
    trace!(channel = %channel.id, method = method_name, "Handling method");

    let response = match method {
        DeclareExchange {
            name,
            kind,
            durable,
            auto_delete,
            arguments,
        } => exchange::declare(channel, name, kind, durable, auto_delete, arguments),
        DeleteExchange { name } => exchange::delete(channel, &name),
        DeclareQueue {
            name,
            durable,
            exclusive,
            auto_delete,
            arguments,
        } => queue::declare(channel, name, durable, exclusive, auto_delete, arguments),
        DeleteQueue { name } => queue::delete(channel, &name),
        Bind {
            exchange,
            queue,
            binding_key,
        } => queue::bind(channel, &exchange, &queue, &binding_key),
        Unbind { exchange, queue } => queue::unbind(channel, &exchange, &queue),
        Publish {
            exchange,
            routing_key,
            delivery_mode,
            body,
        } => publish::publish(channel, &exchange, &routing_key, delivery_mode, body),
        Query => consume::query(channel),
        Get { queue } => consume::get(channel, &queue),
        Ack { queue, message_id } => consume::ack(channel, &queue, message_id),
        Consume {
            queue,
            consumer_tag,
            auto_ack,
        } => consume::consume(channel, queue, consumer_tag, auto_ack),
        Cancel {
            queue,
            consumer_tag,
        } => consume::cancel(channel, &queue, &consumer_tag),
        OpenChannel | CloseChannel => {
            warn!("method should be processed by the connection");
            Err(BrokerError::NotAllowed("channel methods are handled by the connection"))
        }
    };

    let cid = channel.id.clone();

    match response {
        Ok(Reply::Ok) => Response::common(rid, cid, true),
        Ok(Reply::Query(body)) => Response::Query { rid, cid, body },
        Ok(Reply::Get(message)) => Response::Get { rid, cid, message },
        Err(err) => {
            warn!(
                channel = %cid,
                method = method_name,
                code = err.reply_code(),
                reply = err.reply_text(),
                %err,
                "Method failed"
            );
            Response::common(rid, cid, false)
        }
    }
}
