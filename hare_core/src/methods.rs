//! The requests a client can send and the responses the broker sends back.
//!
//! Every request names the channel it is meant for and carries a request id chosen by the
//! client. The id is never interpreted, only echoed back in the response.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    connection::ChannelId,
    consumer::ConsumerTag,
    exchange::{ExchangeName, ExchangeType},
    message::{BasicProperties, DeliveryMode, MessageId},
    queue::QueueName,
    Arguments,
};

pub type RequestId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub rid: RequestId,
    pub cid: ChannelId,
    #[serde(flatten)]
    pub method: Method,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Method {
    OpenChannel,
    CloseChannel,
    DeclareExchange {
        name: ExchangeName,
        #[serde(rename = "type")]
        kind: ExchangeType,
        #[serde(default)]
        durable: bool,
        #[serde(default)]
        auto_delete: bool,
        #[serde(default)]
        arguments: Arguments,
    },
    DeleteExchange {
        name: ExchangeName,
    },
    DeclareQueue {
        name: QueueName,
        #[serde(default)]
        durable: bool,
        #[serde(default)]
        exclusive: bool,
        #[serde(default)]
        auto_delete: bool,
        #[serde(default)]
        arguments: Arguments,
    },
    DeleteQueue {
        name: QueueName,
    },
    Bind {
        exchange: ExchangeName,
        queue: QueueName,
        binding_key: String,
    },
    Unbind {
        exchange: ExchangeName,
        queue: QueueName,
    },
    Publish {
        exchange: ExchangeName,
        routing_key: String,
        #[serde(default)]
        delivery_mode: DeliveryMode,
        body: Bytes,
    },
    /// Take the next message from any queue.
    Query,
    /// Look at the front of a queue without removing it.
    Get {
        queue: QueueName,
    },
    Ack {
        queue: QueueName,
        message_id: MessageId,
    },
    Consume {
        queue: QueueName,
        consumer_tag: ConsumerTag,
        #[serde(default)]
        auto_ack: bool,
    },
    Cancel {
        queue: QueueName,
        consumer_tag: ConsumerTag,
    },
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::OpenChannel => "open_channel",
            Method::CloseChannel => "close_channel",
            Method::DeclareExchange { .. } => "declare_exchange",
            Method::DeleteExchange { .. } => "delete_exchange",
            Method::DeclareQueue { .. } => "declare_queue",
            Method::DeleteQueue { .. } => "delete_queue",
            Method::Bind { .. } => "bind",
            Method::Unbind { .. } => "unbind",
            Method::Publish { .. } => "publish",
            Method::Query => "query",
            Method::Get { .. } => "get",
            Method::Ack { .. } => "ack",
            Method::Consume { .. } => "consume",
            Method::Cancel { .. } => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Response {
    Common {
        rid: RequestId,
        cid: ChannelId,
        ok: bool,
    },
    /// Answer to [`Method::Query`], the body is empty if no queue had a message
    Query {
        rid: RequestId,
        cid: ChannelId,
        body: Bytes,
    },
    Get {
        rid: RequestId,
        cid: ChannelId,
        message: Option<GetOk>,
    },
    /// A message pushed to a consumer
    Deliver {
        cid: ChannelId,
        consumer_tag: ConsumerTag,
        properties: BasicProperties,
        body: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetOk {
    pub properties: BasicProperties,
    pub body: Bytes,
}

impl Response {
    pub fn common(rid: RequestId, cid: ChannelId, ok: bool) -> Self {
        Self::Common { rid, cid, ok }
    }
}

#[cfg(test)]
mod tests {
    use super::{Method, Request};
    use crate::{exchange::ExchangeType, message::DeliveryMode};

    #[test]
    fn parse_declare_exchange() {
        let json = r#"{"rid":"r1","cid":"c1","method":"declare_exchange","name":"logs","type":"topic","durable":true}"#;
        let request = serde_json::from_str::<Request>(json).unwrap();

        assert_eq!(request.rid, "r1");
        assert_eq!(request.cid.as_str(), "c1");
        match request.method {
            Method::DeclareExchange {
                name,
                kind,
                durable,
                auto_delete,
                arguments,
            } => {
                assert_eq!(name.as_str(), "logs");
                assert_eq!(kind, ExchangeType::Topic);
                assert!(durable);
                assert!(!auto_delete);
                assert!(arguments.is_empty());
            }
            other => panic!("wrong method {other:?}"),
        }
    }

    #[test]
    fn publish_defaults_to_transient() {
        let json = r#"{"rid":"r","cid":"c","method":"publish","exchange":"","routing_key":"q","body":"hi"}"#;
        let request = serde_json::from_str::<Request>(json).unwrap();

        assert_eq!(
            request.method,
            Method::Publish {
                exchange: "".into(),
                routing_key: "q".to_owned(),
                delivery_mode: DeliveryMode::Transient,
                body: "hi".into(),
            }
        );
    }

    #[test]
    fn parse_unit_method() {
        let json = r#"{"rid":"r","cid":"c","method":"open_channel"}"#;
        let request = serde_json::from_str::<Request>(json).unwrap();
        assert_eq!(request.method, Method::OpenChannel);
    }
}
