use tokio::sync::mpsc;

use crate::{methods::Response, newtype_id, newtype_name};

newtype_id!(pub ConnectionId);

newtype_name!(
    /// Chosen by the client, unique per connection.
    pub ChannelId
);

/// Sent to the task that owns the socket of a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Write this response to the client
    Response(Response),
    Shutdown,
}

pub type ConEventSender = mpsc::UnboundedSender<ConnectionEvent>;
pub type ConEventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;
