use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use hare_core::{
    connection::{ConEventSender, ConnectionEvent, ConnectionId},
    methods::{Method, Request, Response},
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    broker::Broker,
    channel::{ChannelRegistry, ExclusiveQueues},
};

pub type ConnectionHandle = Arc<Connection>;

/// A client connection with its channels. The socket itself is owned by the transport, which
/// gets everything it has to send through the event sender.
pub struct Connection {
    pub id: ConnectionId,
    pub peer_addr: Option<SocketAddr>,
    broker: Broker,
    events: ConEventSender,
    channels: ChannelRegistry,
    exclusive_queues: ExclusiveQueues,
    closed: AtomicBool,
}

impl Connection {
    /// Creates the connection and registers it with the broker.
    pub fn open(
        broker: &Broker,
        peer_addr: Option<SocketAddr>,
        events: ConEventSender,
    ) -> ConnectionHandle {
        let id = ConnectionId::random();
        let exclusive_queues = ExclusiveQueues::default();

        let connection = Arc::new(Self {
            id,
            peer_addr,
            broker: broker.clone(),
            events: events.clone(),
            channels: ChannelRegistry::new(id, broker.clone(), events, Arc::clone(&exclusive_queues)),
            exclusive_queues,
            closed: AtomicBool::new(false),
        });

        broker.connections().insert(Arc::clone(&connection));
        info!(%id, ?peer_addr, "Opened connection");
        connection
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Every request gets a response echoing its request id.
    pub fn handle(&self, request: Request) -> Response {
        let Request { rid, cid, method } = request;

        debug!(connection = %self.id, channel = %cid, method = method.name(), %rid, "Handling request");

        match method {
            Method::OpenChannel => {
                self.channels.open(cid.clone());
                Response::common(rid, cid, true)
            }
            Method::CloseChannel => {
                self.channels.close(&cid);
                Response::common(rid, cid, true)
            }
            method => match self.channels.select(&cid) {
                Some(channel) => channel.handle(rid, method),
                None => {
                    warn!(connection = %self.id, channel = %cid, "Request for a channel that is not open");
                    Response::common(rid, cid, false)
                }
            },
        }
    }

    /// Closes all channels and deletes the exclusive queues of the connection. Closing twice does
    /// nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.channels.close_all();

        let exclusive_queues = std::mem::take(&mut *self.exclusive_queues.lock());
        for queue in exclusive_queues {
            match self.broker.delete_queue(&queue) {
                Ok(_) => debug!(%queue, "Deleted exclusive queue"),
                Err(err) => warn!(%queue, %err, "Failed to delete exclusive queue"),
            }
        }

        self.broker.connections().remove(self.id);
        info!(id = %self.id, "Closed connection");
    }

    /// Asks the transport to close the socket.
    pub fn shutdown(&self) {
        if self.events.send(ConnectionEvent::Shutdown).is_err() {
            debug!(id = %self.id, "Connection task is gone already");
        }
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// All open connections of the broker.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn insert(&self, connection: ConnectionHandle) {
        self.connections.lock().insert(connection.id, connection);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.lock().remove(&id)
    }

    pub fn select(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every connection and tells their transports to stop.
    pub fn close_all(&self) {
        let connections = std::mem::take(&mut *self.connections.lock());
        for connection in connections.into_values() {
            connection.close();
            connection.shutdown();
        }
    }
}
