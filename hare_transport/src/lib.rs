#![warn(rust_2018_idioms)]

mod connection;
pub mod error;
pub mod frame;

use std::{future::Future, net::SocketAddr};

use hare_messaging::{Broker, Connection};
use tokio::{
    net::{self, TcpStream, ToSocketAddrs},
    select,
    sync::mpsc,
};
use tracing::{info, info_span, Instrument};

pub use crate::connection::TransportConnection;

/// Accepts clients on `addr` until `terminate` completes, then shuts the broker down.
pub async fn connection_loop(
    broker: Broker,
    addr: impl ToSocketAddrs,
    terminate: impl Future + Send,
) -> anyhow::Result<()> {
    select! {
        res = accept_cons(broker.clone(), addr) => {
            res
        }
        _ = terminate => {
            handle_shutdown(broker).await
        }
    }
}

async fn accept_cons(broker: Broker, addr: impl ToSocketAddrs) -> anyhow::Result<()> {
    info!("Binding TCP listener...");
    let listener = net::TcpListener::bind(addr).await?;
    info!(addr = ?listener.local_addr()?, "Successfully bound TCP listener");

    loop {
        let connection = listener.accept().await?;
        handle_con(&broker, connection);
    }
}

fn handle_con(broker: &Broker, connection: (TcpStream, SocketAddr)) {
    let (stream, peer_addr) = connection;

    if let Err(err) = stream.set_nodelay(true) {
        info!(%err, "Failed to disable nagle");
    }

    let (event_send, event_recv) = mpsc::unbounded_channel();
    let connection = Connection::open(broker, Some(peer_addr), event_send);
    let id = connection.id;

    info!(local_addr = ?stream.local_addr(), %id, "Accepted new connection");
    let span = info_span!("client-connection", %id);

    let transport = TransportConnection::new(stream, connection, event_recv);
    tokio::spawn(transport.start_connection_processing().instrument(span));
}

async fn handle_shutdown(broker: Broker) -> anyhow::Result<()> {
    info!("Shutting down...");

    broker.shutdown();

    // todo: wait for the connection tasks to flush and close their sockets

    info!("Finished shutdown");

    Ok(())
}
