#![warn(rust_2018_idioms)]
#![deny(clippy::future_not_send)]

//! Routing, storing and delivering messages.

pub mod broker;
pub mod channel;
pub mod connection;
pub mod consumer;
pub mod delivery;
pub mod methods;
mod queue_worker;
pub mod routing;
pub mod store;
pub mod virtual_host;


pub use broker::Broker;
pub use connection::{Connection, ConnectionHandle};
pub use virtual_host::VirtualHost;
