#![warn(rust_2018_idioms)]

pub mod binding;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod exchange;
mod macros;
pub mod message;
pub mod methods;
pub mod queue;
pub mod registry;

use std::collections::BTreeMap;

pub use error::{BrokerError, Result};
use uuid::Uuid;

/// Free-form arguments of exchanges and queues. Stored but not interpreted.
pub type Arguments = BTreeMap<String, String>;

pub fn random_uuid() -> Uuid {
    Uuid::from_bytes(rand::random())
}
