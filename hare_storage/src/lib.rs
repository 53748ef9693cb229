#![warn(rust_2018_idioms)]

//! Durable state for the broker: metadata documents for exchanges, queues and bindings and an
//! append-only log per queue for persistent messages.

mod error;
mod message_log;
mod meta;

pub use error::{Result, StorageError};
pub use message_log::{LogEntry, MessageLog};
pub use meta::{JsonFileStore, MemoryStore, MetaStore, Record};
