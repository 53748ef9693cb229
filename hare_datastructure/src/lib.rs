#![warn(rust_2018_idioms)]

mod message_queue;

pub use message_queue::{Identified, MessageQueue};
