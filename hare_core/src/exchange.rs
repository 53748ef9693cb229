use std::fmt::{Display, Formatter};

use hare_storage::Record;
use serde::{Deserialize, Serialize};

use crate::{newtype_name, registry::Entity, Arguments};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    /// Routes a message to a queue if the routing-keys are equal
    Direct,
    /// Always routes the message to a queue
    Fanout,
    /// Routes a message to a queue if the routing key matches the pattern
    Topic,
}

impl Display for ExchangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Fanout => "fanout",
            ExchangeType::Topic => "topic",
        })
    }
}

newtype_name!(
    /// The name of an exchange. A newtype wrapper around `Arc<str>`, which guarantees cheap clones.
    pub ExchangeName
);

impl ExchangeName {
    /// The nameless direct exchange that every virtual host has.
    pub fn default_exchange() -> Self {
        Self::new("")
    }

    pub fn is_default(&self) -> bool {
        self.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub name: ExchangeName,
    #[serde(rename = "type")]
    pub kind: ExchangeType,
    pub durable: bool,
    pub auto_delete: bool,
    #[serde(default)]
    pub arguments: Arguments,
}

impl Exchange {
    pub fn new(name: impl Into<ExchangeName>, kind: ExchangeType) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: false,
            auto_delete: false,
            arguments: Arguments::new(),
        }
    }

    pub fn default_exchange() -> Self {
        Self::new(ExchangeName::default_exchange(), ExchangeType::Direct).durable(true)
    }

    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    #[must_use]
    pub fn arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }
}

impl Record for Exchange {
    fn record_key(&self) -> String {
        self.name.to_string()
    }
}

impl Entity for Exchange {
    type Name = ExchangeName;

    const KIND: &'static str = "exchange";

    fn name(&self) -> &ExchangeName {
        &self.name
    }

    fn is_durable(&self) -> bool {
        self.durable
    }
}
