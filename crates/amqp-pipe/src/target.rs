//! Broker target descriptions.
//!
//! A [`BrokerTarget`] names the queue or exchange a pipe talks to, along with
//! its declaration options. Targets are built once and stay immutable for the
//! life of the sender or receiver that owns them.

use crate::error::PipeError;
use lapin::types::FieldTable;
use std::fmt;
use std::str::FromStr;

/// Exchange routing disciplines supported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Topic,
    Headers,
    Fanout,
    /// The `amq.match` headers-alternative discipline.
    Match,
}

impl ExchangeKind {
    /// Map to the wire-level exchange type.
    ///
    /// `Match` has no dedicated lapin variant and goes out as the custom
    /// `"match"` type string.
    pub fn as_amqp(&self) -> lapin::ExchangeKind {
        match self {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Match => lapin::ExchangeKind::Custom("match".to_string()),
        }
    }

    /// Name as it appears in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Match => "match",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ExchangeKind::Direct),
            "topic" => Ok(ExchangeKind::Topic),
            "headers" => Ok(ExchangeKind::Headers),
            "fanout" => Ok(ExchangeKind::Fanout),
            "match" => Ok(ExchangeKind::Match),
            other => Err(PipeError::UnknownExchangeKind(other.to_string())),
        }
    }
}

/// Declaration options for a queue target.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Survive broker restarts; also gates outbound buffering on send failure.
    pub durable: bool,
    /// Restrict the queue to this connection.
    pub exclusive: bool,
    /// Delete the queue once the last consumer disconnects.
    pub auto_delete: bool,
    /// Extra broker-specific declaration arguments.
    pub arguments: FieldTable,
}

/// Declaration options for an exchange target.
#[derive(Debug, Clone, Default)]
pub struct ExchangeOptions {
    /// Survive broker restarts; also gates outbound buffering on send failure.
    pub durable: bool,
    /// Delete the exchange once the last binding is removed.
    pub auto_delete: bool,
    /// Refuse direct publishes; reachable only via exchange-to-exchange bindings.
    pub internal: bool,
    /// Extra broker-specific declaration arguments.
    pub arguments: FieldTable,
}

/// A queue or exchange a pipe is pointed at.
#[derive(Debug, Clone)]
pub enum BrokerTarget {
    Queue {
        name: String,
        options: QueueOptions,
    },
    Exchange {
        name: String,
        kind: ExchangeKind,
        options: ExchangeOptions,
        /// Routing keys a consumer binds; ignored for sends.
        routing_keys: Vec<String>,
    },
}

impl BrokerTarget {
    /// A queue target with the given declaration options.
    pub fn queue(name: impl Into<String>, options: QueueOptions) -> Self {
        BrokerTarget::Queue {
            name: name.into(),
            options,
        }
    }

    /// A durable queue target with otherwise default options.
    pub fn durable_queue(name: impl Into<String>) -> Self {
        BrokerTarget::Queue {
            name: name.into(),
            options: QueueOptions {
                durable: true,
                ..Default::default()
            },
        }
    }

    /// An exchange target with the given kind, options and binding keys.
    pub fn exchange(
        name: impl Into<String>,
        kind: ExchangeKind,
        options: ExchangeOptions,
        routing_keys: Vec<String>,
    ) -> Self {
        BrokerTarget::Exchange {
            name: name.into(),
            kind,
            options,
            routing_keys,
        }
    }

    /// The declared queue or exchange name.
    pub fn name(&self) -> &str {
        match self {
            BrokerTarget::Queue { name, .. } => name,
            BrokerTarget::Exchange { name, .. } => name,
        }
    }

    /// Whether the target's declaration requests durability.
    ///
    /// This is the flag the sender consults when deciding whether a failed
    /// send is worth buffering.
    pub fn is_durable(&self) -> bool {
        match self {
            BrokerTarget::Queue { options, .. } => options.durable,
            BrokerTarget::Exchange { options, .. } => options.durable,
        }
    }
}
