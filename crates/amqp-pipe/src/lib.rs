//! amqp-pipe: per-target pipes over an AMQP connection/channel pair.
//!
//! A pipe owns exactly one broker connection, one channel and one declared
//! target (queue or exchange). It can push messages at the target or consume
//! from it; consumed deliveries come back unacknowledged and are acked
//! through the pipe in a separate step.
//!
//! # Core Invariants
//!
//! 1. **One session per pipe**: connections are never shared or pooled
//! 2. **Cancel-safe consumption**: pulling a delivery may be raced in a
//!    `select!`; only the separate ack commits it with the broker
//! 3. **Prefetch of one**: at most one unacknowledged delivery in flight
//! 4. **Fail-fast configuration**: an empty broker URL is rejected before
//!    any connection attempt
//!
//! # Architecture
//!
//! ```text
//! Connector -> Pipe (QueuePipe | ExchangePipe) -> ChannelSession -> Broker
//! ```

pub mod connector;
pub mod error;
pub mod message;
pub mod pipe;
pub mod session;
pub mod target;

pub use connector::{BrokerConnector, ConsumeConnector, SendConnector};
pub use error::{PipeError, PipeResult};
pub use message::{InboundDelivery, OutboundMessage};
pub use pipe::{ConsumePipe, ExchangePipe, QueuePipe, SendPipe};
pub use session::ChannelSession;
pub use target::{BrokerTarget, ExchangeKind, ExchangeOptions, QueueOptions};
