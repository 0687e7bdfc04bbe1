//! amqp-relay: fault-tolerant publish and subscribe over an AMQP broker.
//!
//! The relay pairs a sending half that buffers through outages with a
//! receiving half that repairs its own consume session. Both halves are
//! built on [`amqp_pipe`] and never share a connection.
//!
//! # Core Invariants
//!
//! 1. **Order survives outages**: buffered messages are redelivered oldest
//!    first, and a failed redelivery leaves its message at the head
//! 2. **The buffer is bounded**: once full, sends fail synchronously instead
//!    of growing the queue
//! 3. **One repair at a time**: a single retry task drains the buffer, and
//!    receiver connection attempts run one after another on its own task
//! 4. **Failures stay inside**: broker errors are logged and retried; only
//!    the full-buffer case reaches the caller
//!
//! # Architecture
//!
//! ```text
//! Broker -> HealthCheckedReceiver -> RelayBridge -> RetryingSender -> Broker
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod receiver;
pub mod sender;

#[cfg(test)]
mod tests;

pub use bridge::RelayBridge;
pub use config::{BridgeConfig, ReceiverConfig, SenderConfig};
pub use error::{RelayError, RelayResult};
pub use receiver::{HealthCheckedReceiver, ReceiverState};
pub use sender::RetryingSender;
