//! Integration tests for the relay.
//!
//! Test organization:
//!
//! - `harness.rs`    - Mock pipes, connectors and an in-memory broker
//! - `ordering.rs`   - FIFO delivery through the sender
//! - `buffering.rs`  - Failure buffering and redelivery
//! - `capacity.rs`   - Bounded-buffer behavior
//! - `reconnect.rs`  - Receiver health checking and reconnection
//! - `forwarding.rs` - Ack-before-forward and the bridge pump
//! - `routing.rs`    - Exchange binding keys end to end

mod capacity;
mod ordering;

// Re-exports for external test usage if needed
#[allow(unused_imports)]
pub use harness::{MockBroker, MockConsumeConnector, MockSendConnector};
