//! Configuration for senders, receivers and the bridge binary.

use amqp_pipe::BrokerTarget;
use std::time::Duration;

/// Default outbound buffer capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default interval between retry drains.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Default interval between receiver health checks.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_millis(1000);

/// Tuning for a [`RetryingSender`](crate::sender::RetryingSender).
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Hard bound on buffered messages; sends beyond it fail synchronously.
    pub queue_capacity: usize,

    /// How often the retry task drains the buffer.
    pub retry_interval: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Tuning for a [`HealthCheckedReceiver`](crate::receiver::HealthCheckedReceiver).
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// How often the health checker looks at the connection.
    pub health_interval: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

/// Everything the bridge binary needs: one broker, a source to consume from
/// and a destination to forward to.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Broker connection URL.
    pub url: String,

    /// Target the bridge consumes from.
    pub source: BrokerTarget,

    /// Target the bridge forwards into.
    pub destination: BrokerTarget,

    /// Sender-side tuning.
    pub sender: SenderConfig,

    /// Receiver-side tuning.
    pub receiver: ReceiverConfig,
}
