//! Bridge: pump payloads from a source receiver into a destination sender.

use crate::config::BridgeConfig;
use crate::error::RelayResult;
use crate::receiver::HealthCheckedReceiver;
use crate::sender::RetryingSender;
use amqp_pipe::{BrokerTarget, OutboundMessage};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// One-way relay between two broker targets over a shared URL.
///
/// The receiver side repairs its own session; the sender side buffers
/// through outages. A payload rejected by the full outbound buffer is
/// dropped, not retried, so the bridge never blocks the consume side.
pub struct RelayBridge {
    destination: BrokerTarget,
    sender: RetryingSender,
    receiver: HealthCheckedReceiver,
}

impl RelayBridge {
    /// Bridge between `config.source` and `config.destination`.
    pub fn new(config: BridgeConfig) -> Self {
        let destination = config.destination;
        let receiver =
            HealthCheckedReceiver::new(config.url.clone(), config.source, config.receiver);
        let sender = RetryingSender::new(config.url, destination.clone(), config.sender);
        Self {
            destination,
            sender,
            receiver,
        }
    }

    /// Bridge over pre-built endpoints.
    pub fn with_parts(
        destination: BrokerTarget,
        sender: RetryingSender,
        receiver: HealthCheckedReceiver,
    ) -> Self {
        Self {
            destination,
            sender,
            receiver,
        }
    }

    /// Forward payloads until the receiver's event channel closes.
    pub async fn run(&self) -> RelayResult<()> {
        let mut events = self.receiver.subscribe();
        info!(destination = %self.destination.name(), "Bridge running");
        loop {
            match events.recv().await {
                Ok(payload) => {
                    let message = outbound_for(&self.destination, payload);
                    if let Err(e) = self.sender.send(message).await {
                        warn!(
                            destination = %self.destination.name(),
                            error = %e,
                            "Forward rejected; dropping payload"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(count = skipped, "Bridge fell behind the receiver; payloads were dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Receiver event channel closed; bridge stopping");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Close both endpoints, receive side first.
    pub async fn close(&self) {
        self.receiver.close().await;
        self.sender.close().await;
        info!(destination = %self.destination.name(), "Bridge closed");
    }
}

/// Shape a raw payload for the destination target.
///
/// Queue destinations inherit persistence from the queue's durability.
/// Exchange destinations publish under the target's first routing key, or
/// the empty key when none is configured.
fn outbound_for(destination: &BrokerTarget, payload: Vec<u8>) -> OutboundMessage {
    match destination {
        BrokerTarget::Queue { options, .. } => {
            if options.durable {
                OutboundMessage::persistent(payload)
            } else {
                OutboundMessage::transient(payload)
            }
        }
        BrokerTarget::Exchange { routing_keys, .. } => {
            let key = routing_keys.first().cloned().unwrap_or_default();
            OutboundMessage::routed(key, payload)
        }
    }
}
