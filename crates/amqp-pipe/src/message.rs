//! Message shapes on both sides of a pipe.

/// A message bound for a queue or exchange target.
///
/// Payloads are opaque bytes; serialization is the caller's business on the
/// way in and the subscriber's on the way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Queue {
        payload: Vec<u8>,
        /// Ask the broker to persist the message (AMQP delivery mode 2).
        /// Independent of the in-memory retry policy.
        persistent: bool,
    },
    Exchange {
        routing_key: String,
        payload: Vec<u8>,
    },
}

impl OutboundMessage {
    /// A persistent queue message.
    pub fn persistent(payload: impl Into<Vec<u8>>) -> Self {
        OutboundMessage::Queue {
            payload: payload.into(),
            persistent: true,
        }
    }

    /// A transient queue message.
    pub fn transient(payload: impl Into<Vec<u8>>) -> Self {
        OutboundMessage::Queue {
            payload: payload.into(),
            persistent: false,
        }
    }

    /// An exchange message published under the given routing key.
    pub fn routed(routing_key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        OutboundMessage::Exchange {
            routing_key: routing_key.into(),
            payload: payload.into(),
        }
    }

    /// The message body.
    pub fn payload(&self) -> &[u8] {
        match self {
            OutboundMessage::Queue { payload, .. } => payload,
            OutboundMessage::Exchange { payload, .. } => payload,
        }
    }
}

/// A delivery pulled from a consumer, not yet acknowledged.
///
/// Handed out by a consuming pipe and passed back to its `ack`; the tag
/// identifies the delivery on the channel it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDelivery {
    delivery_tag: u64,
    payload: Vec<u8>,
}

impl InboundDelivery {
    pub fn new(delivery_tag: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            payload: payload.into(),
        }
    }

    /// The broker-assigned, channel-scoped delivery tag.
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// The delivered bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the delivery, keeping only its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
