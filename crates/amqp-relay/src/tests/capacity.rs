//! Bounded-buffer behavior.
//!
//! Covered behavior:
//! - A full buffer rejects sends synchronously
//! - The bound holds while redelivery attempts are in flight
//! - Draining frees capacity for new sends
//! - A zero-capacity sender never buffers

use super::harness::{wait_until, MockSendConnector};
use crate::config::SenderConfig;
use crate::error::RelayError;
use crate::sender::RetryingSender;
use amqp_pipe::{BrokerTarget, OutboundMessage};
use std::sync::Arc;
use std::time::Duration;

/// Once the buffer is full, further sends fail synchronously and the
/// rejected message is not queued.
#[tokio::test]
async fn capacity_full_buffer_rejects_sends() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 2,
            retry_interval: Duration::from_millis(20),
        },
    );

    connector.fail_sends(usize::MAX);
    sender
        .send(OutboundMessage::persistent(b"a".to_vec()))
        .await
        .unwrap();
    sender
        .send(OutboundMessage::persistent(b"b".to_vec()))
        .await
        .unwrap();

    let err = sender
        .send(OutboundMessage::persistent(b"c".to_vec()))
        .await
        .unwrap_err();
    match err {
        RelayError::QueueFull { capacity } => assert_eq!(capacity, 2),
        other => panic!("expected QueueFull, got {other:?}"),
    }
    assert_eq!(sender.queue_len().await, 2);

    sender.close().await;
}

/// Redelivery attempts never let the buffer grow past its bound.
#[tokio::test]
async fn capacity_bound_holds_during_redelivery() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 2,
            retry_interval: Duration::from_millis(20),
        },
    );

    connector.fail_sends(usize::MAX);
    sender
        .send(OutboundMessage::persistent(b"a".to_vec()))
        .await
        .unwrap();
    sender
        .send(OutboundMessage::persistent(b"b".to_vec()))
        .await
        .unwrap();

    // Keep poking the full buffer while the retry task is attempting the
    // head; every poke must bounce and the bound must hold.
    for _ in 0..5 {
        assert!(sender
            .send(OutboundMessage::persistent(b"x".to_vec()))
            .await
            .is_err());
        assert_eq!(sender.queue_len().await, 2);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    sender.close().await;
}

/// Capacity freed by a successful drain is available to new sends.
#[tokio::test]
async fn capacity_frees_after_drain() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 2,
            retry_interval: Duration::from_millis(20),
        },
    );

    connector.fail_sends(usize::MAX);
    sender
        .send(OutboundMessage::persistent(b"a".to_vec()))
        .await
        .unwrap();
    sender
        .send(OutboundMessage::persistent(b"b".to_vec()))
        .await
        .unwrap();
    assert!(sender
        .send(OutboundMessage::persistent(b"rejected".to_vec()))
        .await
        .is_err());

    connector.fail_sends(0);
    assert!(wait_until(Duration::from_secs(2), || connector.sent_count() == 2).await);

    sender
        .send(OutboundMessage::persistent(b"c".to_vec()))
        .await
        .unwrap();
    assert_eq!(
        connector.sent_payloads(),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
    );

    sender.close().await;
}

/// With a capacity of zero nothing is ever buffered; failed durable sends
/// are dropped instead.
#[tokio::test]
async fn capacity_zero_never_buffers() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 0,
            retry_interval: Duration::from_millis(20),
        },
    );

    connector.fail_sends(1);
    sender
        .send(OutboundMessage::persistent(b"dropped".to_vec()))
        .await
        .unwrap();
    assert_eq!(sender.queue_len().await, 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.sent_count(), 0);

    sender
        .send(OutboundMessage::persistent(b"direct".to_vec()))
        .await
        .unwrap();
    assert_eq!(connector.sent_payloads(), vec![b"direct".to_vec()]);

    sender.close().await;
}
