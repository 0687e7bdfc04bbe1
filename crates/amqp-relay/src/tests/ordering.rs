//! FIFO delivery guarantees through the sender.
//!
//! Covered behavior:
//! - Successful sends arrive in send order over a single pipe
//! - Buffered messages replay oldest first
//! - A failing head blocks later messages instead of being skipped
//! - Sends issued during a drain keep their relative order

use super::harness::{wait_until, MockSendConnector};
use crate::config::SenderConfig;
use crate::sender::RetryingSender;
use amqp_pipe::{BrokerTarget, OutboundMessage};
use std::sync::Arc;
use std::time::Duration;

/// Successful sends arrive in send order over a single pipe.
#[tokio::test]
async fn ordering_success_path_preserves_send_order() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 100,
            retry_interval: Duration::from_millis(20),
        },
    );

    let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
    for payload in &expected {
        sender
            .send(OutboundMessage::persistent(payload.clone()))
            .await
            .unwrap();
    }

    assert_eq!(connector.sent_payloads(), expected);
    // The pipe is reused while the broker stays up.
    assert_eq!(connector.connect_count(), 1);

    sender.close().await;
}

/// Messages buffered during an outage replay oldest first.
#[tokio::test]
async fn ordering_buffered_messages_replay_oldest_first() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 100,
            retry_interval: Duration::from_millis(20),
        },
    );

    connector.fail_sends(usize::MAX);
    for payload in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()] {
        sender
            .send(OutboundMessage::persistent(payload))
            .await
            .unwrap();
    }

    assert_eq!(sender.queue_len().await, 3);
    assert_eq!(connector.sent_count(), 0);

    connector.fail_sends(0);
    assert!(wait_until(Duration::from_secs(2), || connector.sent_count() == 3).await);
    assert_eq!(
        connector.sent_payloads(),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
    );
    assert_eq!(sender.queue_len().await, 0);

    sender.close().await;
}

/// A head that keeps failing holds later messages back; nothing is skipped
/// or reordered.
#[tokio::test]
async fn ordering_failed_head_blocks_later_messages() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 100,
            retry_interval: Duration::from_millis(20),
        },
    );

    connector.fail_sends(usize::MAX);
    sender
        .send(OutboundMessage::persistent(b"head".to_vec()))
        .await
        .unwrap();
    sender
        .send(OutboundMessage::persistent(b"tail".to_vec()))
        .await
        .unwrap();
    assert_eq!(sender.queue_len().await, 2);

    // The head fails three more drains before the broker recovers.
    connector.fail_sends(3);
    assert!(wait_until(Duration::from_secs(2), || connector.sent_count() == 2).await);
    assert_eq!(
        connector.sent_payloads(),
        vec![b"head".to_vec(), b"tail".to_vec()]
    );

    sender.close().await;
}

/// Sends issued while the drain is running land behind the backlog.
#[tokio::test]
async fn ordering_sends_during_buffering_stay_fifo() {
    let connector = Arc::new(MockSendConnector::new());
    let sender = RetryingSender::with_connector(
        BrokerTarget::durable_queue("jobs"),
        connector.clone(),
        SenderConfig {
            queue_capacity: 100,
            retry_interval: Duration::from_millis(20),
        },
    );

    connector.fail_sends(usize::MAX);
    sender
        .send(OutboundMessage::persistent(vec![1]))
        .await
        .unwrap();
    sender
        .send(OutboundMessage::persistent(vec![2]))
        .await
        .unwrap();

    connector.fail_sends(0);
    sender
        .send(OutboundMessage::persistent(vec![3]))
        .await
        .unwrap();
    sender
        .send(OutboundMessage::persistent(vec![4]))
        .await
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || connector.sent_count() == 4).await);
    assert_eq!(
        connector.sent_payloads(),
        vec![vec![1], vec![2], vec![3], vec![4]]
    );

    sender.close().await;
}
