//! Retrying sender: immediate delivery with a bounded FIFO fallback buffer.
//!
//! A sender is either Idle (queue empty, no retry task) or Buffering (queue
//! non-empty, one retry task draining it). Failed sends to a durable target
//! are buffered up to capacity and replayed in order; failed sends to a
//! non-durable target are dropped with a log line. Only the queue-full case
//! surfaces to the caller.

use crate::config::SenderConfig;
use crate::error::{RelayError, RelayResult};
use amqp_pipe::{
    BrokerConnector, BrokerTarget, OutboundMessage, PipeResult, SendConnector, SendPipe,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Sender bound to one broker target.
pub struct RetryingSender {
    config: SenderConfig,
    target: BrokerTarget,
    connector: Arc<dyn SendConnector>,
    pipe: Arc<Mutex<Option<Box<dyn SendPipe>>>>,
    queue: Arc<Mutex<VecDeque<OutboundMessage>>>,
    /// True while a retry task is live. Only flipped while `queue` is locked,
    /// which is what keeps the task count at one.
    retry_running: Arc<AtomicBool>,
    retry_handle: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl RetryingSender {
    /// Sender that opens lapin-backed pipes against `url` on demand.
    ///
    /// No connection is made here; the first `send` triggers it.
    pub fn new(url: impl Into<String>, target: BrokerTarget, config: SenderConfig) -> Self {
        let connector = Arc::new(BrokerConnector::new(url, target.clone()));
        Self::with_connector(target, connector, config)
    }

    /// Sender over a caller-supplied connector.
    pub fn with_connector(
        target: BrokerTarget,
        connector: Arc<dyn SendConnector>,
        config: SenderConfig,
    ) -> Self {
        Self {
            config,
            target,
            connector,
            pipe: Arc::new(Mutex::new(None)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            retry_running: Arc::new(AtomicBool::new(false)),
            retry_handle: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver a message, buffering it if the broker is unreachable.
    ///
    /// Returns `Err(RelayError::QueueFull)` when the buffer is at capacity;
    /// that message is gone. Every other failure is absorbed: durable targets
    /// buffer the message for the retry task, non-durable targets drop it.
    pub async fn send(&self, message: OutboundMessage) -> RelayResult<()> {
        {
            let mut queue = self.queue.lock().await;
            if !queue.is_empty() {
                if queue.len() >= self.config.queue_capacity {
                    warn!(
                        target = %self.target.name(),
                        capacity = self.config.queue_capacity,
                        "Outbound queue full; rejecting send"
                    );
                    return Err(RelayError::QueueFull {
                        capacity: self.config.queue_capacity,
                    });
                }
                queue.push_back(message);
                debug!(
                    target = %self.target.name(),
                    queued = queue.len(),
                    "Buffered message behind earlier failures"
                );
                return Ok(());
            }
        }

        // Queue empty: deliver right now.
        let error = match deliver(&self.connector, &self.pipe, &message).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !self.target.is_durable() {
            warn!(
                target = %self.target.name(),
                error = %error,
                "Dropping non-durable message after failed send"
            );
            return Ok(());
        }

        let mut queue = self.queue.lock().await;
        if queue.len() >= self.config.queue_capacity {
            warn!(
                target = %self.target.name(),
                capacity = self.config.queue_capacity,
                error = %error,
                "Outbound queue full; dropping durable message"
            );
            return Ok(());
        }
        queue.push_back(message);
        info!(
            target = %self.target.name(),
            queued = queue.len(),
            error = %error,
            "Send failed; buffering for retry"
        );
        if !self.retry_running.swap(true, Ordering::SeqCst) {
            let handle = self.spawn_retry_task();
            *self.retry_handle.lock().await = Some(handle);
        }
        Ok(())
    }

    /// Number of messages waiting in the outbound buffer.
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Stop the retry task and close the pipe if one is open.
    ///
    /// Buffered messages are not flushed; the sender must not be used
    /// afterwards.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        if let Some(handle) = self.retry_handle.lock().await.take() {
            handle.abort();
        }

        if let Some(pipe) = self.pipe.lock().await.take() {
            if let Err(e) = pipe.close().await {
                debug!(target = %self.target.name(), error = %e, "Error closing send pipe");
            }
        }
        info!(target = %self.target.name(), "Sender closed");
    }

    fn spawn_retry_task(&self) -> JoinHandle<()> {
        let connector = self.connector.clone();
        let pipe = self.pipe.clone();
        let queue = self.queue.clone();
        let retry_running = self.retry_running.clone();
        let closed = self.closed.clone();
        let target = self.target.clone();
        let retry_interval = self.config.retry_interval;

        debug!(target = %target.name(), "Starting retry task");
        tokio::spawn(async move {
            let mut ticker = interval(retry_interval);
            // A drain that outlasts the interval must not earn a burst of
            // catch-up ticks afterwards.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick completes instantly; eat it so the
            // first drain happens one full period after buffering began.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if closed.load(Ordering::SeqCst) {
                    break;
                }

                match drain(&connector, &pipe, &queue, &retry_running, &target).await {
                    DrainOutcome::Drained => break,
                    DrainOutcome::Stalled => {}
                }
            }
        })
    }
}

enum DrainOutcome {
    /// Queue went empty; the task is done and the running flag is cleared.
    Drained,
    /// A delivery failed; the head stays put until the next tick.
    Stalled,
}

/// Replay buffered messages in order until the queue empties or one fails.
///
/// The head is only removed after its delivery succeeds, so the buffer never
/// loses a message to a failed attempt and its length never exceeds capacity.
async fn drain(
    connector: &Arc<dyn SendConnector>,
    pipe: &Mutex<Option<Box<dyn SendPipe>>>,
    queue: &Mutex<VecDeque<OutboundMessage>>,
    retry_running: &AtomicBool,
    target: &BrokerTarget,
) -> DrainOutcome {
    loop {
        let head = {
            let queue_guard = queue.lock().await;
            match queue_guard.front() {
                Some(message) => message.clone(),
                None => {
                    // Cleared under the queue lock so a concurrent send either
                    // sees the empty queue or a task that is still running.
                    retry_running.store(false, Ordering::SeqCst);
                    debug!(target = %target.name(), "Outbound queue drained; stopping retry task");
                    return DrainOutcome::Drained;
                }
            }
        };

        match deliver(connector, pipe, &head).await {
            Ok(()) => {
                let mut queue_guard = queue.lock().await;
                queue_guard.pop_front();
                debug!(
                    target = %target.name(),
                    remaining = queue_guard.len(),
                    "Redelivered buffered message"
                );
            }
            Err(e) => {
                warn!(
                    target = %target.name(),
                    error = %e,
                    "Retry delivery failed; keeping message at queue head"
                );
                return DrainOutcome::Stalled;
            }
        }
    }
}

/// Push one message through the pipe, opening it first if needed.
///
/// Any failure discards the pipe so the next attempt re-establishes the
/// session and re-declares the target from scratch.
async fn deliver(
    connector: &Arc<dyn SendConnector>,
    pipe: &Mutex<Option<Box<dyn SendPipe>>>,
    message: &OutboundMessage,
) -> PipeResult<()> {
    let mut pipe_guard = pipe.lock().await;

    let mut current = match pipe_guard.take() {
        Some(p) if p.is_healthy() => p,
        Some(_) => {
            debug!("Discarding send pipe whose session failed");
            connector.open_send_pipe().await?
        }
        None => connector.open_send_pipe().await?,
    };

    match current.send(message).await {
        Ok(()) => {
            *pipe_guard = Some(current);
            Ok(())
        }
        // The failed pipe is not put back; the next attempt reconnects.
        Err(e) => Err(e),
    }
}
