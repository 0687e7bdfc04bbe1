//! Health-checked receiver: a consume session that repairs itself.
//!
//! One background task owns the consume pipe. It polls deliveries, acks each
//! one before broadcasting it, and on every health tick replaces a failed or
//! absent session with a fresh one. Connection attempts run inline on the
//! task, so at most one is ever in flight.

use crate::config::ReceiverConfig;
use amqp_pipe::{
    BrokerConnector, BrokerTarget, ConsumeConnector, ConsumePipe, InboundDelivery, PipeError,
    PipeResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the broadcast channel carrying received payloads.
const EVENT_CAPACITY: usize = 100;

/// Where the receiver stands with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// No session; the next health tick starts a connection attempt.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// A consume session is live and deliveries flow.
    Connected,
}

/// Receiver bound to one broker source.
///
/// Construction spawns the health loop immediately; the first connection
/// attempt follows right away. Consumers of the payload stream call
/// [`subscribe`](Self::subscribe).
pub struct HealthCheckedReceiver {
    source: BrokerTarget,
    state: Arc<RwLock<ReceiverState>>,
    event_tx: broadcast::Sender<Vec<u8>>,
    shutdown_tx: mpsc::Sender<()>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthCheckedReceiver {
    /// Receiver that opens lapin-backed pipes against `url`.
    pub fn new(url: impl Into<String>, source: BrokerTarget, config: ReceiverConfig) -> Self {
        let connector = Arc::new(BrokerConnector::new(url, source.clone()));
        Self::with_connector(source, connector, config)
    }

    /// Receiver over a caller-supplied connector.
    pub fn with_connector(
        source: BrokerTarget,
        connector: Arc<dyn ConsumeConnector>,
        config: ReceiverConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(ReceiverState::Disconnected));

        let handle = spawn_health_loop(
            source.clone(),
            connector,
            state.clone(),
            event_tx.clone(),
            shutdown_rx,
            config.health_interval,
        );

        Self {
            source,
            state,
            event_tx,
            shutdown_tx,
            loop_handle: Mutex::new(Some(handle)),
        }
    }

    /// Subscribe to payloads received from the source.
    ///
    /// Payloads are acknowledged to the broker before they are published
    /// here, and are dropped if no subscriber exists when they arrive.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.event_tx.subscribe()
    }

    /// Current connection state.
    pub async fn state(&self) -> ReceiverState {
        *self.state.read().await
    }

    /// Stop the health loop and close the consume session.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(handle) = self.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                debug!(source = %self.source.name(), error = %e, "Receiver loop ended abnormally");
            }
        }
        info!(source = %self.source.name(), "Receiver closed");
    }
}

enum LoopEvent {
    Tick,
    Delivery(PipeResult<Option<InboundDelivery>>),
    Shutdown,
}

fn spawn_health_loop(
    source: BrokerTarget,
    connector: Arc<dyn ConsumeConnector>,
    state: Arc<RwLock<ReceiverState>>,
    event_tx: broadcast::Sender<Vec<u8>>,
    mut shutdown_rx: mpsc::Receiver<()>,
    health_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(health_interval);
        // A connection attempt that outlasts the interval must not earn a
        // burst of catch-up ticks afterwards.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pipe: Option<Box<dyn ConsumePipe>> = None;

        loop {
            // Branch bodies stay free of `pipe` so the delivery future can
            // borrow it; all mutation happens after the select resolves.
            let event = tokio::select! {
                _ = ticker.tick() => LoopEvent::Tick,
                delivery = next_delivery_or_pending(&mut pipe) => LoopEvent::Delivery(delivery),
                _ = shutdown_rx.recv() => LoopEvent::Shutdown,
            };

            match event {
                LoopEvent::Tick => {
                    // A failed session is swept and replaced within the
                    // same tick.
                    if matches!(&pipe, Some(p) if !p.is_healthy()) {
                        warn!(source = %source.name(), "Consume session failed; replacing it");
                        pipe = None;
                        *state.write().await = ReceiverState::Disconnected;
                    }
                    if pipe.is_none() {
                        *state.write().await = ReceiverState::Connecting;
                        info!(source = %source.name(), "Connecting consume session");
                        match connector.open_consume_pipe().await {
                            Ok(p) => {
                                pipe = Some(p);
                                *state.write().await = ReceiverState::Connected;
                                info!(source = %source.name(), "Consume session established");
                            }
                            Err(e) => {
                                *state.write().await = ReceiverState::Disconnected;
                                warn!(
                                    source = %source.name(),
                                    error = %e,
                                    "Connection attempt failed; retrying on next tick"
                                );
                            }
                        }
                    }
                }
                LoopEvent::Delivery(Ok(Some(delivery))) => {
                    // The ack runs outside the select race; once the delivery
                    // is off the stream a tick must not cancel it.
                    let acked = match pipe.as_mut() {
                        Some(p) => p.ack(&delivery).await,
                        None => Err(PipeError::NotConsuming),
                    };
                    match acked {
                        Ok(()) => {
                            debug!(source = %source.name(), len = delivery.payload().len(), "Forwarding delivery");
                            let _ = event_tx.send(delivery.into_payload());
                        }
                        Err(e) => {
                            // Unacked, so the broker redelivers; forwarding
                            // now would hand it to subscribers twice.
                            warn!(source = %source.name(), error = %e, "Ack failed; scheduling reconnect");
                            pipe = None;
                            *state.write().await = ReceiverState::Disconnected;
                        }
                    }
                }
                LoopEvent::Delivery(Ok(None)) => {
                    warn!(source = %source.name(), "Consumer stream ended; scheduling reconnect");
                    pipe = None;
                    *state.write().await = ReceiverState::Disconnected;
                }
                LoopEvent::Delivery(Err(e)) => {
                    warn!(source = %source.name(), error = %e, "Consume failed; scheduling reconnect");
                    pipe = None;
                    *state.write().await = ReceiverState::Disconnected;
                }
                LoopEvent::Shutdown => {
                    if let Some(p) = pipe.take() {
                        if let Err(e) = p.close().await {
                            debug!(source = %source.name(), error = %e, "Error closing consume pipe");
                        }
                    }
                    *state.write().await = ReceiverState::Disconnected;
                    debug!(source = %source.name(), "Receiver loop stopped");
                    break;
                }
            }
        }
    })
}

/// Poll the pipe for the next delivery, or park forever while disconnected.
///
/// Parking keeps the select loop waiting on the ticker and shutdown channel
/// instead of spinning while there is nothing to consume.
async fn next_delivery_or_pending(
    pipe: &mut Option<Box<dyn ConsumePipe>>,
) -> PipeResult<Option<InboundDelivery>> {
    match pipe {
        Some(p) => p.next_delivery().await,
        None => std::future::pending().await,
    }
}
