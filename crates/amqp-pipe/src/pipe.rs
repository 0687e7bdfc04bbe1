//! Per-target pipes and their capability traits.
//!
//! A pipe couples one [`ChannelSession`] with one declared target. The two
//! concrete kinds, [`QueuePipe`] and [`ExchangePipe`], share the [`SendPipe`]
//! and [`ConsumePipe`] capability traits; which kind gets built is decided by
//! the target, not by the code that pushes or pulls messages.

use crate::error::{PipeError, PipeResult};
use crate::message::{InboundDelivery, OutboundMessage};
use crate::session::ChannelSession;
use crate::target::{ExchangeKind, ExchangeOptions, QueueOptions};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Consumer};
use tracing::{debug, trace};
use uuid::Uuid;

/// Unacknowledged deliveries the broker may push before waiting for acks.
const PREFETCH_COUNT: u16 = 1;

/// AMQP delivery mode for messages the broker should persist.
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// The sending half of a pipe.
#[async_trait]
pub trait SendPipe: Send {
    /// Publish one message to the pipe's target.
    async fn send(&mut self, message: &OutboundMessage) -> PipeResult<()>;

    /// True while the underlying session has not failed.
    fn is_healthy(&self) -> bool;

    /// Tear down the pipe's session.
    async fn close(self: Box<Self>) -> PipeResult<()>;
}

/// The consuming half of a pipe.
#[async_trait]
pub trait ConsumePipe: Send {
    /// The next delivery, not yet acknowledged. `Ok(None)` means the
    /// consumer stream ended.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the
    /// delivery with the broker, so it can be raced in a `select!`.
    async fn next_delivery(&mut self) -> PipeResult<Option<InboundDelivery>>;

    /// Acknowledge a delivery handed out by
    /// [`next_delivery`](Self::next_delivery).
    async fn ack(&mut self, delivery: &InboundDelivery) -> PipeResult<()>;

    /// True while the underlying session has not failed.
    fn is_healthy(&self) -> bool;

    /// Tear down the pipe's session.
    async fn close(self: Box<Self>) -> PipeResult<()>;
}

/// A pipe pointed at a named queue.
pub struct QueuePipe {
    session: ChannelSession,
    queue: String,
    consumer: Option<Consumer>,
}

impl QueuePipe {
    /// Connect and declare the queue, ready for sending.
    pub async fn open(url: &str, name: &str, options: &QueueOptions) -> PipeResult<Self> {
        let session = ChannelSession::open(url).await?;
        session
            .channel()
            .queue_declare(name, queue_declare_options(options), options.arguments.clone())
            .await?;
        debug!(queue = %name, durable = options.durable, "Declared queue");

        Ok(Self {
            session,
            queue: name.to_string(),
            consumer: None,
        })
    }

    /// Connect, declare the queue and start consuming from it.
    pub async fn open_consumer(url: &str, name: &str, options: &QueueOptions) -> PipeResult<Self> {
        let mut pipe = Self::open(url, name, options).await?;

        pipe.session
            .channel()
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await?;
        let consumer = pipe
            .session
            .channel()
            .basic_consume(
                &pipe.queue,
                &consumer_tag(),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        debug!(queue = %pipe.queue, "Consuming from queue");

        pipe.consumer = Some(consumer);
        Ok(pipe)
    }
}

#[async_trait]
impl SendPipe for QueuePipe {
    async fn send(&mut self, message: &OutboundMessage) -> PipeResult<()> {
        let (payload, persistent) = match message {
            OutboundMessage::Queue {
                payload,
                persistent,
            } => (payload, *persistent),
            OutboundMessage::Exchange { .. } => {
                return Err(PipeError::TargetMismatch(
                    "exchange message on a queue pipe",
                ))
            }
        };

        let properties = if persistent {
            BasicProperties::default().with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        } else {
            BasicProperties::default()
        };

        // Queue sends go through the default exchange, keyed by queue name.
        self.session
            .channel()
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;
        trace!(queue = %self.queue, bytes = payload.len(), "Published to queue");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.session.is_healthy()
    }

    async fn close(self: Box<Self>) -> PipeResult<()> {
        self.session.close().await
    }
}

#[async_trait]
impl ConsumePipe for QueuePipe {
    async fn next_delivery(&mut self) -> PipeResult<Option<InboundDelivery>> {
        let consumer = self.consumer.as_mut().ok_or(PipeError::NotConsuming)?;
        next_from_stream(consumer, &self.queue).await
    }

    async fn ack(&mut self, delivery: &InboundDelivery) -> PipeResult<()> {
        ack_on_channel(self.session.channel(), delivery, &self.queue).await
    }

    fn is_healthy(&self) -> bool {
        self.session.is_healthy()
    }

    async fn close(self: Box<Self>) -> PipeResult<()> {
        self.session.close().await
    }
}

/// A pipe pointed at a named exchange.
pub struct ExchangePipe {
    session: ChannelSession,
    exchange: String,
    consumer: Option<Consumer>,
}

impl ExchangePipe {
    /// Connect and declare the exchange, ready for publishing.
    pub async fn open(
        url: &str,
        name: &str,
        kind: ExchangeKind,
        options: &ExchangeOptions,
    ) -> PipeResult<Self> {
        let session = ChannelSession::open(url).await?;
        session
            .channel()
            .exchange_declare(
                name,
                kind.as_amqp(),
                exchange_declare_options(options),
                options.arguments.clone(),
            )
            .await?;
        debug!(exchange = %name, kind = %kind, durable = options.durable, "Declared exchange");

        Ok(Self {
            session,
            exchange: name.to_string(),
            consumer: None,
        })
    }

    /// Connect, declare the exchange, bind an exclusive server-named queue
    /// for the configured routing keys and start consuming from it.
    pub async fn open_consumer(
        url: &str,
        name: &str,
        kind: ExchangeKind,
        options: &ExchangeOptions,
        routing_keys: &[String],
    ) -> PipeResult<Self> {
        let pipe = Self::open(url, name, kind, options).await?;
        let channel = pipe.session.channel();

        // The queue is exclusive to this connection and dies with it.
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue_name = queue.name().as_str().to_string();

        if routing_keys.is_empty() {
            // Fanout-style consumption still needs one binding.
            channel
                .queue_bind(
                    &queue_name,
                    name,
                    "",
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        } else {
            for key in routing_keys {
                channel
                    .queue_bind(
                        &queue_name,
                        name,
                        key,
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await?;
                debug!(exchange = %name, queue = %queue_name, routing_key = %key, "Bound routing key");
            }
        }

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                &queue_name,
                &consumer_tag(),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        debug!(exchange = %name, queue = %queue_name, "Consuming from exchange");

        Ok(Self {
            consumer: Some(consumer),
            ..pipe
        })
    }
}

#[async_trait]
impl SendPipe for ExchangePipe {
    async fn send(&mut self, message: &OutboundMessage) -> PipeResult<()> {
        let (routing_key, payload) = match message {
            OutboundMessage::Exchange {
                routing_key,
                payload,
            } => (routing_key.as_str(), payload),
            OutboundMessage::Queue { .. } => {
                return Err(PipeError::TargetMismatch(
                    "queue message on an exchange pipe",
                ))
            }
        };

        self.session
            .channel()
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await?
            .await?;
        trace!(exchange = %self.exchange, routing_key = %routing_key, bytes = payload.len(), "Published to exchange");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.session.is_healthy()
    }

    async fn close(self: Box<Self>) -> PipeResult<()> {
        self.session.close().await
    }
}

#[async_trait]
impl ConsumePipe for ExchangePipe {
    async fn next_delivery(&mut self) -> PipeResult<Option<InboundDelivery>> {
        let consumer = self.consumer.as_mut().ok_or(PipeError::NotConsuming)?;
        next_from_stream(consumer, &self.exchange).await
    }

    async fn ack(&mut self, delivery: &InboundDelivery) -> PipeResult<()> {
        ack_on_channel(self.session.channel(), delivery, &self.exchange).await
    }

    fn is_healthy(&self) -> bool {
        self.session.is_healthy()
    }

    async fn close(self: Box<Self>) -> PipeResult<()> {
        self.session.close().await
    }
}

/// Pull one delivery off the consumer stream without acknowledging it.
///
/// The stream read is the only await; cancelling the future can never
/// consume a delivery and then drop it on the floor.
async fn next_from_stream(
    consumer: &mut Consumer,
    target: &str,
) -> PipeResult<Option<InboundDelivery>> {
    match consumer.next().await {
        Some(Ok(delivery)) => {
            trace!(target = %target, tag = delivery.delivery_tag, bytes = delivery.data.len(), "Received delivery");
            Ok(Some(InboundDelivery::new(delivery.delivery_tag, delivery.data)))
        }
        Some(Err(e)) => Err(PipeError::Broker(e)),
        None => Ok(None),
    }
}

/// Acknowledge a delivery by tag on the pipe's channel.
async fn ack_on_channel(
    channel: &Channel,
    delivery: &InboundDelivery,
    target: &str,
) -> PipeResult<()> {
    channel
        .basic_ack(delivery.delivery_tag(), BasicAckOptions::default())
        .await?;
    trace!(target = %target, tag = delivery.delivery_tag(), "Acknowledged delivery");
    Ok(())
}

fn consumer_tag() -> String {
    format!("relay-{}", Uuid::new_v4())
}

fn queue_declare_options(options: &QueueOptions) -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: options.durable,
        exclusive: options.exclusive,
        auto_delete: options.auto_delete,
        ..Default::default()
    }
}

fn exchange_declare_options(options: &ExchangeOptions) -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        durable: options.durable,
        auto_delete: options.auto_delete,
        internal: options.internal,
        ..Default::default()
    }
}
