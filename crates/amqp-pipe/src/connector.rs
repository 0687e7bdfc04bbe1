//! Lazy pipe establishment.
//!
//! Senders and receivers do not hold a pipe from birth; they ask a connector
//! for one whenever the previous pipe is absent or has been invalidated. The
//! connector traits are the seam test code mocks out.

use crate::error::PipeResult;
use crate::pipe::{ConsumePipe, ExchangePipe, QueuePipe, SendPipe};
use crate::target::BrokerTarget;
use async_trait::async_trait;
use tracing::debug;

/// Opens sending pipes for one fixed target.
#[async_trait]
pub trait SendConnector: Send + Sync {
    /// Connect to the broker and declare the target, ready for publishing.
    async fn open_send_pipe(&self) -> PipeResult<Box<dyn SendPipe>>;
}

/// Opens consuming pipes for one fixed target.
#[async_trait]
pub trait ConsumeConnector: Send + Sync {
    /// Connect to the broker, declare the target and start consuming.
    async fn open_consume_pipe(&self) -> PipeResult<Box<dyn ConsumePipe>>;
}

/// Lapin-backed connector holding a broker URL and a target description.
///
/// Every call opens a brand-new connection/channel pair; nothing is pooled
/// or reused across attempts.
pub struct BrokerConnector {
    url: String,
    target: BrokerTarget,
}

impl BrokerConnector {
    pub fn new(url: impl Into<String>, target: BrokerTarget) -> Self {
        Self {
            url: url.into(),
            target,
        }
    }
}

#[async_trait]
impl SendConnector for BrokerConnector {
    async fn open_send_pipe(&self) -> PipeResult<Box<dyn SendPipe>> {
        let pipe: Box<dyn SendPipe> = match &self.target {
            BrokerTarget::Queue { name, options } => {
                Box::new(QueuePipe::open(&self.url, name, options).await?)
            }
            BrokerTarget::Exchange {
                name,
                kind,
                options,
                ..
            } => Box::new(ExchangePipe::open(&self.url, name, *kind, options).await?),
        };
        debug!(target = %self.target.name(), "Opened send pipe");
        Ok(pipe)
    }
}

#[async_trait]
impl ConsumeConnector for BrokerConnector {
    async fn open_consume_pipe(&self) -> PipeResult<Box<dyn ConsumePipe>> {
        let pipe: Box<dyn ConsumePipe> = match &self.target {
            BrokerTarget::Queue { name, options } => {
                Box::new(QueuePipe::open_consumer(&self.url, name, options).await?)
            }
            BrokerTarget::Exchange {
                name,
                kind,
                options,
                routing_keys,
            } => Box::new(
                ExchangePipe::open_consumer(&self.url, name, *kind, options, routing_keys).await?,
            ),
        };
        debug!(target = %self.target.name(), "Opened consume pipe");
        Ok(pipe)
    }
}
