//! Connection/channel pair with failure tracking.

use crate::error::{PipeError, PipeResult};
use lapin::{Channel, Connection, ConnectionProperties};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const REPLY_SUCCESS: u16 = 200;

/// One broker connection and one channel on it.
///
/// A session belongs to exactly one pipe. Broker-side failures flip the
/// shared `failed` flag instead of calling back into the owner; the owner
/// polls [`is_healthy`](Self::is_healthy) and discards the session when it
/// reports false. After [`close`](Self::close) the failure callback goes
/// quiet, so a deliberate teardown never reads as a broker fault.
pub struct ChannelSession {
    connection: Connection,
    channel: Channel,
    failed: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
}

impl ChannelSession {
    /// Connect to the broker and open a single channel.
    ///
    /// Fails fast with [`PipeError::UrlMissing`] when the URL is empty, and
    /// propagates connect errors without retaining any resources.
    pub async fn open(url: &str) -> PipeResult<Self> {
        if url.trim().is_empty() {
            return Err(PipeError::UrlMissing);
        }

        let connection = Connection::connect(url, ConnectionProperties::default()).await?;

        let failed = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));

        let failed_flag = failed.clone();
        let closing_flag = closing.clone();
        connection.on_error(move |error| {
            if closing_flag.load(Ordering::SeqCst) {
                debug!(error = %error, "Broker signaled error during close");
                return;
            }
            warn!(error = %error, "Broker connection failed");
            failed_flag.store(true, Ordering::SeqCst);
        });

        let channel = connection.create_channel().await?;
        debug!(url = %url, "Opened broker channel");

        Ok(Self {
            connection,
            channel,
            failed,
            closing,
        })
    }

    /// The channel this session opened.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// True while no failure has been signaled and the connection is up.
    pub fn is_healthy(&self) -> bool {
        !self.failed.load(Ordering::SeqCst) && self.connection.status().connected()
    }

    /// Tear down the channel and connection.
    ///
    /// Consumes the session, so a closed session cannot be reused or closed
    /// twice. Failure signals arriving mid-teardown are suppressed.
    pub async fn close(self) -> PipeResult<()> {
        self.closing.store(true, Ordering::SeqCst);

        let channel_result = self.channel.close(REPLY_SUCCESS, "closing").await;
        let connection_result = self.connection.close(REPLY_SUCCESS, "closing").await;

        channel_result?;
        connection_result?;
        Ok(())
    }
}
