use crate::analyzer::{self, Decision, WindowAnalyzer};
use crate::config::ChannelConfig;
use crate::reading::{decode_reading, DecodeError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result of handling one delivered payload.
pub type Outcome = Result<Decision, DecodeError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("broker request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("broker closed the connection")]
    Closed,
}

/// Ordered, one-at-a-time delivery of raw payloads for a single channel.
///
/// `recv` must not hand out a new message until the previous one has been
/// passed to `ack`.
pub trait MessageSource {
    type Message: Send + Sync;

    fn payload(message: &Self::Message) -> &[u8];

    /// Next message, or `None` once the source has no more to give.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Message>, TransportError>> + Send;

    fn ack(
        &mut self,
        message: &Self::Message,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Releases the connection. Unacked messages stay with the broker.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeliveryState {
    Idle = 0,
    Awaiting = 1,
    Decoding = 2,
    Evaluating = 3,
    Acknowledging = 4,
    Shutdown = 5,
}

impl DeliveryState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => DeliveryState::Awaiting,
            2 => DeliveryState::Decoding,
            3 => DeliveryState::Evaluating,
            4 => DeliveryState::Acknowledging,
            5 => DeliveryState::Shutdown,
            _ => DeliveryState::Idle,
        }
    }
}

#[derive(Debug)]
pub struct ConsumerStats {
    pub received: AtomicU64,
    pub acked: AtomicU64,
    pub decode_errors: AtomicU64,
    pub alerts: AtomicU64,
    state: AtomicU8,
}

impl ConsumerStats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
            state: AtomicU8::new(DeliveryState::Idle as u8),
        }
    }

    pub fn state(&self) -> DeliveryState {
        DeliveryState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: DeliveryState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn log_summary(&self, channel: &str) {
        tracing::info!(
            channel,
            received = self.received.load(Ordering::Relaxed),
            acked = self.acked.load(Ordering::Relaxed),
            decode_errors = self.decode_errors.load(Ordering::Relaxed),
            alerts = self.alerts.load(Ordering::Relaxed),
            "channel consumer stopped"
        );
    }
}

impl Default for ConsumerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode + evaluate for one channel. Owns that channel's window.
#[derive(Debug)]
pub struct ChannelConsumer {
    analyzer: WindowAnalyzer,
    timestamp_format: String,
    stats: Arc<ConsumerStats>,
}

impl ChannelConsumer {
    pub fn new(config: ChannelConfig, timestamp_format: impl Into<String>) -> Self {
        Self {
            analyzer: WindowAnalyzer::new(config),
            timestamp_format: timestamp_format.into(),
            stats: Arc::new(ConsumerStats::new()),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        self.analyzer.config()
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Handles one payload. Decode failures are logged and returned; they
    /// never touch the window.
    pub fn handle(&mut self, payload: &[u8]) -> Outcome {
        self.stats.set_state(DeliveryState::Decoding);
        let sample = match decode_reading(payload, &self.timestamp_format) {
            Ok(sample) => sample,
            Err(err) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    channel = %self.analyzer.config().name,
                    error = %err,
                    payload = %String::from_utf8_lossy(payload),
                    "dropping undecodable reading"
                );
                return Err(err);
            }
        };

        self.stats.set_state(DeliveryState::Evaluating);
        let decision = self.analyzer.evaluate(sample);
        if decision.is_alert() {
            self.stats.alerts.fetch_add(1, Ordering::Relaxed);
        }
        analyzer::report(self.analyzer.config(), &decision);
        Ok(decision)
    }
}

/// Pulls messages from `source` one at a time, hands each payload to
/// `handle`, and acks only after `handle` returns. Cancellation is observed
/// only while waiting for the next message. The source is closed on every
/// exit path; a transport error is returned to the caller.
pub async fn run_consumer<S, H>(
    channel: &str,
    source: &mut S,
    mut handle: H,
    stats: &ConsumerStats,
    cancel: &CancellationToken,
) -> Result<(), TransportError>
where
    S: MessageSource,
    H: FnMut(&[u8]) -> Outcome,
{
    let result = consume(channel, source, &mut handle, stats, cancel).await;
    source.close().await;
    stats.set_state(DeliveryState::Shutdown);
    result
}

async fn consume<S, H>(
    channel: &str,
    source: &mut S,
    handle: &mut H,
    stats: &ConsumerStats,
    cancel: &CancellationToken,
) -> Result<(), TransportError>
where
    S: MessageSource,
    H: FnMut(&[u8]) -> Outcome,
{
    loop {
        stats.set_state(DeliveryState::Awaiting);
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(channel, "stopped awaiting readings");
                return Ok(());
            }
            received = source.recv() => received?,
        };
        let Some(message) = received else {
            tracing::info!(channel, "reading source drained");
            return Ok(());
        };
        stats.received.fetch_add(1, Ordering::Relaxed);

        // The outcome is already logged by the handler; bad payloads are
        // acked like good ones so they cannot wedge the channel.
        let _ = handle(S::payload(&message));

        stats.set_state(DeliveryState::Acknowledging);
        source.ack(&message).await?;
        stats.acked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(channel, "reading acknowledged");
    }
}
