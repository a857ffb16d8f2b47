use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::gateway::{FillConnection, FillMessage, FillTransport};
use crate::models::FillEvent;
use crate::retry::BackoffPolicy;
use crate::services::notifier::NotificationSink;

/// Lifecycle of a fill subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Subscribed,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted. Terminal.
    Failed,
    /// Unsubscribed by the owner. Terminal.
    Closed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Failed | StreamState::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Disconnected => "disconnected",
            StreamState::Connecting => "connecting",
            StreamState::Subscribed => "subscribed",
            StreamState::Reconnecting { .. } => "reconnecting",
            StreamState::Failed => "failed",
            StreamState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FillStreamError {
    #[error("fill stream gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("fill stream task aborted: {0}")]
    TaskAborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Bounded reconnect counter. Pure: no timers, no I/O.
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    backoff: BackoffPolicy,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectTracker {
    pub fn new(backoff: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A connection was established and subscribed.
    pub fn on_connected(&mut self) {
        self.attempt = 0;
    }

    /// The connection closed or could not be opened.
    pub fn on_disconnect(&mut self) -> ReconnectDecision {
        if self.attempt >= self.max_attempts {
            return ReconnectDecision::GiveUp {
                attempts: self.attempt,
            };
        }
        self.attempt += 1;
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay: self.backoff.delay_for_attempt(self.attempt),
        }
    }
}

/// Consumer of decoded fills. Errors and panics are contained by the stream.
#[async_trait]
pub trait FillHandler: Send + Sync + 'static {
    async fn on_fill(&self, fill: FillEvent) -> anyhow::Result<()>;
}

/// Feed fills into the copy engine's queue, waiting while it is full.
#[async_trait]
impl FillHandler for mpsc::Sender<FillEvent> {
    async fn on_fill(&self, fill: FillEvent) -> anyhow::Result<()> {
        self.send(fill)
            .await
            .map_err(|_| anyhow::anyhow!("fill queue closed"))
    }
}

/// Subscribes to an address's fills and keeps the subscription alive.
pub struct FillStream {
    transport: Arc<dyn FillTransport>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    notifier: Arc<dyn NotificationSink>,
}

impl FillStream {
    pub fn new(
        transport: Arc<dyn FillTransport>,
        backoff: BackoffPolicy,
        max_attempts: u32,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            transport,
            backoff,
            max_attempts,
            notifier,
        }
    }

    /// Start the subscription loop in its own task.
    pub fn subscribe(&self, address: impl Into<String>, handler: Arc<dyn FillHandler>) -> FillSubscription {
        let (state_tx, state_rx) = watch::channel(StreamState::Disconnected);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let worker = StreamWorker {
            transport: self.transport.clone(),
            address: address.into(),
            handler,
            notifier: self.notifier.clone(),
            tracker: ReconnectTracker::new(self.backoff, self.max_attempts),
            state_tx,
            cancel_rx,
        };

        FillSubscription {
            cancel_tx,
            state_rx,
            task: Some(tokio::spawn(worker.run())),
            finished: None,
        }
    }
}

/// Owner's handle on a running subscription.
pub struct FillSubscription {
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<StreamState>,
    task: Option<JoinHandle<Result<(), FillStreamError>>>,
    finished: Option<Result<(), FillStreamError>>,
}

impl FillSubscription {
    /// Close the connection and cancel any pending reconnect.
    pub fn unsubscribe(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Wait for the subscription to end. `Ok` after unsubscribe, `Err` when
    /// reconnects were exhausted. Safe to call again after it returned.
    pub async fn join(&mut self) -> Result<(), FillStreamError> {
        if let Some(task) = self.task.as_mut() {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(FillStreamError::TaskAborted(e.to_string())),
            };
            self.task = None;
            self.finished = Some(result);
        }
        self.finished.clone().unwrap_or(Ok(()))
    }
}

struct StreamWorker {
    transport: Arc<dyn FillTransport>,
    address: String,
    handler: Arc<dyn FillHandler>,
    notifier: Arc<dyn NotificationSink>,
    tracker: ReconnectTracker,
    state_tx: watch::Sender<StreamState>,
    cancel_rx: watch::Receiver<bool>,
}

impl StreamWorker {
    async fn run(mut self) -> Result<(), FillStreamError> {
        loop {
            self.state_tx.send_replace(StreamState::Connecting);
            tracing::info!(address = %self.address, attempt = self.tracker.attempt(), "Connecting fill stream");

            let mut cancel = self.cancel_rx.clone();
            let connected = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    self.close();
                    return Ok(());
                }
                result = self.transport.connect(&self.address) => result,
            };

            match connected {
                Ok(mut conn) => {
                    self.tracker.on_connected();
                    self.state_tx.send_replace(StreamState::Subscribed);
                    tracing::info!(address = %self.address, "Fill stream subscribed");

                    if self.pump(conn.as_mut()).await {
                        conn.close().await;
                        self.close();
                        return Ok(());
                    }
                    tracing::warn!(address = %self.address, "Fill stream disconnected");
                }
                Err(e) => {
                    tracing::error!(address = %self.address, error = %e, "Fill stream connection failed");
                }
            }

            match self.tracker.on_disconnect() {
                ReconnectDecision::Retry { attempt, delay } => {
                    metrics::counter!("ws_reconnects_total").increment(1);
                    self.state_tx.send_replace(StreamState::Reconnecting { attempt });
                    tracing::info!(
                        attempt,
                        max_attempts = self.tracker.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting fill stream..."
                    );

                    let mut cancel = self.cancel_rx.clone();
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => {
                            self.close();
                            return Ok(());
                        }
                        _ = sleep(delay) => {}
                    }
                }
                ReconnectDecision::GiveUp { attempts } => {
                    self.state_tx.send_replace(StreamState::Failed);
                    tracing::error!(
                        address = %self.address,
                        attempts,
                        "Fill stream reconnect attempts exhausted"
                    );
                    let mut context = BTreeMap::new();
                    context.insert("address".to_string(), self.address.clone());
                    context.insert("attempts".to_string(), attempts.to_string());
                    self.notifier
                        .error("Fill stream failed permanently", &context)
                        .await;
                    return Err(FillStreamError::ReconnectExhausted { attempts });
                }
            }
        }
    }

    /// Read frames until the connection closes (`false`) or the owner
    /// unsubscribes (`true`). Unsubscribing also interrupts a delivery that
    /// is waiting on a full queue; the pending fills are dropped.
    async fn pump(&self, conn: &mut dyn FillConnection) -> bool {
        let mut cancel = self.cancel_rx.clone();
        loop {
            let raw = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return true,
                frame = conn.recv() => match frame {
                    Some(raw) => raw,
                    None => return false,
                },
            };

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    tracing::info!("Unsubscribed during delivery, dropping pending fills");
                    return true;
                }
                _ = self.dispatch(&raw) => {}
            }
        }
    }

    async fn dispatch(&self, raw: &str) {
        match self.transport.decode(raw) {
            Ok(FillMessage::Fills(fills)) => {
                for fill in fills {
                    metrics::counter!("fills_received_total").increment(1);
                    tracing::debug!(%fill, "Fill received");
                    self.deliver(fill).await;
                }
            }
            Ok(FillMessage::Snapshot(count)) => {
                metrics::counter!("fills_snapshot_skipped_total").increment(count as u64);
                tracing::info!(count, "Skipping fill snapshot");
            }
            Ok(FillMessage::Ignored) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable fill message");
            }
        }
    }

    async fn deliver(&self, fill: FillEvent) {
        let coin = fill.coin.clone();
        match AssertUnwindSafe(self.handler.on_fill(fill)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(coin = %coin, error = %e, "Fill handler failed");
            }
            Err(_) => {
                tracing::error!(coin = %coin, "Fill handler panicked");
            }
        }
    }

    fn close(&self) {
        self.state_tx.send_replace(StreamState::Closed);
        tracing::info!(address = %self.address, "Fill stream closed");
    }
}

/// Resolves once the owner asked to stop or dropped its handle.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
