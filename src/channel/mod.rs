//! Push-notification channel with owned reconnection.
//!
//! `EventChannel` keeps exactly one logical subscription to the server's
//! notification stream:
//! - `open` force-closes any previous attempt before starting a new one
//! - an unexpected drop is retried after the policy delay, forever
//! - `close` cancels the connection task and any pending retry; it is
//!   idempotent and leaves the channel `Idle`
//!
//! Each connection task holds a `CancellationToken` and a generation number.
//! Cancelling the token stops the task at its next suspension point; the
//! generation keeps a superseded task from overwriting the state of its
//! successor.

mod reconnect;
mod transport;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub use reconnect::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY, MIN_RECONNECT_DELAY};
pub use transport::{PushStream, PushTransport, WsTransport};

use crate::bus::event_types::{CATEGORY_CHANNEL, EVENT_CHANNEL_STATE_CHANGED};
use crate::bus::EventBus;
use crate::notifications::{parse_frame, NotificationEvent};
use crate::session::SessionContext;

/// Default deadline for a single connect attempt, handshake included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Lifecycle of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "idle"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Connected => write!(f, "connected"),
            ChannelState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Receiver of parsed push events, called in receipt order.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: NotificationEvent);
}

impl EventSink for mpsc::UnboundedSender<NotificationEvent> {
    fn deliver(&self, event: NotificationEvent) {
        if self.send(event).is_err() {
            trace!("notification receiver dropped");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Full push endpoint, e.g. `wss://host/ws/notifications`.
    pub url: String,
    pub reconnect: ReconnectPolicy,
    /// An attempt still pending after this long counts as a failed connect.
    /// Zero means [`DEFAULT_CONNECT_TIMEOUT`].
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    fn connect_deadline(&self) -> Duration {
        if self.connect_timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            self.connect_timeout
        }
    }
}

struct ChannelInner {
    transport: Arc<dyn PushTransport>,
    sink: Arc<dyn EventSink>,
    config: ChannelConfig,
    bus: Option<Arc<EventBus>>,
    state_tx: watch::Sender<ChannelState>,
    generation: AtomicU64,
    connect_attempts: AtomicU64,
}

impl ChannelInner {
    /// Apply `state` only if `generation` still owns the channel. The check
    /// runs under the watch lock so it cannot interleave with `close`.
    fn transition(&self, generation: u64, state: ChannelState) {
        let mut previous = state;
        let changed = self.state_tx.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            if *current == state {
                return false;
            }
            previous = *current;
            *current = state;
            true
        });
        if !changed {
            return;
        }
        debug!(from = %previous, to = %state, "notification channel state");
        if let Some(bus) = &self.bus {
            bus.emit(
                CATEGORY_CHANNEL,
                EVENT_CHANNEL_STATE_CHANGED,
                json!({ "state": state, "previous": previous }),
            );
        }
    }
}

struct ActiveConnection {
    cancel: CancellationToken,
}

pub struct EventChannel {
    inner: Arc<ChannelInner>,
    active: Mutex<Option<ActiveConnection>>,
}

impl EventChannel {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        sink: Arc<dyn EventSink>,
        config: ChannelConfig,
        bus: Option<Arc<EventBus>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Idle);
        Self {
            inner: Arc::new(ChannelInner {
                transport,
                sink,
                config,
                bus,
                state_tx,
                generation: AtomicU64::new(0),
                connect_attempts: AtomicU64::new(0),
            }),
            active: Mutex::new(None),
        }
    }

    /// Start (or restart) the subscription for `session`.
    ///
    /// Any previous connection task is cancelled first. With no session the
    /// channel closes and stays closed until a session is supplied again.
    /// Must be called from within a Tokio runtime.
    pub fn open(&self, session: Option<&SessionContext>) {
        let Some(session) = session else {
            info!("no session context, closing notification channel");
            self.close();
            return;
        };

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            debug!("cancelling previous notification channel task");
            previous.cancel.cancel();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        self.inner.transition(generation, ChannelState::Connecting);
        tokio::spawn(run_connection(
            self.inner.clone(),
            session.clone(),
            cancel.clone(),
            generation,
        ));
        *active = Some(ActiveConnection { cancel });
    }

    /// Tear down the subscription without re-establishing it.
    pub fn close(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
            info!("notification channel closed");
        }
        self.inner.transition(generation, ChannelState::Idle);
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state_tx.subscribe()
    }

    /// Total connection attempts since construction.
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            active.cancel.cancel();
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PumpOutcome {
    Cancelled,
    Dropped,
}

async fn run_connection(
    inner: Arc<ChannelInner>,
    session: SessionContext,
    cancel: CancellationToken,
    generation: u64,
) {
    let url = inner.config.url.clone();
    let deadline = inner.config.connect_deadline();
    let mut attempt: u32 = 0;

    loop {
        inner.transition(generation, ChannelState::Connecting);
        inner.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = timeout(deadline, inner.transport.connect(&url, &session)) => {
                result.unwrap_or_else(|_| {
                    Err(ChannelError::Connect(format!("timed out after {deadline:?}")))
                })
            }
        };

        match connected {
            Ok(mut stream) => {
                attempt = 0;
                inner.transition(generation, ChannelState::Connected);
                info!(%url, user = %session.username(), "notification channel connected");
                let outcome = pump(&inner, stream.as_mut(), &cancel).await;
                stream.close().await;
                if outcome == PumpOutcome::Cancelled {
                    break;
                }
                warn!(%url, "notification channel dropped");
            }
            Err(error) => {
                warn!(%url, %error, "notification channel connect failed");
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        inner.transition(generation, ChannelState::Reconnecting);
        let delay = inner.config.reconnect.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        info!(?delay, attempt, "reconnecting notification channel");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    debug!(generation, "notification channel task exited");
}

async fn pump(
    inner: &ChannelInner,
    stream: &mut dyn PushStream,
    cancel: &CancellationToken,
) -> PumpOutcome {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpOutcome::Cancelled,
            frame = stream.next_text() => frame,
        };

        match frame {
            Some(Ok(text)) => match parse_frame(&text) {
                Ok(event) => {
                    if cancel.is_cancelled() {
                        return PumpOutcome::Cancelled;
                    }
                    trace!(id = %event.id, "notification received");
                    inner.sink.deliver(event);
                }
                Err(error) => {
                    warn!(%error, frame_len = text.len(), "dropping malformed notification frame");
                }
            },
            Some(Err(error)) => {
                warn!(%error, "notification stream error");
                return PumpOutcome::Dropped;
            }
            None => return PumpOutcome::Dropped,
        }
    }
}
