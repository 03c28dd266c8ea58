use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};

use super::*;

// ============================================================================
// Scripted transport
// ============================================================================

enum End {
    Drop,
    Hold,
}

enum Script {
    Refuse,
    Stall,
    Stream(Vec<&'static str>, End),
}

#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    open_streams: Arc<AtomicUsize>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn connect(
        &self,
        _url: &str,
        session: &SessionContext,
    ) -> Result<Box<dyn PushStream>, ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(session.token().to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Stream(Vec::new(), End::Hold));
        match script {
            Script::Refuse => Err(ChannelError::Connect("connection refused".to_string())),
            Script::Stall => futures::future::pending().await,
            Script::Stream(frames, end) => {
                self.open_streams.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(ScriptedStream {
                    frames: frames.into_iter().map(str::to_string).collect(),
                    end,
                    open_streams: self.open_streams.clone(),
                    closed: false,
                }))
            }
        }
    }
}

struct ScriptedStream {
    frames: VecDeque<String>,
    end: End,
    open_streams: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl PushStream for ScriptedStream {
    async fn next_text(&mut self) -> Option<Result<String, ChannelError>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }
        match self.end {
            End::Drop => None,
            End::Hold => futures::future::pending().await,
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn session(token: &str) -> SessionContext {
    SessionContext::new("alice", token)
}

fn config(reconnect: ReconnectPolicy) -> ChannelConfig {
    ChannelConfig {
        url: "ws://test/ws/notifications".to_string(),
        reconnect,
        connect_timeout: DEFAULT_CONNECT_TIMEOUT,
    }
}

fn channel_with(
    transport: Arc<ScriptedTransport>,
) -> (EventChannel, mpsc::UnboundedReceiver<NotificationEvent>) {
    channel_with_policy(transport, ReconnectPolicy::default())
}

fn channel_with_policy(
    transport: Arc<ScriptedTransport>,
    reconnect: ReconnectPolicy,
) -> (EventChannel, mpsc::UnboundedReceiver<NotificationEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = EventChannel::new(transport, Arc::new(tx), config(reconnect), None);
    (channel, rx)
}

async fn wait_for_state(rx: &mut watch::Receiver<ChannelState>, state: ChannelState) {
    timeout(Duration::from_secs(120), rx.wait_for(|current| *current == state))
        .await
        .expect("state not reached in time")
        .expect("state sender dropped");
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<NotificationEvent>) -> String {
    timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("no event in time")
        .expect("sink closed")
        .message
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn delivers_frames_in_order_and_skips_malformed_ones() {
    let transport = ScriptedTransport::new(vec![Script::Stream(
        vec![r#"{"message":"a"}"#, "garbage", "[1]", r#"{"message":"b"}"#],
        End::Hold,
    )]);
    let (channel, mut rx) = channel_with(transport.clone());

    channel.open(Some(&session("t")));

    assert_eq!(next_message(&mut rx).await, "a");
    assert_eq!(next_message(&mut rx).await, "b");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(channel.state(), ChannelState::Connected);
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_every_drop_with_fixed_delay() {
    let transport = ScriptedTransport::new(vec![
        Script::Stream(vec![r#"{"message":"first"}"#], End::Drop),
        Script::Refuse,
        Script::Refuse,
        Script::Stream(vec![r#"{"message":"second"}"#], End::Hold),
    ]);
    let (channel, mut rx) = channel_with(transport.clone());
    let started = Instant::now();

    channel.open(Some(&session("t")));
    assert_eq!(next_message(&mut rx).await, "first");
    assert_eq!(next_message(&mut rx).await, "second");

    assert_eq!(transport.connects(), 4);
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(channel.state(), ChannelState::Connected);
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_reconnect() {
    let transport = ScriptedTransport::new(vec![Script::Stream(Vec::new(), End::Drop)]);
    let (channel, _rx) = channel_with(transport.clone());
    let mut state = channel.subscribe_state();

    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Reconnecting).await;

    channel.close();
    assert_eq!(channel.state(), ChannelState::Idle);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(channel.state(), ChannelState::Idle);
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_closes_live_stream() {
    let transport = ScriptedTransport::new(Vec::new());
    let (channel, _rx) = channel_with(transport.clone());
    let mut state = channel.subscribe_state();

    channel.close();
    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Connected).await;
    assert_eq!(transport.open_streams(), 1);

    channel.close();
    channel.close();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(transport.open_streams(), 0);
    assert_eq!(channel.state(), ChannelState::Idle);
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn reopen_replaces_previous_connection() {
    let transport = ScriptedTransport::new(Vec::new());
    let (channel, _rx) = channel_with(transport.clone());
    let mut state = channel.subscribe_state();

    channel.open(Some(&session("old-token")));
    wait_for_state(&mut state, ChannelState::Connected).await;
    channel.open(Some(&session("new-token")));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(transport.open_streams(), 1);
    assert_eq!(
        transport.tokens.lock().unwrap().last().map(String::as_str),
        Some("new-token")
    );
    assert_eq!(channel.state(), ChannelState::Connected);
}

#[tokio::test(start_paused = true)]
async fn missing_session_closes_and_stays_closed() {
    let transport = ScriptedTransport::new(vec![Script::Stream(Vec::new(), End::Drop)]);
    let (channel, _rx) = channel_with(transport.clone());
    let mut state = channel.subscribe_state();

    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Reconnecting).await;

    channel.open(None);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(channel.state(), ChannelState::Idle);
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_channel_stops_task() {
    let transport = ScriptedTransport::new(Vec::new());
    let (channel, _rx) = channel_with(transport.clone());
    let mut state = channel.subscribe_state();

    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Connected).await;
    drop(channel);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(transport.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_published_on_the_bus() {
    let transport = ScriptedTransport::new(Vec::new());
    let bus = Arc::new(EventBus::new());
    let mut events = bus.subscribe();
    let (tx, _rx) = mpsc::unbounded_channel();
    let channel = EventChannel::new(
        transport,
        Arc::new(tx),
        config(ReconnectPolicy::default()),
        Some(bus.clone()),
    );
    let mut state = channel.subscribe_state();

    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Connected).await;
    channel.close();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.event_type, EVENT_CHANNEL_STATE_CHANGED);
        seen.push(event.payload["state"].as_str().unwrap().to_string());
    }
    assert_eq!(seen, vec!["connecting", "connected", "idle"]);
}

#[tokio::test(start_paused = true)]
async fn stalled_handshake_times_out_and_retries() {
    let transport = ScriptedTransport::new(vec![
        Script::Stall,
        Script::Stream(vec![r#"{"message":"after stall"}"#], End::Hold),
    ]);
    let (channel, mut rx) = channel_with(transport.clone());
    let mut state = channel.subscribe_state();
    let started = Instant::now();

    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Reconnecting).await;
    assert!(started.elapsed() >= DEFAULT_CONNECT_TIMEOUT);

    assert_eq!(next_message(&mut rx).await, "after stall");
    assert_eq!(transport.connects(), 2);
    assert!(started.elapsed() >= DEFAULT_CONNECT_TIMEOUT + DEFAULT_RECONNECT_DELAY);
    assert_eq!(channel.state(), ChannelState::Connected);
}

#[tokio::test(start_paused = true)]
async fn zero_reconnect_delay_is_floored() {
    let transport = ScriptedTransport::new((0..1000).map(|_| Script::Refuse).collect());
    let (channel, _rx) =
        channel_with_policy(transport.clone(), ReconnectPolicy::Fixed(Duration::ZERO));

    channel.open(Some(&session("t")));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let connects = transport.connects();
    assert!(connects >= 2, "expected retries, got {connects}");
    assert!(connects <= 11, "retried {connects} times in one second");
    channel.close();
}

#[tokio::test(start_paused = true)]
async fn reopen_after_close_reaches_connected() {
    let transport = ScriptedTransport::new(Vec::new());
    let (channel, _rx) = channel_with(transport.clone());
    let mut state = channel.subscribe_state();

    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Connected).await;
    channel.close();
    assert_eq!(channel.state(), ChannelState::Idle);

    channel.open(Some(&session("t")));
    wait_for_state(&mut state, ChannelState::Connected).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.open_streams(), 1);
}
