//! Push transport driven by the test body.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use offerwatch_lib::channel::{ChannelError, PushStream, PushTransport};
use offerwatch_lib::SessionContext;

enum Command {
    Frame(String),
    Drop,
}

/// Each `connect` opens a fresh stream; the test pushes frames into the
/// newest one or drops it.
pub struct MockPushTransport {
    current: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    connects: watch::Sender<usize>,
    last_bearer: Mutex<Option<String>>,
}

impl MockPushTransport {
    pub fn new() -> Arc<Self> {
        let (connects, _) = watch::channel(0);
        Arc::new(Self {
            current: Mutex::new(None),
            connects,
            last_bearer: Mutex::new(None),
        })
    }

    pub fn connects(&self) -> usize {
        *self.connects.borrow()
    }

    pub fn last_bearer(&self) -> Option<String> {
        self.last_bearer.lock().unwrap().clone()
    }

    /// Wait until at least `count` connections have been opened.
    pub async fn wait_for_connects(&self, count: usize) {
        let mut rx = self.connects.subscribe();
        rx.wait_for(|connects| *connects >= count)
            .await
            .expect("transport dropped");
    }

    pub fn push(&self, frame: impl Into<String>) {
        self.send(Command::Frame(frame.into()));
    }

    /// Simulate the server going away.
    pub fn drop_connection(&self) {
        self.send(Command::Drop);
    }

    fn send(&self, command: Command) {
        let current = self.current.lock().unwrap();
        let sender = current.as_ref().expect("no open connection");
        sender.send(command).ok();
    }
}

#[async_trait]
impl PushTransport for MockPushTransport {
    async fn connect(
        &self,
        _url: &str,
        session: &SessionContext,
    ) -> Result<Box<dyn PushStream>, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap() = Some(tx);
        *self.last_bearer.lock().unwrap() = Some(session.bearer());
        self.connects.send_modify(|connects| *connects += 1);
        Ok(Box::new(MockStream { rx }))
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Command>,
}

#[async_trait]
impl PushStream for MockStream {
    async fn next_text(&mut self) -> Option<Result<String, ChannelError>> {
        match self.rx.recv().await? {
            Command::Frame(text) => Some(Ok(text)),
            Command::Drop => None,
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
