//! Push transport abstraction and the websocket implementation.
//!
//! The channel only needs two things from a transport: a way to open an
//! authenticated stream and a way to read text frames from it. Keeping that
//! behind a trait lets tests script drops and malformed frames without a
//! server.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use super::ChannelError;
use crate::session::SessionContext;

/// Opens push streams.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open an authenticated stream to `url` on behalf of `session`.
    async fn connect(
        &self,
        url: &str,
        session: &SessionContext,
    ) -> Result<Box<dyn PushStream>, ChannelError>;
}

/// An open push stream.
#[async_trait]
pub trait PushStream: Send {
    /// Next text frame. `None` once the peer has closed the stream; control
    /// frames are handled internally and never surface here.
    async fn next_text(&mut self) -> Option<Result<String, ChannelError>>;

    /// Best-effort graceful shutdown.
    async fn close(&mut self);
}

/// Websocket transport used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        session: &SessionContext,
    ) -> Result<Box<dyn PushStream>, ChannelError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChannelError::Connect(format!("invalid push url {url}: {e}")))?;
        let bearer = HeaderValue::from_str(&session.bearer())
            .map_err(|e| ChannelError::Connect(format!("invalid bearer credential: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "websocket handshake completed");

        Ok(Box::new(WsStream { inner: stream }))
    }
}

struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushStream for WsStream {
    async fn next_text(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        debug!("ignoring non-utf8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "peer closed websocket");
                    return None;
                }
                Ok(other) => {
                    trace!(?other, "control frame");
                    continue;
                }
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            trace!("websocket close handshake failed: {e}");
        }
    }
}
