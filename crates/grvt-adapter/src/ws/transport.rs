/*
[INPUT]:  Stream URL and session credential
[OUTPUT]: Split text-frame sink/source over a live transport
[POS]:    WebSocket layer - transport seam (tungstenite in production, fakes in tests)
[UPDATE]: When changing handshake headers or frame handling
*/

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::auth::Credential;
use crate::error::{GrvtError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the reader sees after control frames are folded away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    /// Ping/pong or any other liveness signal with no payload for subscribers
    Heartbeat,
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
    async fn send_ping(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait FrameSource: Send {
    /// `None` once the peer has closed the transport
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>>;
}

pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens transports; the stream client owns reconnect policy
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str, credential: &Credential) -> Result<Transport>;
}

/// Production connector over tokio-tungstenite, sending the session cookie on the handshake
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str, credential: &Credential) -> Result<Transport> {
        let mut request = url
            .into_client_request()
            .map_err(|err| GrvtError::Config(format!("invalid stream url {url}: {err}")))?;
        let cookie = HeaderValue::from_str(&credential.header_value())
            .map_err(|err| GrvtError::authentication(format!("unusable session cookie: {err}")))?;
        request.headers_mut().insert(COOKIE, cookie);

        let (stream, response) = connect_async(request)
            .await
            .map_err(|err| handshake_error(url, err))?;
        debug!(url, status = response.status().as_u16(), "websocket handshake completed");

        let (write, read) = stream.split();
        Ok(Transport {
            sink: Box::new(TungsteniteSink { write }),
            source: Box::new(TungsteniteSource { read }),
        })
    }
}

fn handshake_error(url: &str, err: WsError) -> GrvtError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            let body = response
                .body()
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            GrvtError::api(status, "GET", url, body)
        }
        other => GrvtError::Transport(format!("connect {url} failed: {other}")),
    }
}

struct TungsteniteSink {
    write: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.write
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|err| GrvtError::Transport(format!("send failed: {err}")))
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.write
            .send(WsMessage::Ping(Default::default()))
            .await
            .map_err(|err| GrvtError::Transport(format!("ping failed: {err}")))
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .send(WsMessage::Close(None))
            .await
            .map_err(|err| GrvtError::Transport(format!("close failed: {err}")))
    }
}

struct TungsteniteSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for TungsteniteSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(err) => {
                    return Some(Err(GrvtError::Transport(format!("read failed: {err}"))));
                }
            };
            match message {
                WsMessage::Text(text) => return Some(Ok(InboundFrame::Text(text.to_string()))),
                WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(InboundFrame::Text(text))),
                    Err(_) => {
                        debug!(len = bytes.len(), "dropping non-utf8 binary frame");
                        continue;
                    }
                },
                WsMessage::Ping(_) | WsMessage::Pong(_) => return Some(Ok(InboundFrame::Heartbeat)),
                WsMessage::Close(frame) => {
                    debug!(?frame, "server closed stream");
                    return None;
                }
                WsMessage::Frame(_) => continue,
            }
        }
    }
}
