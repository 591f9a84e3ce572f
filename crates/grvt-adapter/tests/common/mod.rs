/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and in-memory stream transport
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for grvt-adapter tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use grvt_adapter::ws::{Connector, FrameSink, FrameSource, InboundFrame, Transport};
use grvt_adapter::{
    AuthConfig, Credential, CredentialProvider, GrvtError, Order, OrderLeg, OrderMetadata, Result,
    TimeInForce,
};
use serde_json::Value;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Hardhat account #0
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const TEST_INSTRUMENT: &str = "0x030501";
pub const SESSION_COOKIE: &str = "gravity=session-token";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Login endpoint answering with a `gravity` session cookie
pub fn login_mock(token: &str) -> Mock {
    Mock::given(method("POST"))
        .and(path("/auth/api_key/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("gravity={token}; Max-Age=3600; Path=/").as_str())
                .set_body_json(serde_json::json!({"status": "success"})),
        )
}

pub fn fast_auth_config() -> AuthConfig {
    AuthConfig {
        login_timeout_ms: 2_000,
        ..AuthConfig::default()
    }
}

pub fn sample_order(client_order_id: u64) -> Order {
    let leg = OrderLeg::new(TEST_INSTRUMENT, "0.01", "65038.1", true).expect("leg");
    let metadata = OrderMetadata::new(client_order_id, 1_700_000_000_000_000_000).expect("metadata");
    Order::new(
        42,
        TimeInForce::GoodTillTime,
        1_800_000_000_000_000_000,
        vec![leg],
        metadata,
    )
    .expect("order")
}

/// Credential provider that never talks to the network
#[derive(Default)]
pub struct StaticCredentials {
    pub acquired: AtomicUsize,
    pub invalidated: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn acquire(&self) -> Result<Credential> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        Ok(Credential::new(
            "session-token",
            "gravity",
            now,
            now + chrono::Duration::hours(1),
        ))
    }

    fn invalidate(&self, _rejected: &Credential) {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
    }
}

/// The test's side of one fake stream connection
pub struct ServerEnd {
    pub cookie: String,
    sent_by_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<InboundFrame>>,
}

impl ServerEnd {
    pub fn push(&self, frame: Value) {
        self.push_raw(frame.to_string());
    }

    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Ok(InboundFrame::Text(text.into())));
    }

    pub fn push_error(&self, message: &str) {
        let _ = self
            .to_client
            .send(Err(GrvtError::Transport(message.to_string())));
    }

    /// Next frame the client wrote, parsed as JSON
    pub async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(2), self.sent_by_client.recv())
            .await
            .expect("client sent nothing")
            .expect("client transport dropped");
        serde_json::from_str(&text).expect("client frame is json")
    }

    pub fn try_next_sent(&mut self) -> Option<Value> {
        self.sent_by_client
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("client frame is json"))
    }
}

/// Connector handing each connection's server end to the test
pub struct FakeConnector {
    sessions: mpsc::UnboundedSender<ServerEnd>,
    pub connects: AtomicUsize,
    refuse_remaining: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                sessions,
                connects: AtomicUsize::new(0),
                refuse_remaining: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    pub fn refuse_next(&self, count: usize) {
        self.refuse_remaining.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str, credential: &Credential) -> Result<Transport> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(GrvtError::Transport(format!("connection to {url} refused")));
        }

        let (client_tx, sent_by_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let server = ServerEnd {
            cookie: credential.header_value(),
            sent_by_client,
            to_client,
        };
        self.sessions
            .send(server)
            .map_err(|_| GrvtError::Transport("test dropped the session receiver".to_string()))?;

        Ok(Transport {
            sink: Box::new(FakeSink { tx: client_tx }),
            source: Box::new(FakeSource { rx: client_rx }),
        })
    }
}

struct FakeSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| GrvtError::Transport("server end dropped".to_string()))
    }

    async fn send_ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct FakeSource {
    rx: mpsc::UnboundedReceiver<Result<InboundFrame>>,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        self.rx.recv().await
    }
}

pub async fn next_session(sessions: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(Duration::from_secs(2), sessions.recv())
        .await
        .expect("client did not connect")
        .expect("connector dropped")
}

pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("nothing delivered")
        .expect("channel closed")
}
