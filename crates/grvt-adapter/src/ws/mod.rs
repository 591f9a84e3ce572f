/*
[INPUT]:  Stream configuration, credential provider, channel subscriptions
[OUTPUT]: Sequenced real-time payloads delivered to typed handlers
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod client;
pub mod message;
pub mod registry;
pub mod state;
pub mod transport;

pub use client::{StreamClient, StreamStats};
pub use message::Envelope;
pub use registry::{Gap, HandlerResult, MatchKind, SubscribeOptions};
pub use state::{Backoff, ConnectionEvent, ConnectionState};
pub use transport::{
    Connector, FrameSink, FrameSource, InboundFrame, Transport, TungsteniteConnector,
};
