/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public GRVT adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod signing;
pub mod types;
pub mod ws;

pub use client::GrvtClient;

pub use config::{AuthConfig, ClientConfig, Endpoints, Environment, RestConfig, StreamConfig};

pub use error::{GrvtError, Result};

// Re-export commonly used types from auth
pub use auth::{Credential, CredentialProvider, CredentialState, SessionAuthenticator};

pub use http::GrvtRestClient;

pub use signing::{OrderSigner, SigningDomain, recover_signer, sign_order};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionState,
    HandlerResult,
    MatchKind,
    StreamClient,
    StreamStats,
    SubscribeOptions,
};
