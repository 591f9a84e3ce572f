/*
[INPUT]:  ClientConfig
[OUTPUT]: REST surface and stream client sharing one session authenticator
[POS]:    Crate root - top-level client composition
[UPDATE]: When adding components that need the shared session
*/

use std::sync::Arc;

use tracing::info;

use crate::auth::{CredentialProvider, SessionAuthenticator};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::GrvtRestClient;
use crate::signing::OrderSigner;
use crate::ws::StreamClient;

/// Entry point: one session, one REST client, one stream
///
/// Dropping the client stops the stream loop.
pub struct GrvtClient {
    config: ClientConfig,
    authenticator: Arc<SessionAuthenticator>,
    rest: GrvtRestClient,
    stream: StreamClient,
}

impl GrvtClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let authenticator = Arc::new(SessionAuthenticator::from_config(&config)?);
        let credentials: Arc<dyn CredentialProvider> = authenticator.clone();
        let rest = GrvtRestClient::from_config(&config, credentials.clone())?;
        let stream = StreamClient::from_config(&config, credentials);
        info!(
            environment = config.environment.label(),
            stream = stream.url(),
            "grvt client initialized"
        );
        Ok(Self {
            config,
            authenticator,
            rest,
            stream,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Arc<SessionAuthenticator> {
        &self.authenticator
    }

    pub fn rest(&self) -> &GrvtRestClient {
        &self.rest
    }

    pub fn stream(&self) -> &StreamClient {
        &self.stream
    }

    /// Signer bound to this environment's chain id and domain
    pub fn order_signer(&self, private_key: &str) -> Result<OrderSigner> {
        Ok(OrderSigner::new(private_key, self.config.chain_id())?
            .with_domain(self.config.signing_domain()))
    }

    pub fn close(&self) {
        self.stream.close();
    }
}

impl Drop for GrvtClient {
    fn drop(&mut self) {
        self.close();
    }
}
