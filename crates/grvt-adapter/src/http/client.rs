/*
[INPUT]:  Endpoints, REST tunables, a credential provider
[OUTPUT]: JSON responses from trading and market-data hosts
[POS]:    HTTP layer - core client with retry and session handling
[UPDATE]: When adding connection options or changing retry policy
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::COOKIE;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{Credential, CredentialProvider};
use crate::config::{ClientConfig, Endpoints, RestConfig};
use crate::error::{GrvtError, Result, is_retryable_status};
use crate::types::responses::unwrap_result;

/// Which host a request goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Host {
    /// Authenticated trading host
    Trading,
    /// Public market-data host, no credential attached
    Market,
}

/// REST client for GRVT trading and market-data endpoints
pub struct GrvtRestClient {
    http: Client,
    trading_base: Url,
    market_base: Url,
    credentials: Arc<dyn CredentialProvider>,
    config: RestConfig,
}

impl fmt::Debug for GrvtRestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrvtRestClient")
            .field("trading_base", &self.trading_base.as_str())
            .field("market_base", &self.market_base.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GrvtRestClient {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        endpoints: &Endpoints,
        config: RestConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            trading_base: Url::parse(&endpoints.rest)?,
            market_base: Url::parse(&endpoints.market)?,
            credentials,
            config,
        })
    }

    pub fn from_config(config: &ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Self::new(credentials, &config.endpoints(), config.rest.clone())
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// POST to the trading host with the session cookie.
    ///
    /// A 401 invalidates the rejected credential and retries once with a fresh one.
    pub(crate) async fn post_private<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let credential = self.credentials.acquire().await?;

        let value = match self
            .send_with_retry(Host::Trading, path, &body, Some(&credential))
            .await
        {
            Err(GrvtError::Api { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                warn!(path, "session rejected, refreshing credential and retrying once");
                self.credentials.invalidate(&credential);
                let fresh = self.credentials.acquire().await?;
                self.send_with_retry(Host::Trading, path, &body, Some(&fresh))
                    .await?
            }
            other => other?,
        };

        decode(path, value)
    }

    /// POST to the public market-data host
    pub(crate) async fn post_public<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let value = self.send_with_retry(Host::Market, path, &body, None).await?;
        decode(path, value)
    }

    async fn send_with_retry(
        &self,
        host: Host,
        path: &str,
        body: &Value,
        credential: Option<&Credential>,
    ) -> Result<Value> {
        // Only retry when the request never reached the venue or the venue asked us to back off
        let should_retry = |error: &GrvtError| -> bool {
            match error {
                GrvtError::Api { status, .. } => is_retryable_status(*status),
                GrvtError::Http(err) => err.is_connect(),
                _ => false,
            }
        };

        let mut attempt: u32 = 0;
        loop {
            match self.send_once(host, path, body, credential).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.config.max_retries && should_retry(&err) => {
                    let delay = retry_delay(self.config.retry_base_delay(), attempt);
                    warn!(
                        path,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay_millis(delay),
                        error = %err,
                        "retryable REST failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(
        &self,
        host: Host,
        path: &str,
        body: &Value,
        credential: Option<&Credential>,
    ) -> Result<Value> {
        let base = match host {
            Host::Trading => &self.trading_base,
            Host::Market => &self.market_base,
        };
        let url = base.join(path)?;
        debug!(method = "POST", %url, "REST request");

        let mut builder = self.http.request(Method::POST, url).json(body);
        if let Some(credential) = credential {
            builder = builder.header(COOKIE, credential.header_value());
        }

        let response = builder.send().await.map_err(|err| self.map_transport(path, err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| self.map_transport(path, err))?;

        if !status.is_success() {
            return Err(GrvtError::api(status, "POST", path, text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn map_transport(&self, path: &str, err: reqwest::Error) -> GrvtError {
        if err.is_timeout() {
            GrvtError::timeout(format!("POST {path}"), self.config.timeout())
        } else {
            GrvtError::Http(err)
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(unwrap_result(value)).map_err(|err| {
        warn!(path, error = %err, "unexpected REST response shape");
        GrvtError::Serialization(err)
    })
}

/// `base * 2^attempt`
pub(crate) fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

fn delay_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
