/*
[INPUT]:  YAML configuration file, environment variables, caller overrides
[OUTPUT]: Validated ClientConfig with per-component tunables
[POS]:    Configuration layer - environments, endpoints, timeouts, retry policy
[UPDATE]: When adding environments or new tunables
*/

use std::path::Path;
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{GrvtError, Result};
use crate::signing::SigningDomain;

/// Environment variable consulted when the config leaves `api_key` empty
pub const API_KEY_ENV: &str = "GRVT_API_KEY";

/// GRVT deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Testnet,
    Mainnet,
}

impl Environment {
    /// EVM chain id used in the EIP-712 domain
    pub fn chain_id(self) -> u64 {
        match self {
            Environment::Testnet => 326,
            Environment::Mainnet => 325,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Environment::Testnet => "testnet",
            Environment::Mainnet => "mainnet",
        }
    }

    pub fn endpoints(self) -> Endpoints {
        match self {
            Environment::Testnet => Endpoints {
                rest: "https://trades.testnet.grvt.io".to_string(),
                market: "https://market-data.testnet.grvt.io".to_string(),
                ws_trades: "wss://trades.testnet.grvt.io/ws".to_string(),
                ws_market: "wss://market-data.testnet.grvt.io/ws".to_string(),
            },
            Environment::Mainnet => Endpoints {
                rest: "https://trades.grvt.io".to_string(),
                market: "https://market-data.grvt.io".to_string(),
                ws_trades: "wss://trades.grvt.io/ws".to_string(),
                ws_market: "wss://market-data.grvt.io/ws".to_string(),
            },
        }
    }
}

/// Base URLs for one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Trading REST base (also hosts the login endpoint)
    pub rest: String,
    /// Public market-data REST base
    pub market: String,
    /// Private trading stream
    pub ws_trades: String,
    /// Public market-data stream
    pub ws_market: String,
}

impl Endpoints {
    /// All four endpoints pointing at one test server
    pub fn single_host(http_base: &str, ws_url: &str) -> Self {
        Self {
            rest: http_base.to_string(),
            market: http_base.to_string(),
            ws_trades: ws_url.to_string(),
            ws_market: ws_url.to_string(),
        }
    }
}

/// Session authenticator tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Assumed session lifetime when the server does not state one
    pub session_ttl_secs: u64,
    /// Renew this long before expiry
    pub refresh_skew_secs: u64,
    pub login_timeout_ms: u64,
    /// Cookie names preferred when several are set; any other name is still accepted
    pub cookie_names: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 86_400,
            refresh_skew_secs: 300,
            login_timeout_ms: 10_000,
            cookie_names: vec!["gravity".to_string(), "exchange_token".to_string()],
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }
}

/// REST surface tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Retries on 429/5xx after the first attempt
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl RestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Stream client tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Connect to the public market-data stream instead of the trading stream
    pub market_data: bool,
    pub connect_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_jitter_ms: u64,
    /// 0 = unlimited
    pub max_reconnect_attempts: u32,
    /// A session that stays up this long resets the reconnect attempt counter
    pub stable_connection_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            market_data: false,
            connect_timeout_ms: 10_000,
            ping_interval_ms: 20_000,
            pong_timeout_ms: 10_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 60_000,
            reconnect_jitter_ms: 1_000,
            max_reconnect_attempts: 0,
            stable_connection_ms: 30_000,
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Never shorter than 1ms
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    /// Silence longer than this is treated as a dead transport
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1).saturating_add(self.pong_timeout_ms))
    }

    pub fn stable_connection(&self) -> Duration {
        Duration::from_millis(self.stable_connection_ms)
    }
}

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub api_key: String,
    /// Overrides the environment's endpoint table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
    /// EIP-712 `verifyingContract`; zero address unless the venue publishes one
    #[serde(default)]
    pub verifying_contract: Address,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, environment: Environment) -> Self {
        Self {
            environment,
            api_key: api_key.into(),
            endpoints: None,
            verifying_contract: Address::ZERO,
            auth: AuthConfig::default(),
            rest: RestConfig::default(),
            stream: StreamConfig::default(),
        }
    }

    /// Load configuration from a YAML file, falling back to `GRVT_API_KEY` for the key
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GrvtError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&content)?;
        if config.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                config.api_key = key;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GrvtError::Config(format!("invalid YAML config: {e}")))
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
            .clone()
            .unwrap_or_else(|| self.environment.endpoints())
    }

    pub fn chain_id(&self) -> u64 {
        self.environment.chain_id()
    }

    pub fn signing_domain(&self) -> SigningDomain {
        SigningDomain::default().with_verifying_contract(self.verifying_contract)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(GrvtError::Config(format!(
                "api_key is empty (set it in the config or via {API_KEY_ENV})"
            )));
        }
        let zero_timeouts = [
            ("auth.login_timeout_ms", self.auth.login_timeout_ms),
            ("rest.timeout_ms", self.rest.timeout_ms),
            ("stream.connect_timeout_ms", self.stream.connect_timeout_ms),
            ("stream.ping_interval_ms", self.stream.ping_interval_ms),
        ];
        if let Some((name, _)) = zero_timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(GrvtError::Config(format!("{name} must be greater than zero")));
        }
        if self.auth.refresh_skew_secs >= self.auth.session_ttl_secs {
            return Err(GrvtError::Config(
                "auth.refresh_skew_secs must be shorter than auth.session_ttl_secs".to_string(),
            ));
        }
        Ok(())
    }
}
