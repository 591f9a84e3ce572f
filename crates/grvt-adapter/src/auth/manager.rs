/*
[INPUT]:  API key, login endpoint, auth tunables
[OUTPUT]: Valid session credentials for REST and stream callers
[POS]:    Auth layer - single-flight login and proactive refresh
[UPDATE]: When the login flow or cookie conventions change
*/

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::credential::{Credential, CredentialState, CredentialStore};
use crate::config::{AuthConfig, ClientConfig};
use crate::error::{GrvtError, Result};

pub const LOGIN_PATH: &str = "/auth/api_key/login";

const BODY_PREVIEW_BYTES: usize = 200;

/// Source of session credentials for anything that talks to the venue
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A credential that is not within the renewal window
    async fn acquire(&self) -> Result<Credential>;

    /// Mark `rejected` stale after the venue refused it
    fn invalidate(&self, rejected: &Credential);
}

/// Exchanges the API key for a session cookie and keeps it fresh
pub struct SessionAuthenticator {
    http: Client,
    login_url: Url,
    api_key: String,
    config: AuthConfig,
    store: CredentialStore,
    logins: AtomicU64,
}

impl fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("login_url", &self.login_url.as_str())
            .field("config", &self.config)
            .field("logins", &self.logins.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionAuthenticator {
    pub fn new(api_key: impl Into<String>, rest_base: &str, config: AuthConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.login_timeout()).build()?;
        Self::with_client(http, api_key, rest_base, config)
    }

    pub fn with_client(
        http: Client,
        api_key: impl Into<String>,
        rest_base: &str,
        config: AuthConfig,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GrvtError::Config("api_key is empty".to_string()));
        }
        let login_url = Url::parse(rest_base)?.join(LOGIN_PATH)?;
        Ok(Self {
            http,
            login_url,
            api_key,
            config,
            store: CredentialStore::new(),
            logins: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            &config.endpoints().rest,
            config.auth.clone(),
        )
    }

    pub fn state(&self) -> CredentialState {
        self.store.state(Utc::now(), self.config.refresh_skew())
    }

    /// Login requests sent so far, successful or not
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a fresh credential, logging in at most once across concurrent callers
    pub async fn acquire(&self) -> Result<Credential> {
        let skew = self.config.refresh_skew();
        if let Some(credential) = self.store.fresh(Utc::now(), skew) {
            return Ok(credential);
        }

        let observed_successes = self.store.success_epoch();
        let observed_failures = self.store.failure_epoch();
        let _gate = self.store.lock_refresh().await;

        // Another caller may have refreshed while we waited
        let now = Utc::now();
        if let Some(credential) = self.store.fresh(now, skew) {
            return Ok(credential);
        }
        if let Some(credential) = self.store.refreshed_since(observed_successes, now) {
            return Ok(credential);
        }
        if let Some(err) = self.store.failure_since(observed_failures) {
            return Err(err);
        }

        let _refreshing = self.store.begin_refresh();
        match self.login().await {
            Ok(credential) => {
                self.store.store(credential.clone());
                Ok(credential)
            }
            Err(err) => {
                warn!(error = %err, "session refresh failed");
                self.store.record_failure(&err);
                Err(err)
            }
        }
    }

    /// `acquire` for synchronous callers; must not run on an async worker thread
    pub fn acquire_blocking(&self, handle: &tokio::runtime::Handle) -> Result<Credential> {
        if let Some(credential) = self.store.fresh(Utc::now(), self.config.refresh_skew()) {
            return Ok(credential);
        }
        handle.block_on(self.acquire())
    }

    /// Force a login on the next `acquire`
    pub fn invalidate_current(&self) {
        self.store.clear();
    }

    async fn login(&self) -> Result<Credential> {
        let attempt = self.logins.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(url = %self.login_url, attempt, "session refresh started");

        let timeout = self.config.login_timeout();
        let request = async {
            let response = self
                .http
                .post(self.login_url.clone())
                .json(&serde_json::json!({ "api_key": self.api_key }))
                .send()
                .await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.text().await?;
            Ok::<_, GrvtError>((status, headers, body))
        };

        let (status, headers, body) = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(GrvtError::Http(err))) if err.is_timeout() => {
                return Err(GrvtError::timeout("login", timeout));
            }
            Ok(Err(err)) => {
                return Err(GrvtError::authentication(format!("login request failed: {err}")));
            }
            Err(_) => return Err(GrvtError::timeout("login", timeout)),
        };

        self.credential_from_response(status, &headers, &body)
    }

    fn credential_from_response(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> Result<Credential> {
        if !status.is_success() {
            return Err(GrvtError::authentication(format!(
                "login rejected [{}]: {}",
                status.as_u16(),
                truncate_for_log(body, BODY_PREVIEW_BYTES)
            )));
        }

        let issued_at = Utc::now();
        let default_expiry = chrono::Duration::from_std(self.config.session_ttl())
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let credential = match pick_cookie(headers, &self.config.cookie_names, issued_at) {
            Some(cookie) => Credential::new(
                cookie.value,
                cookie.name,
                issued_at,
                cookie.expires_at.unwrap_or(default_expiry),
            ),
            None => {
                let token = token_from_body(body).ok_or_else(|| {
                    GrvtError::authentication(
                        "login succeeded but no session cookie or token was returned",
                    )
                })?;
                let cookie_name = self
                    .config
                    .cookie_names
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "gravity".to_string());
                Credential::new(token, cookie_name, issued_at, default_expiry)
            }
        };

        if credential.expires_at() <= issued_at {
            return Err(GrvtError::authentication(format!(
                "login returned an already expired session (expires {})",
                credential.expires_at().to_rfc3339()
            )));
        }
        let lifetime = credential.expires_at().signed_duration_since(issued_at);
        if !credential.is_fresh(issued_at, self.config.refresh_skew()) {
            warn!(
                cookie = credential.cookie_name(),
                expires_in_secs = lifetime.num_seconds(),
                skew_secs = self.config.refresh_skew_secs,
                "session lifetime is inside the renewal window"
            );
        }
        info!(
            cookie = credential.cookie_name(),
            expires_in_secs = lifetime.num_seconds(),
            "session authenticated"
        );
        Ok(credential)
    }
}

#[async_trait]
impl CredentialProvider for SessionAuthenticator {
    async fn acquire(&self) -> Result<Credential> {
        SessionAuthenticator::acquire(self).await
    }

    fn invalidate(&self, rejected: &Credential) {
        if self.store.invalidate(rejected) {
            debug!("session credential invalidated after rejection");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SetCookie {
    name: String,
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Parse one `Set-Cookie` header value
fn parse_set_cookie(raw: &str, now: DateTime<Utc>) -> Option<SetCookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    let value = value.trim().trim_matches('"');
    if name.is_empty() || value.is_empty() {
        return None;
    }

    let mut max_age = None;
    let mut expires = None;
    for attribute in parts {
        let Some((key, attr_value)) = attribute.split_once('=') else {
            continue;
        };
        let attr_value = attr_value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "max-age" => {
                // out-of-range values fall back to Expires or the configured TTL
                max_age = attr_value
                    .parse::<i64>()
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|age| now.checked_add_signed(age));
            }
            "expires" => {
                expires = DateTime::parse_from_rfc2822(attr_value)
                    .ok()
                    .map(|at| at.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    Some(SetCookie {
        name: name.to_string(),
        value: value.to_string(),
        // Max-Age wins over Expires
        expires_at: max_age.or(expires),
    })
}

/// Preferred names first, then any other cookie the server set
fn pick_cookie(
    headers: &HeaderMap,
    preferred: &[String],
    now: DateTime<Utc>,
) -> Option<SetCookie> {
    let cookies: Vec<SetCookie> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| parse_set_cookie(raw, now))
        .collect();

    preferred
        .iter()
        .find_map(|name| cookies.iter().find(|cookie| &cookie.name == name).cloned())
        .or_else(|| cookies.into_iter().next())
}

fn token_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let scope = value.get("result").unwrap_or(&value);
    ["cookie", "token"]
        .iter()
        .find_map(|key| scope.get(*key).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
