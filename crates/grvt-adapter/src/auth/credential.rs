/*
[INPUT]:  Session tokens from the login endpoint and their expiry
[OUTPUT]: Credential values and a thread-safe single-refresher store
[POS]:    Auth layer - credential lifecycle storage
[UPDATE]: When changing storage strategy or freshness rules
*/

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::GrvtError;

/// Session credential handed to REST and stream callers.
///
/// Callers only ever attach it; how it travels is decided by [`Credential::header_value`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    cookie_name: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        token: impl Into<String>,
        cookie_name: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            cookie_name: cookie_name.into(),
            issued_at,
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `Cookie` header value, e.g. `gravity=abc`
    pub fn header_value(&self) -> String {
        format!("{}={}", self.cookie_name, self.token)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Usable and outside the renewal window
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let skew = chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::MAX);
        match self.expires_at.checked_sub_signed(skew) {
            Some(renew_at) => now < renew_at,
            None => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("cookie_name", &self.cookie_name)
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Absent,
    Fresh,
    Stale,
    Refreshing,
}

/// Last failed refresh, kept so every waiter sees the same outcome
#[derive(Debug, Clone)]
enum Failure {
    Timeout { operation: String, millis: u64 },
    Rejected(String),
}

impl Failure {
    fn from_error(err: &GrvtError) -> Self {
        match err {
            GrvtError::Timeout { operation, millis } => Failure::Timeout {
                operation: operation.clone(),
                millis: *millis,
            },
            GrvtError::Authentication { message } => Failure::Rejected(message.clone()),
            other => Failure::Rejected(other.to_string()),
        }
    }

    fn to_error(&self) -> GrvtError {
        match self {
            Failure::Timeout { operation, millis } => GrvtError::Timeout {
                operation: operation.clone(),
                millis: *millis,
            },
            Failure::Rejected(message) => GrvtError::authentication(message.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    credential: Option<Credential>,
    refreshing: bool,
    success_epoch: u64,
    failure_epoch: u64,
    last_failure: Option<Failure>,
}

/// Current credential plus the gate that admits one refresher at a time
#[derive(Debug, Default)]
pub struct CredentialStore {
    slot: RwLock<Slot>,
    refresh_gate: Mutex<()>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, now: DateTime<Utc>, skew: Duration) -> CredentialState {
        let slot = self.slot.read();
        if slot.refreshing {
            return CredentialState::Refreshing;
        }
        match &slot.credential {
            None => CredentialState::Absent,
            Some(credential) if credential.is_fresh(now, skew) => CredentialState::Fresh,
            Some(_) => CredentialState::Stale,
        }
    }

    pub fn current(&self) -> Option<Credential> {
        self.slot.read().credential.clone()
    }

    /// The stored credential if it is outside the renewal window
    pub fn fresh(&self, now: DateTime<Utc>, skew: Duration) -> Option<Credential> {
        self.slot
            .read()
            .credential
            .as_ref()
            .filter(|credential| credential.is_fresh(now, skew))
            .cloned()
    }

    /// Drop `rejected` if it is still the stored credential; returns whether it was dropped
    pub fn invalidate(&self, rejected: &Credential) -> bool {
        let mut slot = self.slot.write();
        if slot.credential.as_ref() == Some(rejected) {
            slot.credential = None;
            return true;
        }
        false
    }

    pub fn clear(&self) {
        self.slot.write().credential = None;
    }

    pub(crate) fn success_epoch(&self) -> u64 {
        self.slot.read().success_epoch
    }

    /// The credential stored by a refresh completed after `observed_epoch`, while still unexpired
    ///
    /// Waiters of one flight share its credential even when it is already inside the renewal window.
    pub(crate) fn refreshed_since(
        &self,
        observed_epoch: u64,
        now: DateTime<Utc>,
    ) -> Option<Credential> {
        let slot = self.slot.read();
        if slot.success_epoch <= observed_epoch {
            return None;
        }
        slot.credential
            .as_ref()
            .filter(|credential| !credential.is_expired(now))
            .cloned()
    }

    pub(crate) fn failure_epoch(&self) -> u64 {
        self.slot.read().failure_epoch
    }

    /// The failure recorded after `observed_epoch`, if any
    pub(crate) fn failure_since(&self, observed_epoch: u64) -> Option<GrvtError> {
        let slot = self.slot.read();
        if slot.failure_epoch > observed_epoch {
            return slot.last_failure.as_ref().map(Failure::to_error);
        }
        None
    }

    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_gate.lock().await
    }

    /// Mark a refresh in flight; the flag clears when the guard drops
    pub(crate) fn begin_refresh(&self) -> RefreshGuard<'_> {
        self.slot.write().refreshing = true;
        RefreshGuard { store: self }
    }

    pub(crate) fn store(&self, credential: Credential) {
        let mut slot = self.slot.write();
        slot.credential = Some(credential);
        slot.success_epoch += 1;
        slot.last_failure = None;
    }

    pub(crate) fn record_failure(&self, err: &GrvtError) {
        let mut slot = self.slot.write();
        slot.credential = None;
        slot.failure_epoch += 1;
        slot.last_failure = Some(Failure::from_error(err));
    }
}

pub(crate) struct RefreshGuard<'a> {
    store: &'a CredentialStore,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.store.slot.write().refreshing = false;
    }
}
