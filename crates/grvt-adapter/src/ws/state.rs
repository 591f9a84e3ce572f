/*
[INPUT]:  Connection lifecycle events
[OUTPUT]: Next connection state and reconnect delays
[POS]:    WebSocket layer - connection state machine and backoff policy
[UPDATE]: When adding states or changing reconnect policy
*/

use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::config::StreamConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `run_forever` / `start` called
    Start,
    /// Transport handshake completed
    Handshake,
    /// Connect failed, transport errored, server closed, or heartbeat expired
    TransportLost,
    /// Backoff elapsed
    RetryDue,
    /// Reconnect attempts exhausted
    GiveUp,
    /// Explicit shutdown
    Shutdown,
}

/// Transition table; `None` means the event is not valid in `state`
pub fn transition(state: ConnectionState, event: ConnectionEvent) -> Option<ConnectionState> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (state, event) {
        (S::Closed, E::Shutdown) => Some(S::Closed),
        (S::Closed, _) => None,
        (_, E::Shutdown) => Some(S::Closed),
        (S::Disconnected, E::Start) => Some(S::Connecting),
        (S::Connecting, E::Handshake) => Some(S::Connected),
        (S::Connecting | S::Connected, E::TransportLost) => Some(S::Reconnecting),
        (S::Reconnecting, E::RetryDue) => Some(S::Connecting),
        (S::Connecting | S::Reconnecting, E::GiveUp) => Some(S::Disconnected),
        _ => None,
    }
}

/// Exponential reconnect delay with a cap and random jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            base: Duration::from_millis(config.reconnect_base_delay_ms),
            max: Duration::from_millis(config.reconnect_max_delay_ms),
            jitter: Duration::from_millis(config.reconnect_jitter_ms),
        }
    }

    /// `min(base * 2^(attempt-1), max)` before jitter; attempt 1 waits `base`
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.capped_delay(attempt) + jitter
    }
}
