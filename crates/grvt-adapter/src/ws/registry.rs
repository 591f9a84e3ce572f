/*
[INPUT]:  Channel subscriptions with typed handlers
[OUTPUT]: Matching entries per delivered channel, per-entry sequence tracking
[POS]:    WebSocket layer - subscription registry
[UPDATE]: When changing channel matching or sequence policy
*/

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// What subscriber callbacks return; errors are logged and counted, never propagated
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type ErasedHandler =
    Arc<dyn Fn(&Value) -> serde_json::Result<BoxFuture<'static, HandlerResult>> + Send + Sync>;

/// How a subscription channel is compared against delivered channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchKind {
    /// Delivered channel must equal the subscription channel
    Exact,
    /// Also matches `<channel>.<anything>`
    #[default]
    Prefix,
}

/// Subscribe frame params and channel matching mode
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub params: Map<String, Value>,
    pub match_kind: MatchKind,
}

impl SubscribeOptions {
    pub fn exact() -> Self {
        Self {
            match_kind: MatchKind::Exact,
            ..Self::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A detected sequence discontinuity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub expected: u64,
    pub actual: u64,
}

pub(crate) struct Entry {
    channel: String,
    match_kind: MatchKind,
    params: Map<String, Value>,
    type_name: &'static str,
    handler: ErasedHandler,
    active: AtomicBool,
    // keyed by delivered channel: a prefix entry sees several independent sequences
    sequences: Mutex<HashMap<String, u64>>,
}

impl Entry {
    pub(crate) fn new<T, F, Fut>(channel: &str, options: SubscribeOptions, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: ErasedHandler = Arc::new(move |payload: &Value| {
            let typed = T::deserialize(payload)?;
            Ok(Box::pin(handler(typed)) as BoxFuture<'static, HandlerResult>)
        });
        Self {
            channel: channel.to_string(),
            match_kind: options.match_kind,
            params: options.params,
            type_name: std::any::type_name::<T>(),
            handler,
            active: AtomicBool::new(true),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn channel(&self) -> &str {
        &self.channel
    }

    pub(crate) fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn matches_exactly(&self, delivered: &str) -> bool {
        self.channel == delivered
    }

    fn matches_prefix(&self, delivered: &str) -> bool {
        self.match_kind == MatchKind::Prefix
            && delivered
                .strip_prefix(self.channel.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Decode `payload` and build the handler future
    pub(crate) fn prepare(
        &self,
        payload: &Value,
    ) -> serde_json::Result<BoxFuture<'static, HandlerResult>> {
        (self.handler)(payload)
    }

    /// Record `sequence` for `delivered`; returns the gap if it is not the successor
    pub(crate) fn observe_sequence(&self, delivered: &str, sequence: u64) -> Option<Gap> {
        let mut sequences = self.sequences.lock();
        let previous = sequences.insert(delivered.to_string(), sequence);
        previous
            .map(|last| last.saturating_add(1))
            .filter(|expected| *expected != sequence)
            .map(|expected| Gap {
                expected,
                actual: sequence,
            })
    }

    fn reset_sequences(&self) {
        self.sequences.lock().clear();
    }
}

/// One entry per subscription channel; re-subscribing replaces the entry
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: RwLock<Vec<Arc<Entry>>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced entry, if any
    pub(crate) fn insert(&self, entry: Entry) -> Option<Arc<Entry>> {
        let entry = Arc::new(entry);
        let mut entries = self.entries.write();
        match entries.iter().position(|e| e.channel == entry.channel) {
            Some(index) => {
                let replaced = std::mem::replace(&mut entries[index], entry);
                replaced.deactivate();
                Some(replaced)
            }
            None => {
                entries.push(entry);
                None
            }
        }
    }

    pub(crate) fn remove(&self, channel: &str) -> Option<Arc<Entry>> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|e| e.channel == channel)?;
        let removed = entries.remove(index);
        removed.deactivate();
        Some(removed)
    }

    pub(crate) fn clear(&self) {
        let drained: Vec<_> = self.entries.write().drain(..).collect();
        for entry in drained {
            entry.deactivate();
        }
    }

    /// Exact matches first, then prefix matches, each in registration order
    pub(crate) fn matching(&self, delivered: &str) -> Vec<Arc<Entry>> {
        let entries = self.entries.read();
        let exact = entries.iter().filter(|e| e.matches_exactly(delivered));
        let prefix = entries.iter().filter(|e| e.matches_prefix(delivered));
        exact.chain(prefix).cloned().collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Entry>> {
        self.entries.read().clone()
    }

    pub(crate) fn channels(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.channel.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn reset_sequences(&self) {
        for entry in self.entries.read().iter() {
            entry.reset_sequences();
        }
    }
}
