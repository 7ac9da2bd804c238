//! Rendezvous store between base and moderated requests.
//!
//! A base request stores the storyteller's turn under the conversation key; a
//! moderated request for the same conversation state, arriving independently,
//! waits for that entry and takes it. A taken entry is gone: every moderated
//! request needs its own base write. Entries nobody takes expire after a
//! fixed TTL.
//!
//! Waiting wakes on every write and also re-checks at a coarse poll interval,
//! so a writer that lands between the check and the wait is never missed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default bound on how long a moderated request waits for its base turn.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between re-checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Deadline offset used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendezvousError {
    #[error("No entry for '{key}' appeared within {waited:?}")]
    Timeout { key: String, waited: Duration },
}

/// Time source for entry ages.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by the tokio timer (follows paused time in tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: Instant,
}

/// Keyed, TTL-bounded store shared by concurrent requests.
pub struct RendezvousStore<V = String> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    written: Notify,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<V: Clone> RendezvousStore<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            written: Notify::new(),
            clock,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace the entry for `key`, resetting its age.
    ///
    /// Expired entries for other keys are swept on the way.
    pub fn put(&self, key: &str, value: impl Into<V>) {
        let now = self.clock.now();
        let swept = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|_, e| now.saturating_duration_since(e.created_at) <= self.ttl);
            let swept = before - entries.len();
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.into(),
                    created_at: now,
                },
            );
            swept
        };

        self.written.notify_waiters();
        tracing::debug!(key, swept, "rendezvous entry stored");
    }

    /// Value for `key` if present and within the store TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_fresh(key, self.ttl)
    }

    /// Value for `key` if present and no older than `max_age`.
    ///
    /// An entry older than `max_age` is deleted.
    pub fn get_fresh(&self, key: &str, max_age: Duration) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let age = now.saturating_duration_since(entries.get(key)?.created_at);
        if age > max_age {
            entries.remove(key);
            tracing::debug!(key, ?age, "rendezvous entry expired");
            return None;
        }

        entries.get(key).map(|e| e.value.clone())
    }

    /// Remove and return the value for `key` if it is within the store TTL.
    ///
    /// Of two concurrent takers of one entry, exactly one gets it.
    pub fn take(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entry = self.entries.lock().remove(key)?;

        let age = now.saturating_duration_since(entry.created_at);
        if age > self.ttl {
            tracing::debug!(key, ?age, "rendezvous entry expired");
            return None;
        }
        Some(entry.value)
    }

    /// Wait until `key` has a fresh value, or until `timeout` elapses.
    ///
    /// The entry stays in the store.
    pub async fn wait_for(
        &self,
        key: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<V, RendezvousError> {
        self.wait_with(key, timeout, poll_interval, Self::get).await
    }

    /// Wait until `key` has a fresh value and take it out of the store.
    pub async fn wait_for_take(
        &self,
        key: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<V, RendezvousError> {
        self.wait_with(key, timeout, poll_interval, Self::take).await
    }

    async fn wait_with(
        &self,
        key: &str,
        timeout: Duration,
        poll_interval: Duration,
        read: fn(&Self, &str) -> Option<V>,
    ) -> Result<V, RendezvousError> {
        let start = Instant::now();
        let deadline = start
            .checked_add(timeout)
            .unwrap_or_else(|| start + FAR_FUTURE);

        loop {
            let notified = self.written.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = read(self, key) {
                return Ok(value);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(key, ?timeout, "rendezvous wait timed out");
                return Err(RendezvousError::Timeout {
                    key: key.to_string(),
                    waited: timeout,
                });
            }

            let nap = poll_interval.min(deadline - now);
            let _ = tokio::time::timeout(nap, notified).await;
        }
    }

    /// Delete every entry older than `max_age`; returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.created_at) <= max_age);
        before - entries.len()
    }

    /// Remove the entry for `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.lock().remove(key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<V: Clone> Default for RendezvousStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V: Clone> std::fmt::Debug for RendezvousStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousStore")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
