use crate::core::errors::ExchangeError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// Push callback: receives the topic and the full pushed document
pub type Listener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Outcome delivered to a pending waiter
pub type WaiterResult = Result<Value, ExchangeError>;

/// Durable topic -> listener map, replayed after every reconnect
#[derive(Default)]
pub struct SubscriptionRegistry {
    listeners: RwLock<HashMap<String, Listener>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `listener` to `topic`, replacing any previous listener
    pub async fn insert(&self, topic: &str, listener: Listener) {
        self.listeners
            .write()
            .await
            .insert(topic.to_string(), listener);
    }

    /// Returns true when the topic was registered
    pub async fn remove(&self, topic: &str) -> bool {
        self.listeners.write().await.remove(topic).is_some()
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.listeners.read().await.contains_key(topic)
    }

    pub async fn get(&self, topic: &str) -> Option<Listener> {
        self.listeners.read().await.get(topic).cloned()
    }

    /// Snapshot of registered topics, sorted for a deterministic replay order
    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.listeners.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub async fn len(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listeners.read().await.is_empty()
    }
}

/// Transient key -> single-shot waiter map
///
/// One inbound frame wakes exactly one blocked caller. A key can have at most
/// one waiter at a time.
#[derive(Default)]
pub struct CorrelationTable {
    waiters: Mutex<HashMap<String, oneshot::Sender<WaiterResult>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the waiter for `key`. Must happen before the triggering frame is sent.
    pub async fn register(&self, key: &str) -> Result<oneshot::Receiver<WaiterResult>, ExchangeError> {
        let mut waiters = self.waiters.lock().await;
        if waiters.contains_key(key) {
            return Err(ExchangeError::InvalidParameters(format!(
                "a call for '{}' is already pending",
                key
            )));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(key.to_string(), tx);
        Ok(rx)
    }

    /// Wake the waiter for `key`. Returns false when nobody was waiting.
    pub async fn fulfil(&self, key: &str, result: WaiterResult) -> bool {
        let Some(tx) = self.waiters.lock().await.remove(key) else {
            debug!("No pending waiter for '{}'", key);
            return false;
        };
        tx.send(result).is_ok()
    }

    /// Drop the waiter for `key` without waking it
    pub async fn cancel(&self, key: &str) {
        self.waiters.lock().await.remove(key);
    }

    /// Wake every waiter with the error produced by `error`
    pub async fn fail_all(&self, error: impl Fn() -> ExchangeError) {
        let drained: Vec<_> = self.waiters.lock().await.drain().collect();
        for (key, tx) in drained {
            debug!("Failing pending waiter for '{}'", key);
            let _ = tx.send(Err(error()));
        }
    }

    pub async fn is_pending(&self, key: &str) -> bool {
        self.waiters.lock().await.contains_key(key)
    }
}

/// Per-key mutual exclusion for subscribe/request issuance
///
/// An entry lives only while some caller holds or waits for its lock.
#[derive(Default)]
pub struct KeyedLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held lock for one key; releasing the last holder prunes the entry
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // the owned guard keeps one reference until it is released
        self.guard.take();
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
