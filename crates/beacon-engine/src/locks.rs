use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Asynchronous locks keyed by string.
///
/// Entries only live while somebody holds or waits for them.
#[derive(Clone, Default)]
pub struct LockMap {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl LockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for the given key, waiting for any current holder.
    pub async fn lock(&self, key: &str) -> LockGuard {
        let mutex = self.inner.lock().entry(key.to_owned()).or_default().clone();
        let guard = mutex.lock_owned().await;

        LockGuard {
            map: self.clone(),
            key: key.to_owned(),
            guard: Some(guard),
        }
    }

    /// Test if the given key is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        match self.inner.lock().get(key) {
            Some(mutex) => mutex.try_lock().is_err(),
            None => false,
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held for as long as a keyed lock is acquired.
pub struct LockGuard {
    map: LockMap,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut inner = self.map.inner.lock();

        if let Some(mutex) = inner.get(&self.key) {
            // Only the map references it, so nobody is waiting.
            if Arc::strong_count(mutex) == 1 {
                inner.remove(&self.key);
            }
        }
    }
}
