//! In-process blob store.
//!
//! Nothing survives the process. Besides ephemeral sessions, this is the
//! store the persistence tests run against: it records every write, can be
//! told to fail, and can hold writes in flight until released.

use super::BlobStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

/// A [`BlobStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<Vec<Vec<u8>>>,
    attempts: AtomicUsize,
    failures: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds one blob.
    #[must_use]
    pub fn with_blob(key: &str, bytes: Vec<u8>) -> Self {
        let store = Self::default();
        lock(&store.blobs).insert(key.to_string(), bytes);
        store
    }

    /// Current value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(key).cloned()
    }

    /// Every successfully written blob, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.writes).clone()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    /// Number of async writes started, including failed and held ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make the next `count` async writes fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Park async writes until [`release_writes`](Self::release_writes).
    pub fn hold_writes(&self) {
        *lock(&self.gate) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held writes, and all later ones, through.
    pub fn release_writes(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.close();
        }
    }

    fn commit(&self, key: &str, bytes: Vec<u8>) {
        lock(&self.writes).push(bytes.clone());
        lock(&self.blobs).insert(key.to_string(), bytes);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            // Closed on release; the error just means "go ahead".
            let _ = gate.acquire().await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Io(std::io::Error::other("injected write failure")));
        }

        self.commit(key, bytes);
        Ok(())
    }

    fn put_best_effort(self: Arc<Self>, key: &str, bytes: Vec<u8>) {
        self.commit(key, bytes);
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
