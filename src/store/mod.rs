//! Durable key/value storage for the database image.
//!
//! The session keeps one blob, the SQLite file image, under a fixed key in a
//! fixed store. Backends implement [`BlobStore`]; the [`Persister`] sits on
//! top and decides when and how often the image is written.
//!
//! # Submodules
//!
//! - [`file`] - Directory-backed store with atomic writes
//! - [`memory`] - In-process store for tests and ephemeral sessions
//! - [`queue`] - Persist request state machine
//! - [`persist`] - Debounced, coordinated image writer

pub mod file;
pub mod memory;
pub mod persist;
pub mod queue;

pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;
pub use persist::{DatabaseRef, Persister};
pub use queue::{PersistPhase, PersistQueue};

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Namespace directory that groups everything the application stores.
pub const NAMESPACE: &str = "kanji-dictionary";

/// Store inside the namespace that holds the database image.
pub const STORE_NAME: &str = "database";

/// Key of the database image within the store.
pub const DATABASE_KEY: &str = "db";

/// A durable key/value store for binary blobs.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Read a blob. A missing key is `Ok(None)`, not an error.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a blob, replacing any previous value.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Hand a blob off for writing without waiting for the outcome.
    ///
    /// Used on the way out of the process, where nothing can be awaited.
    /// The default spawns [`put`](Self::put) on the current runtime and
    /// only logs failures. Backends that can write synchronously should
    /// override it.
    fn put_best_effort(self: Arc<Self>, key: &str, bytes: Vec<u8>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key, "No runtime available, dropping best-effort write");
            return;
        };
        let key = key.to_string();
        handle.spawn(async move {
            if let Err(e) = self.put(&key, bytes).await {
                warn!(key, error = %e, "Best-effort write failed");
            }
        });
    }

    /// Human-readable location, for status output.
    fn describe(&self) -> String;
}
