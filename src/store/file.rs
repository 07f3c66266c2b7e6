//! Directory-backed blob store.
//!
//! Layout: `<root>/<namespace>/<store>/<key>.sqlite3`. Directories are
//! created on open. Every write goes to a uniquely named temp file in the
//! same directory, is synced, then renamed over the target, so a reader
//! never observes a half-written image.

use super::BlobStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// File extension given to stored blobs.
const BLOB_EXTENSION: &str = "sqlite3";

/// A [`BlobStore`] that keeps each key in its own file.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Open (creating if needed) the store directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the directories cannot be
    /// created.
    pub fn open(root: &Path, namespace: &str, store: &str) -> Result<Self> {
        let dir = root.join(namespace).join(store);
        fs::create_dir_all(&dir).map_err(|source| Error::StoreUnavailable {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path a key is stored at.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{BLOB_EXTENSION}"))
    }

    fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::StoreUnavailable { path, source }),
        }
    }

    fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        atomic_write(&path, bytes).map_err(|source| Error::StoreUnavailable {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote blob");
        Ok(())
    }
}

/// Write bytes to `path` through a synced temp file and a rename.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map_or_else(|| "blob".into(), |n| n.to_string_lossy().into_owned());
    let temp_path = path.with_file_name(format!("{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let written = write_synced(&temp_path, bytes).and_then(|()| fs::rename(&temp_path, path));
    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.read_blob(&key))
            .await
            .map_err(|e| Error::Other(format!("blob read task failed: {e}")))?
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.write_blob(&key, &bytes))
            .await
            .map_err(|e| Error::Other(format!("blob write task failed: {e}")))?
    }

    fn put_best_effort(self: Arc<Self>, key: &str, bytes: Vec<u8>) {
        if let Err(e) = self.write_blob(key, &bytes) {
            warn!(key, error = %e, "Best-effort write failed");
        }
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}
