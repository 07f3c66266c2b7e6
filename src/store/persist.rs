//! Debounced, coordinated writer for the database image.
//!
//! Three ways to get the image onto the store, in decreasing latency:
//!
//! - [`Persister::schedule`] after every write statement. Restarts a short
//!   timer; only the last call in a burst produces a save.
//! - [`Persister::persist_immediately`] when a save must happen now and the
//!   caller can wait for it.
//! - [`Persister::persist_sync`] when the process may be gone before any
//!   future gets polled again. Exports on the spot and hands the bytes to
//!   the store's best-effort path.
//!
//! Timer-driven and immediate saves share one pipeline: a cycle exports the
//! current image and writes it. At most one cycle runs at a time, and any
//! number of requests arriving meanwhile produce exactly one trailing cycle,
//! which exports when it starts and therefore carries the newest state.

use super::BlobStore;
use super::queue::{Begin, PersistPhase, PersistQueue};
use crate::error::{Error, Result};
use crate::storage::snapshot::export_image;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Shared slot holding the live connection.
///
/// `None` before initialization completes. Import swaps the connection in
/// place, so the persister keeps exporting whatever is current.
pub type DatabaseRef = Arc<Mutex<Option<Connection>>>;

/// Outcome delivered to callers waiting on a cycle.
type CycleOutcome = std::result::Result<(), String>;

struct Waiter {
    cycle: u64,
    tx: oneshot::Sender<CycleOutcome>,
}

#[derive(Default)]
struct Coordinator {
    queue: PersistQueue,
    timer: Option<JoinHandle<()>>,
    waiters: Vec<Waiter>,
}

struct Inner {
    store: Arc<dyn BlobStore>,
    key: String,
    debounce: Duration,
    database: Mutex<Option<DatabaseRef>>,
    coordinator: Mutex<Coordinator>,
}

/// Writes the database image to a [`BlobStore`].
///
/// Cheap to clone; clones share the same queue and timer.
#[derive(Clone)]
pub struct Persister {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("key", &self.inner.key)
            .field("debounce", &self.inner.debounce)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Persister {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, key: impl Into<String>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                key: key.into(),
                debounce,
                database: Mutex::new(None),
                coordinator: Mutex::new(Coordinator::default()),
            }),
        }
    }

    /// Read the persisted image.
    ///
    /// # Errors
    ///
    /// Returns the store's error if it cannot be read. A missing image is
    /// `Ok(None)`.
    pub async fn load(&self) -> Result<Option<Vec<u8>>> {
        self.inner.store.load(&self.inner.key).await
    }

    /// Point the persister at the connection slot to export from.
    ///
    /// Until this is called every persist path is a no-op.
    pub fn set_database_ref(&self, database: DatabaseRef) {
        *lock(&self.inner.database) = Some(database);
    }

    #[must_use]
    pub fn has_database_ref(&self) -> bool {
        lock(&self.inner.database).is_some()
    }

    /// Store the image is written to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    #[must_use]
    pub fn phase(&self) -> PersistPhase {
        self.coordinator().queue.phase()
    }

    /// Request a save after the debounce window.
    ///
    /// Each call restarts the window; the save runs once the calls stop.
    pub fn schedule(&self) {
        if !self.has_database_ref() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime available, debounced save skipped");
            return;
        };

        let mut coordinator = self.coordinator();
        if let Some(timer) = coordinator.timer.take() {
            timer.abort();
        }
        let generation = coordinator.queue.arm();

        let this = self.clone();
        let delay = self.inner.debounce;
        coordinator.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            this.on_timer(generation);
        }));
    }

    /// Save now, bypassing the debounce, and wait for the write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persist`] if the cycle that covers this request
    /// failed to export or write. The in-memory database is unaffected.
    pub async fn persist_immediately(&self) -> Result<()> {
        if !self.has_database_ref() {
            return Ok(());
        }

        let rx = {
            let mut coordinator = self.coordinator();
            Self::cancel_timer(&mut coordinator);
            let Some(cycle) = self.request_cycle(&mut coordinator) else {
                return Err(Error::Persist("no runtime to run the save on".to_string()));
            };
            Self::wait_for_cycle(&mut coordinator, cycle)
        };
        Self::outcome(rx).await
    }

    /// Export now and write without waiting.
    ///
    /// For termination paths. The bytes go to the store's best-effort
    /// write; if a cycle is running, a trailing cycle is queued as well so
    /// the running cycle's older image cannot be the last one written.
    pub fn persist_sync(&self) {
        let bytes = match self.export() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not export database for synchronous save");
                return;
            }
        };

        {
            let mut coordinator = self.coordinator();
            Self::cancel_timer(&mut coordinator);
            if coordinator.queue.is_in_flight() {
                self.request_cycle(&mut coordinator);
            }
        }

        debug!(bytes = bytes.len(), "Synchronous save");
        Arc::clone(&self.inner.store).put_best_effort(&self.inner.key, bytes);
    }

    /// Wait until nothing is pending or running.
    ///
    /// A scheduled save is pulled forward. Otherwise the caller waits for
    /// the running cycle, or the trailing one queued behind it, without
    /// starting another.
    ///
    /// # Errors
    ///
    /// Same as [`persist_immediately`](Self::persist_immediately).
    pub async fn flush(&self) -> Result<()> {
        let armed = self.coordinator().queue.is_armed();
        if armed {
            return self.persist_immediately().await;
        }

        let rx = {
            let mut coordinator = self.coordinator();
            let Some(cycle) = coordinator.queue.last_pending() else {
                return Ok(());
            };
            Self::wait_for_cycle(&mut coordinator, cycle)
        };
        Self::outcome(rx).await
    }

    fn wait_for_cycle(coordinator: &mut Coordinator, cycle: u64) -> oneshot::Receiver<CycleOutcome> {
        let (tx, rx) = oneshot::channel();
        coordinator.waiters.push(Waiter { cycle, tx });
        rx
    }

    async fn outcome(rx: oneshot::Receiver<CycleOutcome>) -> Result<()> {
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(Error::Persist(message)),
            Err(_) => Err(Error::Persist("save was abandoned".to_string())),
        }
    }

    fn coordinator(&self) -> MutexGuard<'_, Coordinator> {
        lock(&self.inner.coordinator)
    }

    fn cancel_timer(coordinator: &mut Coordinator) {
        coordinator.queue.disarm();
        if let Some(timer) = coordinator.timer.take() {
            timer.abort();
        }
    }

    fn on_timer(&self, generation: u64) {
        let mut coordinator = self.coordinator();
        if !coordinator.queue.fire(generation) {
            return;
        }
        coordinator.timer = None;
        self.request_cycle(&mut coordinator);
    }

    /// Ask for a cycle, starting the driver if none is running.
    ///
    /// Returns the cycle that will cover the request, or `None` when there
    /// is no runtime to drive it.
    fn request_cycle(&self, coordinator: &mut Coordinator) -> Option<u64> {
        let runtime = Handle::try_current().ok()?;
        match coordinator.queue.begin() {
            Begin::Start { cycle } => {
                let this = self.clone();
                runtime.spawn(async move { this.drive(cycle).await });
                Some(cycle)
            }
            Begin::Coalesced { cycle } => {
                debug!(cycle, "Save coalesced behind running cycle");
                Some(cycle)
            }
        }
    }

    /// Run cycles until no trailing request is left.
    async fn drive(self, first: u64) {
        let mut cycle = first;
        loop {
            let outcome = self.run_cycle(cycle).await;

            let (completed, ready) = {
                let mut coordinator = self.coordinator();
                let completed = coordinator.queue.complete();
                let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut coordinator.waiters)
                    .into_iter()
                    .partition(|w| w.cycle <= completed.finished);
                coordinator.waiters = pending;
                (completed, ready)
            };

            for waiter in ready {
                let _ = waiter.tx.send(outcome.clone());
            }

            match completed.next {
                Some(next) => cycle = next,
                None => break,
            }
        }
    }

    async fn run_cycle(&self, cycle: u64) -> CycleOutcome {
        // Export stages a temp file; keep it off the runtime workers.
        let this = self.clone();
        let exported = tokio::task::spawn_blocking(move || this.export())
            .await
            .unwrap_or_else(|e| Err(Error::Other(format!("export task failed: {e}"))));
        let bytes = match exported {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(cycle, "No database attached, nothing to save");
                return Ok(());
            }
            Err(e) => {
                warn!(cycle, error = %e, "Failed to export database image");
                return Err(e.to_string());
            }
        };

        debug!(cycle, bytes = bytes.len(), "Writing database image");
        match self.inner.store.put(&self.inner.key, bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(cycle, error = %e, "Failed to persist database image");
                Err(e.to_string())
            }
        }
    }

    /// Export the current image, or `None` if there is nothing to export.
    fn export(&self) -> Result<Option<Vec<u8>>> {
        let Some(database) = lock(&self.inner.database).clone() else {
            return Ok(None);
        };
        let slot = lock(&database);
        slot.as_ref().map(export_image).transpose()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
