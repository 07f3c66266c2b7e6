//! Lifecycle hooks that force a save.
//!
//! A host tells the session about three moments when the process may be
//! about to go away. Each maps to a persistence tier:
//!
//! | signal            | action                                   |
//! |-------------------|------------------------------------------|
//! | `VisibilityHidden` | [`Persister::persist_immediately`], spawned |
//! | `PageHide`        | [`Persister::persist_sync`]              |
//! | `BeforeUnload`    | [`Persister::persist_sync`]              |
//!
//! There is no "anything changed?" check; every signal saves.

use crate::store::Persister;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Signals a host can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    /// The application went to the background but is still alive.
    VisibilityHidden,
    /// The application is being hidden for good or suspended.
    PageHide,
    /// The application is about to exit.
    BeforeUnload,
}

impl LifecycleSignal {
    pub const ALL: [Self; 3] = [Self::VisibilityHidden, Self::PageHide, Self::BeforeUnload];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VisibilityHidden => "visibility-hidden",
            Self::PageHide => "pagehide",
            Self::BeforeUnload => "beforeunload",
        }
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback registered for a signal.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Something that raises lifecycle signals.
pub trait LifecycleTarget: Send + Sync {
    fn add_listener(&self, signal: LifecycleSignal, listener: Listener);
}

/// In-process [`LifecycleTarget`] that the host dispatches into.
#[derive(Default)]
pub struct LifecycleEvents {
    listeners: Mutex<HashMap<LifecycleSignal, Vec<Listener>>>,
}

impl fmt::Debug for LifecycleEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = LifecycleSignal::ALL
            .iter()
            .map(|s| (s.as_str(), self.listener_count(*s)))
            .collect();
        f.debug_struct("LifecycleEvents")
            .field("listeners", &counts)
            .finish()
    }
}

impl LifecycleEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call every listener registered for `signal`, in registration order.
    pub fn dispatch(&self, signal: LifecycleSignal) {
        // Listeners run outside the lock so they may register more.
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signal)
            .cloned()
            .unwrap_or_default();

        debug!(%signal, listeners = listeners.len(), "Dispatching lifecycle signal");
        for listener in listeners {
            listener();
        }
    }

    #[must_use]
    pub fn listener_count(&self, signal: LifecycleSignal) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signal)
            .map_or(0, Vec::len)
    }
}

impl LifecycleTarget for LifecycleEvents {
    fn add_listener(&self, signal: LifecycleSignal, listener: Listener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(signal)
            .or_default()
            .push(listener);
    }
}

/// Registers the save handlers on a target, once.
#[derive(Debug, Default)]
pub struct LifecycleBinder {
    attached: AtomicBool,
}

impl LifecycleBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the handlers. Later calls do nothing and return `false`.
    pub fn attach(&self, target: &dyn LifecycleTarget, persister: &Persister) -> bool {
        if self.attached.swap(true, Ordering::SeqCst) {
            return false;
        }

        let hidden = persister.clone();
        target.add_listener(
            LifecycleSignal::VisibilityHidden,
            Arc::new(move || {
                let persister = hidden.clone();
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    warn!("No runtime available, falling back to synchronous save");
                    persister.persist_sync();
                    return;
                };
                runtime.spawn(async move {
                    if let Err(e) = persister.persist_immediately().await {
                        warn!(error = %e, "Save on hide failed");
                    }
                });
            }),
        );

        for signal in [LifecycleSignal::PageHide, LifecycleSignal::BeforeUnload] {
            let persister = persister.clone();
            target.add_listener(signal, Arc::new(move || persister.persist_sync()));
        }

        info!("Lifecycle save handlers attached");
        true
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

/// Feed OS signals into `events` until a terminating one arrives.
///
/// SIGUSR1 raises `VisibilityHidden` and SIGHUP raises `PageHide`; both
/// keep the loop running. SIGINT and SIGTERM raise `BeforeUnload`, after
/// which the signal is returned so the host can exit.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[cfg(unix)]
pub async fn pump_os_signals(events: Arc<LifecycleEvents>) -> std::io::Result<LifecycleSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = usr1.recv() => events.dispatch(LifecycleSignal::VisibilityHidden),
            _ = hup.recv() => events.dispatch(LifecycleSignal::PageHide),
            _ = int.recv() => break,
            _ = term.recv() => break,
        }
    }

    events.dispatch(LifecycleSignal::BeforeUnload);
    Ok(LifecycleSignal::BeforeUnload)
}

/// Feed OS signals into `events` until a terminating one arrives.
///
/// Only Ctrl-C is available here; it raises `BeforeUnload`.
///
/// # Errors
///
/// Returns an error if the Ctrl-C handler cannot be installed.
#[cfg(not(unix))]
pub async fn pump_os_signals(events: Arc<LifecycleEvents>) -> std::io::Result<LifecycleSignal> {
    tokio::signal::ctrl_c().await?;
    events.dispatch(LifecycleSignal::BeforeUnload);
    Ok(LifecycleSignal::BeforeUnload)
}
