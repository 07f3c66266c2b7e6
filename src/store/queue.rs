//! Persist request state machine.
//!
//! Tracks the debounce timer generation and the export+write cycles so that
//! at most one cycle runs at a time and requests arriving during a cycle
//! collapse into a single trailing cycle. Pure bookkeeping: the
//! [`Persister`](super::Persister) owns the timer task and the I/O.

use serde::Serialize;

/// Observable state of the persist pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPhase {
    /// Nothing pending.
    Idle,
    /// A debounced save is waiting for its timer.
    Scheduled,
    /// A cycle is exporting or writing.
    InFlight,
    /// A cycle is running and exactly one more is queued behind it.
    InFlightQueued,
}

/// Result of requesting a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    /// No cycle was running; the caller must start this one.
    Start { cycle: u64 },
    /// Folded into the trailing cycle behind the running one.
    Coalesced { cycle: u64 },
}

impl Begin {
    /// Cycle number whose completion satisfies the request.
    #[must_use]
    pub const fn cycle(self) -> u64 {
        match self {
            Self::Start { cycle } | Self::Coalesced { cycle } => cycle,
        }
    }
}

/// Result of finishing the running cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completed {
    /// Cycle that just finished.
    pub finished: u64,
    /// Trailing cycle to run next, if one was queued.
    pub next: Option<u64>,
}

#[derive(Debug, Default)]
pub struct PersistQueue {
    in_flight: bool,
    queued: bool,
    armed: Option<u64>,
    generation: u64,
    started: u64,
    finished: u64,
}

impl PersistQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the debounce timer, superseding any earlier arming.
    ///
    /// Returns the generation the timer must present when it fires.
    pub fn arm(&mut self) -> u64 {
        self.generation += 1;
        self.armed = Some(self.generation);
        self.generation
    }

    /// Cancel the armed timer, if any.
    pub fn disarm(&mut self) {
        self.armed = None;
    }

    /// A timer fired. True only for the most recent arming.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.armed == Some(generation) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    /// Request an export+write cycle.
    pub fn begin(&mut self) -> Begin {
        if self.in_flight {
            self.queued = true;
            Begin::Coalesced {
                cycle: self.started + 1,
            }
        } else {
            self.in_flight = true;
            self.started += 1;
            Begin::Start {
                cycle: self.started,
            }
        }
    }

    /// The running cycle finished, successfully or not.
    ///
    /// If requests arrived meanwhile the trailing cycle starts immediately
    /// and stays in flight; otherwise the queue returns to idle.
    pub fn complete(&mut self) -> Completed {
        self.finished = self.started;
        if self.queued {
            self.queued = false;
            self.started += 1;
            Completed {
                finished: self.finished,
                next: Some(self.started),
            }
        } else {
            self.in_flight = false;
            Completed {
                finished: self.finished,
                next: None,
            }
        }
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Whether a debounce timer is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Last cycle already running or queued, if any.
    ///
    /// Its completion covers every request made so far.
    #[must_use]
    pub const fn last_pending(&self) -> Option<u64> {
        match (self.in_flight, self.queued) {
            (true, true) => Some(self.started + 1),
            (true, false) => Some(self.started),
            (false, _) => None,
        }
    }

    /// Number of cycles that have finished.
    #[must_use]
    pub const fn finished(&self) -> u64 {
        self.finished
    }

    #[must_use]
    pub const fn phase(&self) -> PersistPhase {
        match (self.in_flight, self.queued, self.armed) {
            (true, true, _) => PersistPhase::InFlightQueued,
            (true, false, _) => PersistPhase::InFlight,
            (false, _, Some(_)) => PersistPhase::Scheduled,
            (false, _, None) => PersistPhase::Idle,
        }
    }
}
