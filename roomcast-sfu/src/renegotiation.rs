//! Renegotiation coordinator
//!
//! Serialises renegotiation rounds for one room. A trigger that arrives
//! while a round is running only marks the round dirty; the running round
//! then performs one more pass. A burst of N overlapping triggers therefore
//! costs at most one extra pass, never N.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Result of one synchronisation pass over every peer of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every peer was brought in line with the track set.
    Settled,
    /// At least one peer failed; run another pass.
    Retry,
}

/// What a call to [`Renegotiator::run`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Another round was in progress and will pick this trigger up.
    Coalesced,
    /// The round settled after `passes` passes.
    Completed { passes: usize },
    /// The round was still dirty when the pass cap was reached.
    Abandoned { passes: usize },
}

#[derive(Debug, Default)]
struct Flags {
    in_progress: bool,
    dirty: bool,
}

pub struct Renegotiator {
    flags: Mutex<Flags>,
    max_passes: usize,
    rounds: AtomicU64,
}

impl Renegotiator {
    #[must_use]
    pub fn new(max_passes: usize) -> Self {
        Self {
            flags: Mutex::new(Flags::default()),
            max_passes: max_passes.max(1),
            rounds: AtomicU64::new(0),
        }
    }

    /// Run a renegotiation round, or fold into the one already running.
    ///
    /// The flags are only touched between passes, never across an await.
    pub async fn run<F, Fut>(&self, mut pass: F) -> Trigger
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PassOutcome>,
    {
        {
            let mut flags = self.flags.lock();
            if flags.in_progress {
                flags.dirty = true;
                return Trigger::Coalesced;
            }
            flags.in_progress = true;
            flags.dirty = false;
        }
        self.rounds.fetch_add(1, Ordering::Relaxed);

        let mut passes = 0;
        loop {
            let outcome = pass().await;
            passes += 1;

            let mut flags = self.flags.lock();
            if outcome == PassOutcome::Retry {
                flags.dirty = true;
            }
            if !flags.dirty {
                flags.in_progress = false;
                debug!(passes, "Renegotiation round settled");
                return Trigger::Completed { passes };
            }
            if passes >= self.max_passes {
                flags.in_progress = false;
                flags.dirty = false;
                warn!(passes, "Renegotiation round abandoned after pass limit");
                return Trigger::Abandoned { passes };
            }
            flags.dirty = false;
        }
    }

    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.flags.lock().in_progress
    }

    /// Rounds started, excluding coalesced triggers.
    #[must_use]
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }
}
