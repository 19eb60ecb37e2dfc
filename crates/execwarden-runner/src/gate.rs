//! Single-resolution coordination for one invocation.
//!
//! Natural completion, the timeout watcher and the cancellation listener all
//! race to claim the [`ResolutionGate`]. The flag check and every flag write
//! happen under one lock, so exactly one claimant ever wins and the losers
//! must not produce side effects.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Which path is trying to resolve the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The process exited on its own
    Completed,
    /// The configured timeout elapsed
    TimedOut,
    /// The caller's cancellation signal fired
    Cancelled,
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Coordination flags for one invocation.
///
/// At most one of `cancelled` / `timed_out` is ever set, and only together
/// with the false→true transition of `resolved`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionState {
    pub cancelled: bool,
    pub timed_out: bool,
    pub resolved: bool,
}

impl ExecutionState {
    /// The claim that resolved this state, if any.
    #[must_use]
    pub const fn winner(&self) -> Option<Claim> {
        match (self.resolved, self.timed_out, self.cancelled) {
            (false, _, _) => None,
            (true, true, _) => Some(Claim::TimedOut),
            (true, false, true) => Some(Claim::Cancelled),
            (true, false, false) => Some(Claim::Completed),
        }
    }
}

/// Lock-guarded [`ExecutionState`] with an atomic claim operation.
#[derive(Debug, Default)]
pub struct ResolutionGate {
    state: Mutex<ExecutionState>,
}

impl ResolutionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Try to resolve the invocation on behalf of `claim`.
    ///
    /// Returns `true` for exactly one caller over the gate's lifetime. The
    /// winner's flag is recorded in the same critical section.
    pub fn try_claim(&self, claim: Claim) -> bool {
        let mut state = self.lock();
        if state.resolved {
            return false;
        }
        state.resolved = true;
        match claim {
            Claim::Completed => {}
            Claim::TimedOut => state.timed_out = true,
            Claim::Cancelled => state.cancelled = true,
        }
        true
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.lock().resolved
    }

    /// Copy of the current flags.
    #[must_use]
    pub fn snapshot(&self) -> ExecutionState {
        *self.lock()
    }
}
