/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The solver contract: `submit(problem) → Sat(model) | Unsat`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::SolverError;
use crate::problem::{Model, Problem};

// ── Verdict ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Verdict {
    Sat(Model),
    Unsat,
}

impl Verdict {
    pub fn is_sat(&self) -> bool {
        matches!(self, Verdict::Sat(_))
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            Verdict::Sat(m) => Some(m),
            Verdict::Unsat => None,
        }
    }
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Shared flag a caller raises to stop a running solve.
///
/// Cloning shares the flag; raising any clone cancels every holder.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Deadline and cancellation for one `submit` call.
#[derive(Debug, Clone)]
pub struct SolveControl {
    started: Instant,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl SolveControl {
    /// No deadline, fresh token.
    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started.checked_add(timeout),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Called by backends between units of work.
    pub fn check(&self, nodes: usize) -> Result<(), SolverError> {
        if self.cancel.is_cancelled() {
            return Err(SolverError::Cancelled { nodes });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SolverError::Timeout {
                    elapsed_ms: self.elapsed().as_millis(),
                    nodes,
                });
            }
        }
        Ok(())
    }
}

impl Default for SolveControl {
    fn default() -> Self {
        Self::unbounded()
    }
}

// ── Solver ────────────────────────────────────────────────────────────────────

/// A constraint-solving engine.
///
/// Implementations must be `Send + Sync` so one engine can be shared behind an
/// `Arc` and driven from a blocking worker thread.
pub trait Solver: Send + Sync {
    /// Short identifier used in log lines.
    fn name(&self) -> &str;

    /// Decide `problem`.
    ///
    /// # Errors
    /// [`SolverError`] when no verdict could be reached (timeout,
    /// cancellation, budget exhaustion, malformed input).
    fn submit(&self, problem: &Problem, control: &SolveControl) -> Result<Verdict, SolverError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let control = SolveControl::unbounded().with_cancel(token.clone());
        assert!(control.check(0).is_ok());
        token.cancel();
        assert_eq!(control.check(7), Err(SolverError::Cancelled { nodes: 7 }));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let control = SolveControl::with_timeout(Duration::ZERO);
        assert!(matches!(control.check(0), Err(SolverError::Timeout { .. })));
    }
}
