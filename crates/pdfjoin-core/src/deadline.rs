//! Wall-clock budget for a single invocation

use crate::error::PdfJoinError;
use std::time::{Duration, Instant};

/// Cooperative deadline, checked at phase boundaries and inside long loops.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Fail with `Timeout` once the budget is spent.
    pub fn check(&self, phase: &'static str) -> Result<(), PdfJoinError> {
        match self.budget {
            Some(budget) if self.start.elapsed() >= budget => Err(PdfJoinError::Timeout {
                budget_ms: budget.as_millis() as u64,
                phase,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}
