//! Interpreter configuration and wall-clock abstraction: a small struct of numeric
//! ceilings, and a trait seam so tests can supply a deterministic clock instead of
//! `Utc::now()`.

use chrono::{DateTime, Utc};

use crate::when_dispatcher::MAX_DISPATCH_ITERATIONS;

/// Numeric ceilings enforced by the evaluator: call-recursion depth and the reactive
/// dispatcher's iteration ceiling.
#[derive(Debug, Clone, Copy)]
pub struct InterpreterLimits {
    pub max_call_depth: u32,
    pub max_dispatch_iterations: u64,
}

impl Default for InterpreterLimits {
    fn default() -> Self {
        Self { max_call_depth: 2_000, max_dispatch_iterations: MAX_DISPATCH_ITERATIONS }
    }
}

/// Source of wall-clock time for `@Ns`-style lifetimes. A trait seam (rather than
/// calling `Utc::now()` directly) so tests can pin time and assert expiry deterministically.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock, used by the CLI and REPL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only advances when told to, used by tests exercising second-based
/// lifetimes without sleeping.
#[derive(Debug, Clone)]
pub struct FixedClock {
    current: std::cell::Cell<DateTime<Utc>>,
}

impl FixedClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { current: std::cell::Cell::new(start) }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        self.current.set(self.current.get() + duration);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.current.get()
    }
}
