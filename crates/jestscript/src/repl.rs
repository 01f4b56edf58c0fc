//! Persistent REPL session: a single long-lived interpreter fed one chunk of source
//! at a time, so declarations and state from earlier input remain visible to later
//! input.

use crate::config::{Clock, InterpreterLimits, SystemClock};
use crate::error::JestResult;
use crate::evaluator::Evaluator;
use crate::parser::parse;
use crate::value::Value;

/// One outcome of feeding a chunk of source into a session.
#[derive(Debug, Clone)]
pub struct ReplProgress {
    pub result: Option<Value>,
}

/// Wraps an [`Evaluator`] that persists across calls to [`ReplSession::execute`], so
/// one interpreter stays alive for the lifetime of a REPL.
pub struct ReplSession {
    evaluator: Evaluator,
}

impl Default for ReplSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplSession {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self { evaluator: Evaluator::new(clock, InterpreterLimits::default()) }
    }

    /// Parses and runs one chunk of source against the persistent evaluator state.
    pub fn execute(&mut self, source: &str) -> JestResult<ReplProgress> {
        let program = parse(source)?;
        let result = self.evaluator.run(&program)?;
        Ok(ReplProgress { result })
    }

    #[must_use]
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }
}
