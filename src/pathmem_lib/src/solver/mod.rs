//! The interface between the memory model and the SMT solver.
//!
//! The memory model never solves constraints itself.
//! It consults an external decision procedure through the [`SolverOracle`] trait,
//! asking only three kinds of questions:
//! whether an expression may be true, whether it must be true,
//! and for some feasible concrete value of an expression.
//! Solver backends are expected to wrap their own error conditions
//! into the [`SolverFailure`] type,
//! so that the resolution algorithms can distinguish
//! recoverable failures from operator interrupts.

use crate::expr::Expression;
use crate::prelude::*;
use crate::utils::log::{LogMessage, LogThreadMsg};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(test)]
pub mod mock;

/// The set of path constraints that a resolution query is evaluated under.
///
/// Each contained expression is a boolean (1-byte) expression
/// that is assumed to hold on the current execution path.
/// The constraint list is append-only and wrapped into an `Arc`,
/// so that cloning a constraint set on a path fork is cheap.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct ConstraintSet {
    constraints: Arc<Vec<Expression>>,
}

impl ConstraintSet {
    /// Create a new, empty constraint set.
    pub fn new() -> ConstraintSet {
        ConstraintSet::default()
    }

    /// Append a constraint to the set.
    pub fn push(&mut self, constraint: Expression) {
        Arc::make_mut(&mut self.constraints).push(constraint);
    }

    /// Get an iterator over the contained constraints.
    pub fn iter(&self) -> std::slice::Iter<'_, Expression> {
        self.constraints.iter()
    }

    /// Get the number of contained constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Return whether the constraint set is empty.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl FromIterator<Expression> for ConstraintSet {
    fn from_iter<I: IntoIterator<Item = Expression>>(iter: I) -> ConstraintSet {
        ConstraintSet {
            constraints: Arc::new(iter.into_iter().collect()),
        }
    }
}

/// The ways a solver query can fail without producing an answer.
///
/// Any of these failures aborts the resolution that issued the query.
/// The resolution algorithms never retry failed queries.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SolverFailure {
    /// The solver gave up on the query without further information.
    Failure,
    /// The solver hit its per-query time or resource budget.
    Timeout,
    /// The operator interrupted the solver.
    ///
    /// This status must be propagated up to the outermost driver,
    /// which decides whether to re-raise the interrupt at the platform level.
    Interrupted,
}

impl std::fmt::Display for SolverFailure {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverFailure::Failure => write!(formatter, "solver failure"),
            SolverFailure::Timeout => write!(formatter, "solver timeout"),
            SolverFailure::Interrupted => write!(formatter, "solver interrupted"),
        }
    }
}

impl std::error::Error for SolverFailure {}

/// The result type of all solver oracle queries.
pub type SolverResult<T> = std::result::Result<T, SolverFailure>;

/// Classify the reason string a solver backend reports for an *unknown* verdict.
///
/// Time and resource budget reasons are mapped to [`SolverFailure::Timeout`],
/// a keyboard interrupt to [`SolverFailure::Interrupted`]
/// and a plain `"unknown"` to the generic [`SolverFailure::Failure`].
/// Any other reason indicates a broken solver setup and is returned as a fatal error.
pub fn classify_unknown_reason(reason: &str) -> Result<SolverFailure, Error> {
    match reason {
        "timeout" | "canceled" | "(resource limits reached)" => Ok(SolverFailure::Timeout),
        "unknown" => Ok(SolverFailure::Failure),
        "interrupted from keyboard" => Ok(SolverFailure::Interrupted),
        _ => Err(anyhow!("Unexpected solver failure. Reason is \"{}\"", reason)),
    }
}

/// The decision procedure interface consumed by the resolution algorithms.
///
/// Implementations may cache internally but must behave functionally
/// with respect to the `(constraints, expr)` pair of each query.
/// All queries treat `expr` as a boolean, i.e. "true" means "not zero",
/// except for [`get_value`](SolverOracle::get_value) which treats it as a bitvector.
pub trait SolverOracle {
    /// Return whether `expr` can be true under the given constraints,
    /// i.e. whether the constraints together with `expr` are satisfiable.
    fn may_be_true(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<bool>;

    /// Return whether `expr` must be true under the given constraints,
    /// i.e. whether the constraints imply `expr`.
    fn must_be_true(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<bool>;

    /// Return some concrete value that `expr` can evaluate to under the given constraints.
    fn get_value(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<Bitvector>;
}

/// Statistics about the queries issued through an [`InstrumentedSolver`].
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct QueryStats {
    /// The total number of queries issued.
    pub queries: u64,
    /// The number of `may_be_true` queries issued.
    pub may_be_true_queries: u64,
    /// The number of `must_be_true` queries issued.
    pub must_be_true_queries: u64,
    /// The number of `get_value` queries issued.
    pub value_queries: u64,
    /// The accumulated wall-clock time spent inside the wrapped solver.
    #[serde(skip)]
    pub query_time: Duration,
}

/// A solver oracle wrapper that counts queries
/// and accumulates the wall-clock time spent inside the wrapped solver.
///
/// The statistics can be reported through the logging infrastructure
/// with [`log_statistics`](InstrumentedSolver::log_statistics).
pub struct InstrumentedSolver<S> {
    inner: S,
    stats: QueryStats,
}

impl<S: SolverOracle> InstrumentedSolver<S> {
    /// Wrap the given solver oracle.
    pub fn new(inner: S) -> InstrumentedSolver<S> {
        InstrumentedSolver {
            inner,
            stats: QueryStats::default(),
        }
    }

    /// Get the statistics accumulated so far.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// Consume the wrapper and return the wrapped solver.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Send an info log message with the accumulated query statistics to the given log collector.
    pub fn log_statistics(&self, log_sender: &crossbeam_channel::Sender<LogThreadMsg>) {
        let message = LogMessage::new_info(format!(
            "Issued {} solver queries ({} mayBeTrue, {} mustBeTrue, {} getValue) in {} ms.",
            self.stats.queries,
            self.stats.may_be_true_queries,
            self.stats.must_be_true_queries,
            self.stats.value_queries,
            self.stats.query_time.as_millis()
        ))
        .source("Solver");
        let _ = log_sender.send(LogThreadMsg::Log(message));
    }

}

impl<S: SolverOracle> SolverOracle for InstrumentedSolver<S> {
    fn may_be_true(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<bool> {
        let start = Instant::now();
        let result = self.inner.may_be_true(constraints, expr);
        self.stats.query_time += start.elapsed();
        self.stats.queries += 1;
        self.stats.may_be_true_queries += 1;
        result
    }

    fn must_be_true(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<bool> {
        let start = Instant::now();
        let result = self.inner.must_be_true(constraints, expr);
        self.stats.query_time += start.elapsed();
        self.stats.queries += 1;
        self.stats.must_be_true_queries += 1;
        result
    }

    fn get_value(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<Bitvector> {
        let start = Instant::now();
        let result = self.inner.get_value(constraints, expr);
        self.stats.query_time += start.elapsed();
        self.stats.queries += 1;
        self.stats.value_queries += 1;
        result
    }
}
