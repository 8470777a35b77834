//! A deterministic solver oracle for tests.
//!
//! The mock solver holds an explicit, finite list of variable assignments
//! and answers every query truthfully by evaluating expressions under those models.
//! This keeps the query sequences of the resolution algorithms fully reproducible.

use super::{ConstraintSet, SolverFailure, SolverOracle, SolverResult};
use crate::expr::{Expression, VariableAssignment};
use crate::prelude::*;
use std::time::Duration;

/// A solver oracle whose universe of feasible states
/// is an explicit list of variable assignments.
///
/// A model satisfies the constraint set if every constraint evaluates to a non-zero value.
/// `may_be_true` answers whether the query expression holds under *some* satisfying model,
/// `must_be_true` whether it holds under *all* of them,
/// and `get_value` evaluates the expression under the first satisfying model.
///
/// The solver can simulate slow backends through [`query_delay`](Self::with_query_delay)
/// and scripted failures through [`fail_after`](Self::with_failure_after).
pub struct FiniteModelSolver {
    models: Vec<VariableAssignment>,
    query_delay: Option<Duration>,
    fail_after: Option<u64>,
    scripted_failure: SolverFailure,
    queries_issued: u64,
}

impl FiniteModelSolver {
    /// Create a new mock solver over the given models.
    pub fn new(models: Vec<VariableAssignment>) -> FiniteModelSolver {
        FiniteModelSolver {
            models,
            query_delay: None,
            fail_after: None,
            scripted_failure: SolverFailure::Failure,
            queries_issued: 0,
        }
    }

    /// Sleep for the given duration on every query, simulating a slow backend.
    pub fn with_query_delay(mut self, delay: Duration) -> FiniteModelSolver {
        self.query_delay = Some(delay);
        self
    }

    /// Report the given failure on every query after the first `queries` ones.
    pub fn with_failure_after(mut self, queries: u64, failure: SolverFailure) -> FiniteModelSolver {
        self.fail_after = Some(queries);
        self.scripted_failure = failure;
        self
    }

    /// The number of queries issued so far (including failed ones).
    pub fn queries_issued(&self) -> u64 {
        self.queries_issued
    }

    fn begin_query(&mut self) -> SolverResult<()> {
        if let Some(delay) = self.query_delay {
            std::thread::sleep(delay);
        }
        self.queries_issued += 1;
        match self.fail_after {
            Some(limit) if self.queries_issued > limit => Err(self.scripted_failure),
            _ => Ok(()),
        }
    }

    fn holds(expr: &Expression, model: &VariableAssignment) -> Result<bool, Error> {
        Ok(!expr.evaluate(model)?.is_zero())
    }

    /// Return all models that satisfy every constraint in the set.
    fn satisfying_models<'a>(
        &'a self,
        constraints: &ConstraintSet,
    ) -> SolverResult<Vec<&'a VariableAssignment>> {
        let mut satisfying = Vec::new();
        for model in &self.models {
            let mut all_hold = true;
            for constraint in constraints.iter() {
                all_hold &= Self::holds(constraint, model).map_err(|_| SolverFailure::Failure)?;
            }
            if all_hold {
                satisfying.push(model);
            }
        }
        Ok(satisfying)
    }
}

impl SolverOracle for FiniteModelSolver {
    fn may_be_true(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<bool> {
        self.begin_query()?;
        for model in self.satisfying_models(constraints)? {
            if Self::holds(expr, model).map_err(|_| SolverFailure::Failure)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn must_be_true(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<bool> {
        self.begin_query()?;
        for model in self.satisfying_models(constraints)? {
            if !Self::holds(expr, model).map_err(|_| SolverFailure::Failure)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn get_value(
        &mut self,
        constraints: &ConstraintSet,
        expr: &Expression,
    ) -> SolverResult<Bitvector> {
        self.begin_query()?;
        match self.satisfying_models(constraints)?.first() {
            Some(model) => expr.evaluate(model).map_err(|_| SolverFailure::Failure),
            None => Err(SolverFailure::Failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parsing;
    use crate::{bitvec, expr, variable};

    fn model(pairs: &[(&str, u64)]) -> VariableAssignment {
        pairs
            .iter()
            .map(|(var, value)| (parsing::parse_variable(var), Bitvector::from_u64(*value)))
            .collect()
    }

    #[test]
    fn truthful_answers() {
        let mut solver = FiniteModelSolver::new(vec![
            model(&[("x:8", 0x205)]),
            model(&[("x:8", 0x210)]),
        ]);
        let no_constraints = ConstraintSet::new();
        let x = Expression::Var(variable!("x:8"));

        // satisfiable but not valid
        let is_small = x.clone().ult(expr!("0x208:8"));
        assert!(solver.may_be_true(&no_constraints, &is_small).unwrap());
        assert!(!solver.must_be_true(&no_constraints, &is_small).unwrap());

        // valid under both models
        let in_object = x.clone().minus(expr!("0x200:8")).ult(expr!("0x40:8"));
        assert!(solver.must_be_true(&no_constraints, &in_object).unwrap());

        assert_eq!(
            solver.get_value(&no_constraints, &x).unwrap(),
            bitvec!("0x205:8")
        );
    }

    #[test]
    fn constraints_narrow_the_models() {
        let mut solver = FiniteModelSolver::new(vec![
            model(&[("x:8", 0x205)]),
            model(&[("x:8", 0x210)]),
        ]);
        let constraints: ConstraintSet = [Expression::Var(variable!("x:8")).eq(expr!("0x210:8"))]
            .into_iter()
            .collect();
        let x = Expression::Var(variable!("x:8"));
        assert_eq!(
            solver.get_value(&constraints, &x).unwrap(),
            bitvec!("0x210:8")
        );
        let is_small = x.ult(expr!("0x208:8"));
        assert!(!solver.may_be_true(&constraints, &is_small).unwrap());
    }

    #[test]
    fn scripted_failure() {
        let mut solver = FiniteModelSolver::new(vec![model(&[("x:8", 1)])])
            .with_failure_after(1, SolverFailure::Timeout);
        let no_constraints = ConstraintSet::new();
        let x = Expression::Var(variable!("x:8"));
        assert!(solver.may_be_true(&no_constraints, &x).unwrap());
        assert_eq!(
            solver.may_be_true(&no_constraints, &x),
            Err(SolverFailure::Timeout)
        );
    }

    #[test]
    fn unsatisfiable_constraints() {
        let mut solver = FiniteModelSolver::new(vec![model(&[("x:8", 5)])]);
        let constraints: ConstraintSet = [Expression::Var(variable!("x:8")).eq(expr!("0x6:8"))]
            .into_iter()
            .collect();
        let x = Expression::Var(variable!("x:8"));
        // vacuous universe: nothing may be true, everything must be true
        assert!(!solver.may_be_true(&constraints, &x).unwrap());
        assert!(solver.must_be_true(&constraints, &x).unwrap());
        assert!(solver.get_value(&constraints, &x).is_err());
    }
}
