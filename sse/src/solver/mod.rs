// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! Constraint solver backends.

use std::fmt::Display;

use crate::term::{Formula, Term};

pub mod native;
#[cfg(feature = "z3")]
pub mod z3_backend;

pub use native::NativeSolver;
#[cfg(feature = "z3")]
pub use z3_backend::Z3Solver;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

impl Display for SatResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SatResult::Sat => write!(f, "sat"),
            SatResult::Unsat => write!(f, "unsat"),
            SatResult::Unknown => write!(f, "unknown"),
        }
    }
}

/// Scoped accumulation of constraints with satisfiability checks.
pub trait ConstraintSolver {
    fn name(&self) -> &'static str;

    /// Asserts `constraint` in the current scope.
    fn add(&mut self, constraint: Formula);

    /// Opens a new scope.
    fn push(&mut self);

    /// Drops all constraints added since the matching [ConstraintSolver::push].
    fn pop(&mut self);

    fn check(&mut self) -> SatResult;

    /// Value of `term` in the model of the last check.
    /// Only meaningful directly after a check which did not return unsat.
    fn evaluate(&mut self, term: &Term) -> Option<i64>;

    /// Drops every constraint and scope.
    fn reset(&mut self);

    /// Number of asserted constraints.
    fn num_constraints(&self) -> usize;

    /// Checks `constraint` together with the current constraints
    /// without keeping it asserted.
    fn probe(&mut self, constraint: Formula) -> SatResult {
        self.push();
        self.add(constraint);
        let res = self.check();
        self.pop();
        res
    }
}
