// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! Path sensitive static symbolic execution over an interprocedural CFG.
//!
//! [explorer::PathExplorer] enumerates the paths from the global entry to
//! every assertion call (loops unrolled once per calling context).
//! [encoder::PathEncoder] translates each path into constraints over a
//! virtual memory model and [checker::AssertionChecker] asks the solver
//! whether the assertion can be violated on it.

pub mod call_stack;
pub mod checker;
pub mod config;
pub mod encoder;
pub mod error;
pub mod explorer;
pub mod icfg;
pub mod ir;
pub mod logging;
pub mod manual;
pub mod memory;
pub mod session;
pub mod solver;
pub mod term;

#[cfg(test)]
mod test_graphs;
mod test_encoder;
mod test_explorer;
mod test_manual;
mod test_memory;
mod test_session;
mod test_solver;

pub use error::{Result, SseError};
pub use session::{collect_paths, verify, verify_native, Report, SymbolicExecution};
