// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::collections::BTreeSet;
use std::fmt::Display;

use helper::timer::Timer;
use log::{info, warn};

use crate::checker::{AssertionChecker, VarDump, Verdict};
use crate::config::Config;
use crate::encoder::PathEncoder;
use crate::error::Result;
use crate::explorer::{AcceptAll, ExploreLimits, ExploreOutcome, IcfgPath, PathExplorer, PathHandler};
use crate::icfg::{Icfg, NodeId};
#[cfg(feature = "z3")]
use crate::solver::{z3_backend, Z3Solver};
use crate::solver::{ConstraintSolver, NativeSolver};

/// Result of checking the assertion at the end of one path.
#[derive(Clone, Debug)]
pub struct AssertionReport {
    pub path: String,
    pub sink: NodeId,
    pub verdict: Verdict,
    pub dump: Option<VarDump>,
}

impl Display for AssertionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[{}] sink {}: {}", self.verdict, self.sink, self.path)?;
        if let Some(dump) = &self.dump {
            write!(f, "{}", dump)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    /// All feasible paths.
    pub paths: BTreeSet<String>,
    /// One entry per feasible path.
    pub verdicts: Vec<AssertionReport>,
    /// Set if a bound stopped the search early.
    pub truncated: bool,
}

impl Report {
    pub fn failures(&self) -> impl Iterator<Item = &AssertionReport> {
        self.verdicts.iter().filter(|r| r.verdict == Verdict::Fail)
    }

    pub fn all_passed(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// One analysis session. Owns the solver and all exploration state.
pub struct SymbolicExecution<'g, S: ConstraintSolver> {
    icfg: &'g Icfg,
    config: Config,
    encoder: PathEncoder<'g, S>,
    checker: AssertionChecker,
    verdicts: Vec<AssertionReport>,
}

impl<'g, S: ConstraintSolver> SymbolicExecution<'g, S> {
    pub fn new(icfg: &'g Icfg, config: Config, solver: S) -> Result<SymbolicExecution<'g, S>> {
        config.validate()?;
        Ok(SymbolicExecution {
            icfg,
            encoder: PathEncoder::new(icfg, solver, config.field_stride),
            checker: AssertionChecker::new(config.dump_on_failure),
            config,
            verdicts: Vec::new(),
        })
    }

    /// Explores every path from the global entry to every sink and
    /// checks the assertion of each feasible one.
    pub fn run(&mut self) -> Result<Report> {
        let mut timer = Timer::new(None);
        timer.start();
        let source = self.icfg.get_global_entry()?;
        let sinks = self.icfg.get_sinks(&self.config.sink_matcher()?);
        if sinks.is_empty() {
            warn!("No sink found. Nothing to verify.");
        }
        info!(
            "Verify {} sinks with the {} solver",
            sinks.len(),
            self.encoder.get_solver_mut().name()
        );
        self.verdicts.clear();
        let mut explorer = PathExplorer::new(self.icfg, ExploreLimits::from(&self.config));
        let outcome = explorer.explore(source, &sinks, self)?;
        let report = Report {
            paths: outcome.paths,
            verdicts: std::mem::take(&mut self.verdicts),
            truncated: outcome.truncated,
        };
        info!(
            "Checked {} paths in {}. {} assertion failures.",
            report.verdicts.len(),
            timer.elapsed_str(),
            report.failures().count()
        );
        Ok(report)
    }
}

impl<'g, S: ConstraintSolver> PathHandler for SymbolicExecution<'g, S> {
    fn on_path(&mut self, path: &IcfgPath, sink: NodeId) -> Result<bool> {
        if !self.encoder.encode(path)? {
            return Ok(false);
        }
        let (verdict, dump) = self.checker.check(&mut self.encoder, sink)?;
        let report = AssertionReport {
            path: path.to_path_string(self.icfg),
            sink,
            verdict,
            dump,
        };
        if verdict == Verdict::Fail {
            warn!("{}", report);
        }
        self.verdicts.push(report);
        Ok(true)
    }

    fn reset(&mut self) {
        self.encoder.reset_exploration();
    }
}

/// Verifies all sinks of `icfg` with Z3.
#[cfg(feature = "z3")]
pub fn verify(icfg: &Icfg, config: Config) -> Result<Report> {
    let ctx = z3_backend::new_context();
    let mut session = SymbolicExecution::new(icfg, config, Z3Solver::new(&ctx))?;
    session.run()
}

/// Verifies all sinks of `icfg` with the native solver.
#[cfg(not(feature = "z3"))]
pub fn verify(icfg: &Icfg, config: Config) -> Result<Report> {
    verify_native(icfg, config)
}

/// Verifies all sinks of `icfg` with the native solver,
/// independent of the enabled backends.
pub fn verify_native(icfg: &Icfg, config: Config) -> Result<Report> {
    let solver = NativeSolver::with_budget(config.search_budget);
    let mut session = SymbolicExecution::new(icfg, config, solver)?;
    session.run()
}

/// Enumerates the paths from the global entry to every sink without
/// checking their feasibility.
pub fn collect_paths(icfg: &Icfg, config: &Config) -> Result<ExploreOutcome> {
    config.validate()?;
    let source = icfg.get_global_entry()?;
    let sinks = icfg.get_sinks(&config.sink_matcher()?);
    PathExplorer::new(icfg, ExploreLimits::from(config)).explore(source, &sinks, &mut AcceptAll)
}
