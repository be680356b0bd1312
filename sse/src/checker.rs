// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::fmt::Display;

use log::{debug, info, log_enabled, warn, Level};

use crate::encoder::PathEncoder;
use crate::error::{Result, SseError};
use crate::icfg::NodeId;
use crate::ir::VarId;
use crate::memory::{MemoryModel, Value};
use crate::solver::{ConstraintSolver, SatResult};
use crate::term::Term;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpEntry {
    pub name: String,
    /// `None` if the variable has no value (e.g. an object nothing was stored to).
    pub value: Option<Value>,
}

/// Values of all variables of an encoded path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VarDump {
    entries: Vec<DumpEntry>,
}

impl VarDump {
    pub fn new() -> VarDump {
        VarDump {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, name: String, value: Option<Value>) {
        self.entries.push(DumpEntry { name, value });
    }

    pub fn get_entries(&self) -> &[DumpEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Display for VarDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for e in self.entries.iter() {
            match e.value {
                Some(v) => writeln!(f, "{:<20}\tValue: {}", e.name, v)?,
                None => writeln!(f, "{:<20}\tValue: NULL", e.name)?,
            }
        }
        Ok(())
    }
}

/// Adds the content of every object with an address to `dump`.
pub fn dump_objects<S, F>(memory: &MemoryModel, solver: &mut S, dump: &mut VarDump, name_of: F)
where
    S: ConstraintSolver,
    F: Fn(VarId) -> String,
{
    for (obj, addr) in memory.allocated() {
        let value = if memory.is_stored(addr) {
            solver
                .evaluate(&memory.get_map().select(&Term::int(addr as i64)))
                .map(Value::from_raw)
        } else {
            None
        };
        dump.push(name_of(obj), value);
    }
}

/// Values of all variables bound on the encoded path.
pub fn dump_variables<S: ConstraintSolver>(encoder: &mut PathEncoder<'_, S>) -> VarDump {
    let mut dump = VarDump::new();
    if encoder.get_solver_mut().check() == SatResult::Unsat {
        return dump;
    }
    for (name, term) in encoder.bound_variables() {
        let value = encoder.get_solver_mut().evaluate(&term).map(Value::from_raw);
        dump.push(name, value);
    }
    let (memory, solver) = encoder.memory_and_solver();
    dump_objects(memory, solver, &mut dump, |obj| format!("ObjVar{}", obj));
    dump
}

/// Checks the assertion of a sink: its first argument must be greater than 0.
pub struct AssertionChecker {
    dump_on_failure: bool,
}

impl AssertionChecker {
    pub fn new(dump_on_failure: bool) -> AssertionChecker {
        AssertionChecker { dump_on_failure }
    }

    /// Checks the assertion at `sink` against the constraints of the encoded path.
    /// Fails if no model satisfies `arg > 0`.
    pub fn check<S: ConstraintSolver>(
        &self,
        encoder: &mut PathEncoder<'_, S>,
        sink: NodeId,
    ) -> Result<(Verdict, Option<VarDump>)> {
        let node = encoder
            .get_icfg()
            .get_node(sink)
            .ok_or(SseError::UnknownNode(sink))?;
        let Some(arg) = node.get_args().first() else {
            return Err(SseError::MissingSinkArgument(sink));
        };
        let cond = encoder.read(*arg)?;
        let res = encoder.get_solver_mut().probe(cond.gt(&Term::int(0)));
        if res != SatResult::Unsat {
            info!("Assertion at {} holds ({})", sink, res);
            return Ok((Verdict::Pass, None));
        }
        warn!("Assertion at {} can be violated", sink);
        if !self.dump_on_failure {
            if log_enabled!(Level::Debug) {
                debug!("Values on the failing path:\n{}", dump_variables(encoder));
            }
            return Ok((Verdict::Fail, None));
        }
        let dump = dump_variables(encoder);
        debug!("Values on the failing path:\n{}", dump);
        Ok((Verdict::Fail, Some(dump)))
    }
}
