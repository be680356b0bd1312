// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! Constraint building by variable name.
//!
//! For programs translated by hand instead of from an ICFG:
//!
//! ```
//! use sse::manual::ManualEncoder;
//! use sse::solver::{NativeSolver, SatResult};
//!
//! // int* p = malloc(); *p = 5; int x = *p;
//! let mut enc = ManualEncoder::new(NativeSolver::new());
//! let p = enc.var("p");
//! let malloc = enc.object_address("malloc").unwrap();
//! enc.add(p.eq(&malloc));
//! enc.store(&p, &ManualEncoder::<NativeSolver>::int(5)).unwrap();
//! let x = enc.var("x");
//! let loaded = enc.load(&p).unwrap();
//! enc.add(x.eq(&loaded));
//! assert_eq!(enc.check(), SatResult::Sat);
//! assert_eq!(enc.value_of("x").unwrap().raw(), 5);
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::checker::{dump_objects, VarDump};
use crate::error::{Result, SseError};
use crate::ir::VarId;
use crate::memory::{MemoryModel, Value, DEFAULT_FIELD_STRIDE};
use crate::solver::{ConstraintSolver, SatResult};
use crate::term::{Formula, Term};

pub struct ManualEncoder<S: ConstraintSolver> {
    solver: S,
    memory: MemoryModel,
    /// Object name -> id used for its address slot.
    objects: HashMap<String, VarId>,
    object_names: BTreeMap<VarId, String>,
    vars: BTreeMap<String, Term>,
}

impl<S: ConstraintSolver> ManualEncoder<S> {
    pub fn new(solver: S) -> ManualEncoder<S> {
        ManualEncoder {
            solver,
            memory: MemoryModel::new(DEFAULT_FIELD_STRIDE),
            objects: HashMap::new(),
            object_names: BTreeMap::new(),
            vars: BTreeMap::new(),
        }
    }

    pub fn int(v: i64) -> Term {
        Term::int(v)
    }

    /// The symbol of the variable `name`.
    pub fn var(&mut self, name: &str) -> Term {
        self.vars
            .entry(name.to_owned())
            .or_insert_with(|| Term::symbol(name))
            .clone()
    }

    /// The virtual address of the memory object `name`.
    pub fn object_address(&mut self, name: &str) -> Result<Term> {
        let next = VarId(self.objects.len() as u32);
        let id = *self.objects.entry(name.to_owned()).or_insert(next);
        self.object_names.entry(id).or_insert_with(|| name.to_owned());
        Ok(Term::int(self.memory.object_address(id)? as i64))
    }

    /// Address `offset` fields after where `pointer` points to.
    pub fn field_address(&mut self, pointer: &Term, offset: i64) -> Result<Term> {
        let base = self.concretize(pointer)?;
        Ok(self.memory.field_address(base, offset)?.to_term())
    }

    pub fn store(&mut self, pointer: &Term, value: &Term) -> Result<()> {
        let addr = self.concretize(pointer)?;
        self.memory.store(addr, value)?;
        Ok(())
    }

    pub fn load(&mut self, pointer: &Term) -> Result<Term> {
        let addr = self.concretize(pointer)?;
        self.memory.load(addr)
    }

    pub fn add(&mut self, constraint: Formula) {
        self.solver.add(constraint);
    }

    pub fn check(&mut self) -> SatResult {
        self.solver.check()
    }

    pub fn get_solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    fn concretize(&mut self, t: &Term) -> Result<Value> {
        self.evaluate(t)
            .ok_or_else(|| SseError::Undetermined(t.to_string()))
    }

    /// Value of `t` in a model of the current constraints.
    pub fn evaluate(&mut self, t: &Term) -> Option<Value> {
        if let Some(v) = t.as_int() {
            return Some(Value::from_raw(v));
        }
        if self.solver.check() == SatResult::Unsat {
            return None;
        }
        self.solver.evaluate(t).map(Value::from_raw)
    }

    pub fn value_of(&mut self, name: &str) -> Option<Value> {
        let t = self.vars.get(name)?.clone();
        self.evaluate(&t)
    }

    /// Values of all named variables and objects.
    pub fn dump(&mut self) -> VarDump {
        let mut dump = VarDump::new();
        if self.solver.check() == SatResult::Unsat {
            return dump;
        }
        for (name, t) in self.vars.iter() {
            dump.push(name.clone(), self.solver.evaluate(t).map(Value::from_raw));
        }
        let names = &self.object_names;
        dump_objects(&self.memory, &mut self.solver, &mut dump, |obj| {
            names
                .get(&obj)
                .cloned()
                .unwrap_or_else(|| format!("ObjVar{}", obj))
        });
        dump
    }

    /// Name of the object an address belongs to.
    pub fn object_name(&self, addr: Value) -> Option<&str> {
        let Value::Address(a) = addr else {
            return None;
        };
        let (obj, _) = self.memory.object_at(a)?;
        self.object_names.get(&obj).map(|s| s.as_str())
    }

    pub fn reset(&mut self) {
        self.solver.reset();
        self.memory.reset();
        self.objects.clear();
        self.object_names.clear();
        self.vars.clear();
    }
}
