// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! Translation of a single ICFG path into solver constraints.
//!
//! Every value variable is a solver symbol. An assignment creates a new
//! version of the symbol (`ValVar<id>_<n>`) and asserts it equal to the
//! assigned expression. Symbols are qualified by the call stack they are
//! bound in, so recursive activations of a function do not share values.
//! Variables bound by the source node (global initializers) live in the
//! root context and are visible everywhere.

use std::collections::{HashMap, HashSet};

use log::{debug, trace, warn};

use crate::call_stack::CallStack;
use crate::error::{Result, SseError};
use crate::explorer::IcfgPath;
use crate::icfg::{EdgeKind, Icfg, Node, NodeId};
use crate::ir::{BinaryOp, GepOffset, IndexOperand, Predicate, Statement, UnaryOp, VarId};
use crate::memory::{MemoryModel, Value};
use crate::solver::{ConstraintSolver, SatResult};
use crate::term::{ArithOp, BitOp, Cmp, Formula, Term};

type BindingKey = (CallStack, VarId);

/// How the encoder entered the node it currently handles.
#[derive(Clone, Debug)]
enum Entry {
    /// The path source or an intra-procedural edge.
    Flow,
    /// A call edge. Holds the context of the caller.
    Call(CallStack),
    /// A return edge. Holds the context of the callee.
    Return(CallStack),
}

/// Name of the solver symbol of `var` in the context `stack`.
pub fn value_var_name(stack: &CallStack, var: VarId) -> String {
    if stack.is_empty() {
        format!("ValVar{}", var)
    } else {
        format!("ValVar{}@{}", var, stack)
    }
}

fn versioned_name(stack: &CallStack, var: VarId, version: u32) -> String {
    if version == 0 {
        value_var_name(stack, var)
    } else {
        format!("{}_{}", value_var_name(stack, var), version)
    }
}

fn compare_of(pred: Predicate) -> Cmp {
    match pred {
        Predicate::Eq => Cmp::Eq,
        Predicate::Ne => Cmp::Ne,
        Predicate::Ugt | Predicate::Sgt => Cmp::Gt,
        Predicate::Uge | Predicate::Sge => Cmp::Ge,
        Predicate::Ult | Predicate::Slt => Cmp::Lt,
        Predicate::Ule | Predicate::Sle => Cmp::Le,
    }
}

fn bool_to_int(cond: &Formula) -> Term {
    Term::ite(cond, &Term::int(1), &Term::int(0))
}

pub struct PathEncoder<'g, S: ConstraintSolver> {
    icfg: &'g Icfg,
    solver: S,
    memory: MemoryModel,
    /// Current expression of each bound variable.
    bindings: HashMap<BindingKey, Term>,
    /// Latest version of each bound variable.
    versions: HashMap<BindingKey, u32>,
    /// Variables bound by the source node. Visible in every context.
    globals: HashSet<VarId>,
    in_source: bool,
    call_stack: CallStack,
    entered_by: Entry,
}

impl<'g, S: ConstraintSolver> PathEncoder<'g, S> {
    pub fn new(icfg: &'g Icfg, solver: S, field_stride: u32) -> PathEncoder<'g, S> {
        PathEncoder {
            icfg,
            solver,
            memory: MemoryModel::new(field_stride),
            bindings: HashMap::new(),
            versions: HashMap::new(),
            globals: HashSet::new(),
            in_source: false,
            call_stack: CallStack::new(),
            entered_by: Entry::Flow,
        }
    }

    pub fn get_icfg(&self) -> &'g Icfg {
        self.icfg
    }

    pub fn get_solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn get_memory(&self) -> &MemoryModel {
        &self.memory
    }

    pub fn memory_and_solver(&mut self) -> (&MemoryModel, &mut S) {
        (&self.memory, &mut self.solver)
    }

    pub fn get_call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Clears everything bound by the previous path.
    /// Object addresses stay assigned.
    pub fn reset_path(&mut self) {
        self.solver.reset();
        self.memory.reset_map();
        self.bindings.clear();
        self.versions.clear();
        self.globals.clear();
        self.in_source = false;
        self.call_stack = CallStack::new();
        self.entered_by = Entry::Flow;
    }

    /// Clears all state before an independent exploration.
    pub fn reset_exploration(&mut self) {
        self.reset_path();
        self.memory.reset();
    }

    fn key_of(&self, var: VarId) -> BindingKey {
        if self.in_source || self.globals.contains(&var) {
            (CallStack::new(), var)
        } else {
            (self.call_stack.clone(), var)
        }
    }

    /// The current expression of `var` in the current context.
    /// Unbound value variables become fresh, unconstrained symbols.
    pub fn read(&mut self, var: VarId) -> Result<Term> {
        if let Some(kind) = self.icfg.get_symbols().object(var) {
            return Ok(self.memory.address_of(var, kind)?.to_term());
        }
        let key = self.key_of(var);
        if let Some(t) = self.bindings.get(&key) {
            return Ok(t.clone());
        }
        let t = Term::symbol(&versioned_name(&key.0, var, 0));
        self.versions.insert(key.clone(), 0);
        self.bindings.insert(key, t.clone());
        Ok(t)
    }

    /// Reads `var` in the context `stack` instead of the current one.
    fn read_in(&mut self, stack: &CallStack, var: VarId) -> Result<Term> {
        let current = std::mem::replace(&mut self.call_stack, stack.clone());
        let res = self.read(var);
        self.call_stack = current;
        res
    }

    fn assign(&mut self, var: VarId, expr: Term) {
        if self.in_source {
            self.globals.insert(var);
        }
        let key = self.key_of(var);
        let version = self.versions.get(&key).map_or(0, |v| v + 1);
        let sym = Term::symbol(&versioned_name(&key.0, var, version));
        trace!("{} == {}", sym, expr);
        self.solver.add(sym.eq(&expr));
        self.versions.insert(key.clone(), version);
        self.bindings.insert(key, sym);
    }

    /// All bound value variables with their current expression, sorted by name.
    pub fn bound_variables(&self) -> Vec<(String, Term)> {
        let mut vars: Vec<(String, Term)> = self
            .bindings
            .iter()
            .map(|((stack, var), t)| (value_var_name(stack, *var), t.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    /// Concrete value of `term` under the current constraints.
    /// `None` if the constraints are unsatisfiable.
    pub fn concretize(&mut self, term: &Term) -> Result<Option<Value>> {
        if let Some(v) = term.as_int() {
            return Ok(Some(Value::from_raw(v)));
        }
        if self.solver.check() == SatResult::Unsat {
            return Ok(None);
        }
        match self.solver.evaluate(term) {
            Some(v) => Ok(Some(Value::from_raw(v))),
            None => Err(SseError::Undetermined(term.to_string())),
        }
    }

    /// Value of `var` as bound in the context `stack`.
    /// `None` if it is unbound or the constraints are unsatisfiable.
    pub fn evaluate_var(&mut self, stack: &CallStack, var: VarId) -> Result<Option<Value>> {
        let term = if let Some(kind) = self.icfg.get_symbols().object(var) {
            self.memory.address_of(var, kind)?.to_term()
        } else {
            match self.bindings.get(&(stack.clone(), var)) {
                Some(t) => t.clone(),
                None => return Ok(None),
            }
        };
        self.concretize(&term)
    }

    /// Encodes `path`. Returns false if the path is infeasible.
    pub fn encode(&mut self, path: &IcfgPath) -> Result<bool> {
        let icfg = self.icfg;
        self.reset_path();
        let source = icfg
            .get_node(path.get_source())
            .ok_or(SseError::UnknownNode(path.get_source()))?;
        self.in_source = true;
        let feasible = self.handle_node(source, None);
        self.in_source = false;
        if !feasible? {
            return Ok(false);
        }
        for edge in path.get_edges().iter() {
            let (from, to) = icfg
                .edge_endpoints(*edge)
                .ok_or(SseError::UnknownEdge(edge.index()))?;
            let kind = icfg
                .get_edge(*edge)
                .ok_or(SseError::UnknownEdge(edge.index()))?;
            if !self.handle_edge(from, to, kind)? {
                debug!("Path infeasible at edge {} -> {}", from, to);
                return Ok(false);
            }
            let node = icfg.get_node(to).ok_or(SseError::UnknownNode(to))?;
            if !self.handle_node(node, Some(from))? {
                debug!("Path infeasible at node {}", to);
                return Ok(false);
            }
        }
        match self.solver.check() {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown => {
                warn!(
                    "Solver '{}' could not decide the path constraints. Assume the path is feasible.",
                    self.solver.name()
                );
                Ok(true)
            }
        }
    }

    fn handle_edge(&mut self, from: NodeId, to: NodeId, kind: &EdgeKind) -> Result<bool> {
        self.entered_by = match kind {
            EdgeKind::Intra { .. } => Entry::Flow,
            EdgeKind::Call { .. } => Entry::Call(self.call_stack.clone()),
            EdgeKind::Return { .. } => Entry::Return(self.call_stack.clone()),
        };
        match kind {
            EdgeKind::Intra { condition: None } => Ok(true),
            EdgeKind::Intra {
                condition: Some(bc),
            } => {
                let cond = self.read(bc.cond)?;
                self.solver.add(cond.eq(&Term::int(bc.value)));
                Ok(true)
            }
            EdgeKind::Call {
                call_site,
                bindings,
            } => {
                let actuals = bindings
                    .iter()
                    .map(|b| self.read(b.actual))
                    .collect::<Result<Vec<Term>>>()?;
                self.call_stack = self.call_stack.push(*call_site);
                for (b, actual) in bindings.iter().zip(actuals) {
                    self.assign(b.formal, actual);
                }
                Ok(true)
            }
            EdgeKind::Return { call_site, binding } => {
                if self.call_stack.top() != Some(*call_site) {
                    return Err(SseError::CallStackMismatch {
                        from,
                        to,
                        expected: *call_site,
                        found: self
                            .call_stack
                            .top()
                            .map_or("empty".to_owned(), |s| s.to_string()),
                    });
                }
                let ret = match binding {
                    Some(b) => Some((b.result, self.read(b.value)?)),
                    None => None,
                };
                if let Some(caller) = self.call_stack.pop() {
                    self.call_stack = caller;
                }
                if let Some((result, value)) = ret {
                    self.assign(result, value);
                }
                Ok(true)
            }
        }
    }

    fn handle_node(&mut self, node: &Node, pred: Option<NodeId>) -> Result<bool> {
        for stmt in node.get_statements().iter() {
            if !self.handle_statement(node.get_id(), stmt, pred)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn handle_statement(
        &mut self,
        node: NodeId,
        stmt: &Statement,
        pred: Option<NodeId>,
    ) -> Result<bool> {
        trace!("{}: {}", node, stmt);
        match stmt {
            Statement::AddressOf { lhs, obj } => {
                let Some(kind) = self.icfg.get_symbols().object(*obj) else {
                    return Err(SseError::NotAnObject(*obj));
                };
                let addr = self.memory.address_of(*obj, kind)?;
                self.assign(*lhs, addr.to_term());
            }
            Statement::Copy { lhs, rhs } => {
                let v = self.read(*rhs)?;
                self.assign(*lhs, v);
            }
            Statement::Load { lhs, ptr } => {
                let p = self.read(*ptr)?;
                let Some(addr) = self.concretize(&p)? else {
                    return Ok(false);
                };
                let v = self.memory.load(addr)?;
                self.assign(*lhs, v);
            }
            Statement::Store { ptr, value } => {
                let p = self.read(*ptr)?;
                let Some(addr) = self.concretize(&p)? else {
                    return Ok(false);
                };
                let v = self.read(*value)?;
                self.memory.store(addr, &v)?;
            }
            Statement::FieldOffset { lhs, base, offset } => {
                let b = self.read(*base)?;
                let Some(base_addr) = self.concretize(&b)? else {
                    return Ok(false);
                };
                let Some(off) = self.gep_offset(offset)? else {
                    return Ok(false);
                };
                let addr = self.memory.field_address(base_addr, off)?;
                self.assign(*lhs, addr.to_term());
            }
            Statement::Binary { res, op, lhs, rhs } => {
                let a = self.read(*lhs)?;
                let b = self.read(*rhs)?;
                let v = match op {
                    BinaryOp::Add => a.add(&b),
                    BinaryOp::Sub => a.sub(&b),
                    BinaryOp::Mul => a.mul(&b),
                    BinaryOp::SDiv => Term::arith(ArithOp::Div, &a, &b),
                    BinaryOp::SRem => Term::arith(ArithOp::Rem, &a, &b),
                    BinaryOp::Xor => Term::bits(BitOp::Xor, &a, &b),
                    BinaryOp::And => Term::bits(BitOp::And, &a, &b),
                    BinaryOp::Or => Term::bits(BitOp::Or, &a, &b),
                    BinaryOp::AShr => Term::bits(BitOp::AShr, &a, &b),
                    BinaryOp::Shl => Term::bits(BitOp::Shl, &a, &b),
                };
                self.assign(*res, v);
            }
            Statement::Compare {
                res,
                pred: p,
                lhs,
                rhs,
            } => {
                let a = self.read(*lhs)?;
                let b = self.read(*rhs)?;
                self.assign(*res, bool_to_int(&a.cmp(compare_of(*p), &b)));
            }
            Statement::Unary { res, op, operand } => {
                let a = self.read(*operand)?;
                let v = match op {
                    UnaryOp::Neg => a.neg(),
                    UnaryOp::Not => bool_to_int(&a.eq(&Term::int(0))),
                    UnaryOp::BitNot => a.bit_not(),
                };
                self.assign(*res, v);
            }
            Statement::Branch { cond } => {
                // Constrained by the condition on the taken edge.
                trace!("Branch on v{} at {}", cond, node);
            }
            Statement::Select {
                res,
                cond,
                on_true,
                on_false,
            } => {
                let c = self.read(*cond)?;
                let t = self.read(*on_true)?;
                let f = self.read(*on_false)?;
                let is_true = c.eq(&Term::int(1));
                let v = if self.solver.probe(is_true.clone()) == SatResult::Unsat {
                    f
                } else if self.solver.probe(is_true.not()) == SatResult::Unsat {
                    t
                } else {
                    Term::ite(&is_true, &t, &f)
                };
                self.assign(*res, v);
            }
            Statement::Phi { res, incoming } => {
                let Some(pred) = pred else {
                    return Err(SseError::PhiWithoutPredecessor {
                        node,
                        res: *res,
                        pred: "path start".to_owned(),
                    });
                };
                let mut matching: Vec<VarId> = incoming
                    .iter()
                    .filter(|(_, p)| *p == pred)
                    .map(|(v, _)| *v)
                    .collect();
                matching.sort();
                matching.dedup();
                match matching.as_slice() {
                    [v] => {
                        let v = self.read(*v)?;
                        self.assign(*res, v);
                    }
                    [] => {
                        return Err(SseError::PhiWithoutPredecessor {
                            node,
                            res: *res,
                            pred: pred.to_string(),
                        })
                    }
                    _ => {
                        return Err(SseError::AmbiguousPhi {
                            node,
                            res: *res,
                            pred,
                            count: matching.len(),
                        })
                    }
                }
            }
            // Bindings in the node entered by a call or return. The bound
            // value lives in the context the edge came from.
            Statement::CallParamBind(b) => {
                let Entry::Call(caller) = self.entered_by.clone() else {
                    return Err(SseError::MisplacedBinding {
                        node,
                        stmt: stmt.to_string(),
                    });
                };
                let v = self.read_in(&caller, b.actual)?;
                self.assign(b.formal, v);
            }
            Statement::ReturnValueBind(b) => {
                let Entry::Return(callee) = self.entered_by.clone() else {
                    return Err(SseError::MisplacedBinding {
                        node,
                        stmt: stmt.to_string(),
                    });
                };
                let v = self.read_in(&callee, b.value)?;
                self.assign(b.result, v);
            }
        }
        Ok(true)
    }

    /// The flattened offset of a gep. `None` if the path became infeasible
    /// while evaluating a variable index.
    fn gep_offset(&mut self, offset: &GepOffset) -> Result<Option<i64>> {
        let indices = match offset {
            GepOffset::Field(f) => return Ok(Some(*f as i64)),
            GepOffset::Indexed(indices) => indices,
        };
        let mut sum: i64 = 0;
        for idx in indices.iter() {
            let i = match idx.index {
                IndexOperand::Const(c) => c,
                IndexOperand::Var(v) => {
                    let t = self.read(v)?;
                    match self.concretize(&t)? {
                        Some(val) => val.raw(),
                        None => return Ok(None),
                    }
                }
            };
            sum = i
                .checked_mul(idx.stride as i64)
                .and_then(|scaled| sum.checked_add(scaled))
                .ok_or(SseError::Undetermined(format!(
                    "gep offset {} * {} overflows",
                    i, idx.stride
                )))?;
        }
        Ok(Some(sum))
    }
}
