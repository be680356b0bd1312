// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! A small solver for the constraints path encoding produces.
//!
//! Path constraints are mostly definitions `x == expr` which are solved
//! by propagation. The value ranges of atoms which stay undefined (program
//! inputs, memory cells never stored to) are narrowed by the comparisons
//! over them, including the conditions of `ite(cond, 1, 0)` compare results.
//! An empty range refutes the constraints. The remaining atoms are guessed
//! from their range bounds and a candidate set derived from the constants
//! in the constraints. The search is bounded.
//!
//! Unsat is only reported if the constraints are refuted without any guess.
//! A failed or exhausted search is reported as unknown.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use log::trace;

use crate::solver::{ConstraintSolver, SatResult};
use crate::term::{ArithOp, ArrayKind, ArrayTerm, BitOp, Cmp, Formula, FormulaKind, Term, TermKind};

/// Default number of search nodes per check.
pub const DEFAULT_SEARCH_BUDGET: usize = 4096;
/// Maximum number of values tried for a free atom.
const MAX_CANDIDATES: usize = 64;
/// Passes over all constraints while narrowing ranges.
/// Bounds cyclic narrowing like `x > y, y > x`.
const MAX_NARROWING_ROUNDS: usize = 32;

/// Something a model assigns a value to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Atom {
    Symbol(Rc<str>),
    /// Cell of a base array which no store covers.
    Cell(Rc<str>, i64),
}

/// Reasons an expression has no value (yet).
enum Stuck {
    Free(Atom),
    /// Overflow or division by zero.
    Undefined,
}

type Eval<T> = std::result::Result<T, Stuck>;

/// No value satisfies a constraint.
struct Refuted;

type Narrowed = std::result::Result<bool, Refuted>;

/// Inclusive value range. `i64::MIN` and `i64::MAX` also stand for unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Interval {
    lo: i64,
    hi: i64,
}

impl Interval {
    const FULL: Interval = Interval {
        lo: i64::MIN,
        hi: i64::MAX,
    };

    fn point(v: i64) -> Interval {
        Interval { lo: v, hi: v }
    }

    fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    fn contains(&self, v: i64) -> bool {
        self.lo <= v && v <= self.hi
    }

    fn as_point(&self) -> Option<i64> {
        (self.lo == self.hi).then_some(self.lo)
    }

    fn intersect(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo.max(other.lo),
            hi: self.hi.min(other.hi),
        }
    }

    fn hull(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    /// Values of `self` for which `x cmp y` holds with some `y` of `other`.
    fn restrict(&self, cmp: Cmp, other: &Interval) -> Interval {
        let (lo, hi) = match cmp {
            Cmp::Eq => return self.intersect(other),
            Cmp::Gt => (self.lo.max(other.lo.saturating_add(1)), self.hi),
            Cmp::Ge => (self.lo.max(other.lo), self.hi),
            Cmp::Lt => (self.lo, self.hi.min(other.hi.saturating_sub(1))),
            Cmp::Le => (self.lo, self.hi.min(other.hi)),
            Cmp::Ne => match other.as_point() {
                Some(p) if self.as_point() == Some(p) => (1, 0),
                Some(p) if p == self.lo => (self.lo.saturating_add(1), self.hi),
                Some(p) if p == self.hi => (self.lo, self.hi.saturating_sub(1)),
                _ => (self.lo, self.hi),
            },
        };
        Interval { lo, hi }
    }

    /// `self - k` with bounds clamped to the i64 range.
    fn shift_down(&self, k: i64) -> Interval {
        Interval {
            lo: if self.lo == i64::MIN { i64::MIN } else { self.lo.saturating_sub(k) },
            hi: if self.hi == i64::MAX { i64::MAX } else { self.hi.saturating_sub(k) },
        }
    }
}

type Bounds = HashMap<Atom, Interval>;

fn to_bv32(v: i64) -> u32 {
    v as u32
}

fn from_bv32(v: u32) -> i64 {
    v as i32 as i64
}

fn eval_arith(op: ArithOp, a: i64, b: i64) -> Option<i64> {
    match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => a.checked_div(b),
        ArithOp::Rem => a.checked_rem(b),
    }
}

fn eval_bits(op: BitOp, a: i64, b: i64) -> i64 {
    let (x, y) = (to_bv32(a), to_bv32(b));
    let res = match op {
        BitOp::And => x & y,
        BitOp::Or => x | y,
        BitOp::Xor => x ^ y,
        BitOp::AShr => {
            if y >= 32 {
                if (x as i32) < 0 {
                    u32::MAX
                } else {
                    0
                }
            } else {
                ((x as i32) >> y) as u32
            }
        }
        BitOp::Shl => {
            if y >= 32 {
                0
            } else {
                x << y
            }
        }
    };
    from_bv32(res)
}

#[derive(Clone, Default)]
struct Assignment {
    atoms: HashMap<Atom, i64>,
    /// If set, unassigned atoms evaluate to 0.
    complete: bool,
}

impl Assignment {
    fn lookup(&self, atom: Atom) -> Eval<i64> {
        match self.atoms.get(&atom) {
            Some(v) => Ok(*v),
            None if self.complete => Ok(0),
            None => Err(Stuck::Free(atom)),
        }
    }

    fn eval_term(&self, t: &Term) -> Eval<i64> {
        match t.kind() {
            TermKind::Int(v) => Ok(*v),
            TermKind::Symbol(s) => self.lookup(Atom::Symbol(s.clone())),
            TermKind::Arith(op, a, b) => {
                let a = self.eval_term(a)?;
                let b = self.eval_term(b)?;
                eval_arith(*op, a, b).ok_or(Stuck::Undefined)
            }
            TermKind::Bits(op, a, b) => {
                let a = self.eval_term(a)?;
                let b = self.eval_term(b)?;
                Ok(eval_bits(*op, a, b))
            }
            TermKind::Neg(a) => self.eval_term(a)?.checked_neg().ok_or(Stuck::Undefined),
            TermKind::BitNot(a) => Ok(from_bv32(!to_bv32(self.eval_term(a)?))),
            TermKind::Ite(c, a, b) => {
                if self.eval_formula(c)? {
                    self.eval_term(a)
                } else {
                    self.eval_term(b)
                }
            }
            TermKind::Select(arr, idx) => {
                let i = self.eval_term(idx)?;
                self.eval_select(arr, i)
            }
        }
    }

    fn eval_select(&self, arr: &ArrayTerm, idx: i64) -> Eval<i64> {
        let mut cur = arr;
        loop {
            match cur.kind() {
                ArrayKind::Store(inner, k, v) => {
                    if self.eval_term(k)? == idx {
                        return self.eval_term(v);
                    }
                    cur = inner;
                }
                ArrayKind::Symbol(name) => return self.lookup(Atom::Cell(name.clone(), idx)),
            }
        }
    }

    fn eval_formula(&self, f: &Formula) -> Eval<bool> {
        match f.kind() {
            FormulaKind::Bool(b) => Ok(*b),
            FormulaKind::Cmp(cmp, a, b) => {
                let a = self.eval_term(a)?;
                let b = self.eval_term(b)?;
                Ok(cmp.holds(a, b))
            }
            FormulaKind::Not(g) => Ok(!self.eval_formula(g)?),
            FormulaKind::And(fs) => self.eval_junction(fs, false),
            FormulaKind::Or(fs) => self.eval_junction(fs, true),
        }
    }

    /// Evaluates a conjunction (`decisive == false`) or disjunction (`decisive == true`).
    /// A single decisive operand decides the result even if others are stuck.
    fn eval_junction(&self, fs: &[Formula], decisive: bool) -> Eval<bool> {
        let mut stuck = None;
        for g in fs.iter() {
            match self.eval_formula(g) {
                Ok(b) if b == decisive => return Ok(decisive),
                Ok(_) => (),
                Err(s) => {
                    if stuck.is_none() {
                        stuck = Some(s)
                    }
                }
            }
        }
        match stuck {
            Some(s) => Err(s),
            None => Ok(!decisive),
        }
    }

    /// The atom `t` denotes, if `t` is an atom without a value.
    fn unassigned_atom(&self, t: &Term) -> Option<Atom> {
        let atom = match t.kind() {
            TermKind::Symbol(s) => Atom::Symbol(s.clone()),
            TermKind::Select(arr, idx) => {
                let i = self.eval_term(idx).ok()?;
                let mut cur = arr;
                loop {
                    match cur.kind() {
                        ArrayKind::Store(inner, k, _) => {
                            if self.eval_term(k).ok()? == i {
                                return None;
                            }
                            cur = inner;
                        }
                        ArrayKind::Symbol(name) => break Atom::Cell(name.clone(), i),
                    }
                }
            }
            _ => return None,
        };
        if self.atoms.contains_key(&atom) {
            return None;
        }
        Some(atom)
    }

    /// Assigns atoms defined by equalities until nothing changes.
    fn propagate(&mut self, constraints: &[Formula]) {
        loop {
            let mut changed = false;
            for c in constraints.iter() {
                let FormulaKind::Cmp(Cmp::Eq, l, r) = c.kind() else {
                    continue;
                };
                if let Some(atom) = self.unassigned_atom(l) {
                    if let Ok(v) = self.eval_term(r) {
                        self.atoms.insert(atom, v);
                        changed = true;
                        continue;
                    }
                }
                if let Some(atom) = self.unassigned_atom(r) {
                    if let Ok(v) = self.eval_term(l) {
                        self.atoms.insert(atom, v);
                        changed = true;
                    }
                }
            }
            if !changed {
                return;
            }
        }
    }

    /// Over-approximation of the values `t` can take.
    fn range(&self, t: &Term, bounds: &Bounds) -> Interval {
        if let Ok(v) = self.eval_term(t) {
            return Interval::point(v);
        }
        if let Some(atom) = self.unassigned_atom(t) {
            return bounds.get(&atom).copied().unwrap_or(Interval::FULL);
        }
        match t.kind() {
            TermKind::Ite(_, a, b) => self.range(a, bounds).hull(&self.range(b, bounds)),
            TermKind::Arith(op @ (ArithOp::Add | ArithOp::Sub), a, b) => {
                let (ra, rb) = (self.range(a, bounds), self.range(b, bounds));
                let (lo, hi) = if *op == ArithOp::Add {
                    (ra.lo.checked_add(rb.lo), ra.hi.checked_add(rb.hi))
                } else {
                    (ra.lo.checked_sub(rb.hi), ra.hi.checked_sub(rb.lo))
                };
                match (lo, hi) {
                    (Some(lo), Some(hi)) => Interval { lo, hi },
                    _ => Interval::FULL,
                }
            }
            _ => Interval::FULL,
        }
    }

    /// Narrows the ranges of unassigned atoms to what `f` evaluating to
    /// `holds` allows. Returns whether a range changed.
    fn narrow(&self, f: &Formula, holds: bool, bounds: &mut Bounds) -> Narrowed {
        match f.kind() {
            FormulaKind::Bool(b) => {
                if *b == holds {
                    Ok(false)
                } else {
                    Err(Refuted)
                }
            }
            FormulaKind::Not(g) => self.narrow(g, !holds, bounds),
            // Every operand of a true conjunction (false disjunction) is decided.
            FormulaKind::And(fs) | FormulaKind::Or(fs)
                if holds == matches!(f.kind(), FormulaKind::And(_)) =>
            {
                let mut changed = false;
                for g in fs.iter() {
                    changed |= self.narrow(g, holds, bounds)?;
                }
                Ok(changed)
            }
            FormulaKind::And(_) | FormulaKind::Or(_) => Ok(false),
            FormulaKind::Cmp(cmp, a, b) => {
                let cmp = if holds { *cmp } else { cmp.negate() };
                let (ra, rb) = (self.range(a, bounds), self.range(b, bounds));
                if ra.restrict(cmp, &rb).is_empty() {
                    return Err(Refuted);
                }
                let mut changed = self.narrow_term(a, ra.restrict(cmp, &rb), bounds)?;
                let (ra, rb) = (self.range(a, bounds), self.range(b, bounds));
                changed |= self.narrow_term(b, rb.restrict(cmp.flip(), &ra), bounds)?;
                Ok(changed)
            }
        }
    }

    /// Narrows what `t` is built of to values which let `t` lie in `allowed`.
    fn narrow_term(&self, t: &Term, allowed: Interval, bounds: &mut Bounds) -> Narrowed {
        if allowed.is_empty() {
            return Err(Refuted);
        }
        if let Some(atom) = self.unassigned_atom(t) {
            let cur = bounds.get(&atom).copied().unwrap_or(Interval::FULL);
            let next = cur.intersect(&allowed);
            if next.is_empty() {
                return Err(Refuted);
            }
            if next == cur {
                return Ok(false);
            }
            bounds.insert(atom, next);
            return Ok(true);
        }
        match t.kind() {
            TermKind::Ite(cond, a, b) => {
                let a_fits = !self.range(a, bounds).intersect(&allowed).is_empty();
                let b_fits = !self.range(b, bounds).intersect(&allowed).is_empty();
                match (a_fits, b_fits) {
                    (false, false) => Err(Refuted),
                    (true, false) => {
                        let changed = self.narrow(cond, true, bounds)?;
                        Ok(self.narrow_term(a, allowed, bounds)? | changed)
                    }
                    (false, true) => {
                        let changed = self.narrow(cond, false, bounds)?;
                        Ok(self.narrow_term(b, allowed, bounds)? | changed)
                    }
                    (true, true) => Ok(false),
                }
            }
            TermKind::Arith(ArithOp::Add, a, b) => {
                if let Ok(k) = self.eval_term(b) {
                    self.narrow_term(a, allowed.shift_down(k), bounds)
                } else if let Ok(k) = self.eval_term(a) {
                    self.narrow_term(b, allowed.shift_down(k), bounds)
                } else {
                    Ok(false)
                }
            }
            _ => Ok(false),
        }
    }

    /// Ranges of the unassigned atoms implied by `constraints`.
    fn narrow_all(&self, constraints: &[Formula]) -> std::result::Result<Bounds, Refuted> {
        let mut bounds = Bounds::new();
        for _ in 0..MAX_NARROWING_ROUNDS {
            let mut changed = false;
            for c in constraints.iter() {
                changed |= self.narrow(c, true, &mut bounds)?;
            }
            if !changed {
                break;
            }
        }
        Ok(bounds)
    }
}

enum Outcome {
    Sat(Assignment),
    Conflict,
    GaveUp,
}

fn collect_term_consts(t: &Term, out: &mut BTreeSet<i64>) {
    match t.kind() {
        TermKind::Int(v) => {
            out.insert(*v);
        }
        TermKind::Symbol(_) => (),
        TermKind::Arith(_, a, b) | TermKind::Bits(_, a, b) => {
            collect_term_consts(a, out);
            collect_term_consts(b, out);
        }
        TermKind::Neg(a) | TermKind::BitNot(a) => collect_term_consts(a, out),
        TermKind::Ite(c, a, b) => {
            collect_formula_consts(c, out);
            collect_term_consts(a, out);
            collect_term_consts(b, out);
        }
        TermKind::Select(arr, idx) => {
            collect_term_consts(idx, out);
            let mut cur = arr;
            while let ArrayKind::Store(inner, k, v) = cur.kind() {
                collect_term_consts(k, out);
                collect_term_consts(v, out);
                cur = inner;
            }
        }
    }
}

fn collect_formula_consts(f: &Formula, out: &mut BTreeSet<i64>) {
    match f.kind() {
        FormulaKind::Bool(_) => (),
        FormulaKind::Cmp(_, a, b) => {
            collect_term_consts(a, out);
            collect_term_consts(b, out);
        }
        FormulaKind::Not(g) => collect_formula_consts(g, out),
        FormulaKind::And(fs) | FormulaKind::Or(fs) => {
            for g in fs.iter() {
                collect_formula_consts(g, out);
            }
        }
    }
}

/// Splits top level conjunctions.
fn flatten(f: &Formula, out: &mut Vec<Formula>) {
    match f.kind() {
        FormulaKind::And(fs) => {
            for g in fs.iter() {
                flatten(g, out);
            }
        }
        _ => out.push(f.clone()),
    }
}

pub struct NativeSolver {
    assertions: Vec<Formula>,
    /// Number of assertions at each open scope.
    scopes: Vec<usize>,
    model: Option<Assignment>,
    search_budget: usize,
}

impl NativeSolver {
    pub fn new() -> NativeSolver {
        NativeSolver::with_budget(DEFAULT_SEARCH_BUDGET)
    }

    pub fn with_budget(search_budget: usize) -> NativeSolver {
        NativeSolver {
            assertions: Vec::new(),
            scopes: Vec::new(),
            model: None,
            search_budget,
        }
    }

    fn candidates(constraints: &[Formula]) -> Vec<i64> {
        let mut consts = BTreeSet::new();
        for c in constraints.iter() {
            collect_formula_consts(c, &mut consts);
        }
        let mut cands = vec![0, 1, -1];
        for c in consts.iter() {
            for v in [Some(*c), c.checked_sub(1), c.checked_add(1)].into_iter().flatten() {
                if !cands.contains(&v) {
                    cands.push(v);
                }
            }
        }
        cands.truncate(MAX_CANDIDATES);
        cands
    }

    fn search(
        constraints: &[Formula],
        mut asg: Assignment,
        candidates: &[i64],
        budget: &mut usize,
    ) -> Outcome {
        if *budget == 0 {
            return Outcome::GaveUp;
        }
        *budget -= 1;
        asg.propagate(constraints);
        // Atoms with a single possible value are decided, not guessed.
        let bounds = loop {
            let Ok(bounds) = asg.narrow_all(constraints) else {
                return Outcome::Conflict;
            };
            let forced: Vec<(Atom, i64)> = bounds
                .iter()
                .filter_map(|(atom, r)| r.as_point().map(|v| (atom.clone(), v)))
                .collect();
            if forced.is_empty() {
                break bounds;
            }
            asg.atoms.extend(forced);
            asg.propagate(constraints);
        };

        let mut free = None;
        let mut undefined = false;
        for c in constraints.iter() {
            match asg.eval_formula(c) {
                Ok(true) => (),
                Ok(false) => return Outcome::Conflict,
                Err(Stuck::Free(atom)) => {
                    if free.is_none() {
                        free = Some(atom);
                    }
                }
                Err(Stuck::Undefined) => undefined = true,
            }
        }
        let Some(atom) = free else {
            return if undefined {
                Outcome::GaveUp
            } else {
                Outcome::Sat(asg)
            };
        };
        let range = bounds.get(&atom).copied().unwrap_or(Interval::FULL);
        let mut tries: Vec<i64> = Vec::new();
        for v in [range.lo, range.hi].into_iter().chain(candidates.iter().copied()) {
            if v != i64::MIN && v != i64::MAX && range.contains(v) && !tries.contains(&v) {
                tries.push(v);
            }
        }
        trace!("Guess {:?} in [{}, {}]", atom, range.lo, range.hi);
        for cand in tries.iter() {
            let mut next = asg.clone();
            next.atoms.insert(atom.clone(), *cand);
            match NativeSolver::search(constraints, next, candidates, budget) {
                Outcome::Sat(m) => return Outcome::Sat(m),
                Outcome::Conflict => continue,
                Outcome::GaveUp => {
                    if *budget == 0 {
                        return Outcome::GaveUp;
                    }
                }
            }
        }
        Outcome::GaveUp
    }
}

impl ConstraintSolver for NativeSolver {
    fn name(&self) -> &'static str {
        "native"
    }

    fn add(&mut self, constraint: Formula) {
        self.model = None;
        self.assertions.push(constraint);
    }

    fn push(&mut self) {
        self.scopes.push(self.assertions.len());
    }

    fn pop(&mut self) {
        let Some(len) = self.scopes.pop() else {
            panic!("pop() without matching push()");
        };
        self.model = None;
        self.assertions.truncate(len);
    }

    fn check(&mut self) -> SatResult {
        let mut constraints = Vec::with_capacity(self.assertions.len());
        for a in self.assertions.iter() {
            flatten(a, &mut constraints);
        }
        let candidates = NativeSolver::candidates(&constraints);
        let mut base = Assignment::default();
        base.propagate(&constraints);
        let mut budget = self.search_budget;
        let res = match NativeSolver::search(&constraints, base.clone(), &candidates, &mut budget) {
            Outcome::Sat(mut m) => {
                m.complete = true;
                self.model = Some(m);
                SatResult::Sat
            }
            Outcome::Conflict => {
                self.model = None;
                SatResult::Unsat
            }
            Outcome::GaveUp => {
                self.model = Some(base);
                SatResult::Unknown
            }
        };
        trace!(
            "check() over {} constraints: {} ({} search nodes)",
            constraints.len(),
            res,
            self.search_budget - budget
        );
        res
    }

    fn evaluate(&mut self, term: &Term) -> Option<i64> {
        self.model.as_ref()?.eval_term(term).ok()
    }

    fn reset(&mut self) {
        self.assertions.clear();
        self.scopes.clear();
        self.model = None;
    }

    fn num_constraints(&self) -> usize {
        self.assertions.len()
    }
}
