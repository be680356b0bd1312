// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! Z3 backend. Integers are mathematical integers, bitwise operations
//! go through 32bit bit-vectors and memory is an Int -> Int array.

use log::trace;
use z3::ast::{Array, Ast, Bool, Int, BV};
use z3::{Config, Context, Model, Solver, Sort};

use crate::solver::{ConstraintSolver, SatResult};
use crate::term::{ArithOp, ArrayKind, ArrayTerm, BitOp, Cmp, Formula, FormulaKind, Term, TermKind};

/// A context with model generation enabled.
/// It must outlive every [Z3Solver] created on it.
pub fn new_context() -> Context {
    let mut cfg = Config::new();
    cfg.set_model_generation(true);
    Context::new(&cfg)
}

pub struct Z3Solver<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    model: Option<Model<'ctx>>,
    num_constraints: usize,
    scopes: Vec<usize>,
}

impl<'ctx> Z3Solver<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Z3Solver<'ctx> {
        Z3Solver {
            ctx,
            solver: Solver::new(ctx),
            model: None,
            num_constraints: 0,
            scopes: Vec::new(),
        }
    }

    fn zero(&self) -> Int<'ctx> {
        Int::from_i64(self.ctx, 0)
    }

    /// Division rounding towards zero.
    fn sdiv(&self, a: &Int<'ctx>, b: &Int<'ctx>) -> Int<'ctx> {
        let zero = self.zero();
        let abs_a = a.ge(&zero).ite(a, &a.unary_minus());
        let abs_b = b.ge(&zero).ite(b, &b.unary_minus());
        let q = abs_a.div(&abs_b);
        a.ge(&zero)
            ._eq(&b.ge(&zero))
            .ite(&q, &q.unary_minus())
    }

    fn lower_term(&self, t: &Term) -> Int<'ctx> {
        match t.kind() {
            TermKind::Int(v) => Int::from_i64(self.ctx, *v),
            TermKind::Symbol(s) => Int::new_const(self.ctx, s.as_ref()),
            TermKind::Arith(op, a, b) => {
                let a = self.lower_term(a);
                let b = self.lower_term(b);
                match op {
                    ArithOp::Add => Int::add(self.ctx, &[&a, &b]),
                    ArithOp::Sub => Int::sub(self.ctx, &[&a, &b]),
                    ArithOp::Mul => Int::mul(self.ctx, &[&a, &b]),
                    ArithOp::Div => self.sdiv(&a, &b),
                    ArithOp::Rem => {
                        let q = self.sdiv(&a, &b);
                        Int::sub(self.ctx, &[&a, &Int::mul(self.ctx, &[&b, &q])])
                    }
                }
            }
            TermKind::Bits(op, a, b) => {
                let x = BV::from_int(&self.lower_term(a), 32);
                let y = BV::from_int(&self.lower_term(b), 32);
                let r = match op {
                    BitOp::And => x.bvand(&y),
                    BitOp::Or => x.bvor(&y),
                    BitOp::Xor => x.bvxor(&y),
                    BitOp::AShr => x.bvashr(&y),
                    BitOp::Shl => x.bvshl(&y),
                };
                Int::from_bv(&r, true)
            }
            TermKind::Neg(a) => self.lower_term(a).unary_minus(),
            TermKind::BitNot(a) => Int::from_bv(&BV::from_int(&self.lower_term(a), 32).bvnot(), true),
            TermKind::Ite(c, a, b) => self
                .lower_formula(c)
                .ite(&self.lower_term(a), &self.lower_term(b)),
            TermKind::Select(arr, idx) => {
                self.lower_array(arr)
                    .select(&self.lower_term(idx))
                    .as_int()
                    .expect("Memory arrays are declared Int -> Int")
            }
        }
    }

    fn lower_formula(&self, f: &Formula) -> Bool<'ctx> {
        match f.kind() {
            FormulaKind::Bool(b) => Bool::from_bool(self.ctx, *b),
            FormulaKind::Cmp(cmp, a, b) => {
                let a = self.lower_term(a);
                let b = self.lower_term(b);
                match cmp {
                    Cmp::Eq => a._eq(&b),
                    Cmp::Ne => a._eq(&b).not(),
                    Cmp::Gt => a.gt(&b),
                    Cmp::Ge => a.ge(&b),
                    Cmp::Lt => a.lt(&b),
                    Cmp::Le => a.le(&b),
                }
            }
            FormulaKind::Not(g) => self.lower_formula(g).not(),
            FormulaKind::And(fs) | FormulaKind::Or(fs) => {
                let lowered: Vec<Bool<'ctx>> = fs.iter().map(|g| self.lower_formula(g)).collect();
                let refs: Vec<&Bool<'ctx>> = lowered.iter().collect();
                if matches!(f.kind(), FormulaKind::And(_)) {
                    Bool::and(self.ctx, &refs)
                } else {
                    Bool::or(self.ctx, &refs)
                }
            }
        }
    }

    fn lower_array(&self, arr: &ArrayTerm) -> Array<'ctx> {
        match arr.kind() {
            ArrayKind::Symbol(name) => Array::new_const(
                self.ctx,
                name.as_ref(),
                &Sort::int(self.ctx),
                &Sort::int(self.ctx),
            ),
            ArrayKind::Store(inner, k, v) => self
                .lower_array(inner)
                .store(&self.lower_term(k), &self.lower_term(v)),
        }
    }
}

impl<'ctx> ConstraintSolver for Z3Solver<'ctx> {
    fn name(&self) -> &'static str {
        "z3"
    }

    fn add(&mut self, constraint: Formula) {
        self.model = None;
        let c = self.lower_formula(&constraint);
        trace!("z3 assert {}", c);
        self.solver.assert(&c);
        self.num_constraints += 1;
    }

    fn push(&mut self) {
        self.solver.push();
        self.scopes.push(self.num_constraints);
    }

    fn pop(&mut self) {
        let Some(n) = self.scopes.pop() else {
            panic!("pop() without matching push()");
        };
        self.model = None;
        self.solver.pop(1);
        self.num_constraints = n;
    }

    fn check(&mut self) -> SatResult {
        match self.solver.check() {
            z3::SatResult::Sat => {
                self.model = self.solver.get_model();
                SatResult::Sat
            }
            z3::SatResult::Unsat => {
                self.model = None;
                SatResult::Unsat
            }
            z3::SatResult::Unknown => {
                self.model = self.solver.get_model();
                SatResult::Unknown
            }
        }
    }

    fn evaluate(&mut self, term: &Term) -> Option<i64> {
        let model = self.model.as_ref()?;
        model.eval(&self.lower_term(term), true)?.as_i64()
    }

    fn reset(&mut self) {
        self.solver.reset();
        self.model = None;
        self.num_constraints = 0;
        self.scopes.clear();
    }

    fn num_constraints(&self) -> usize {
        self.num_constraints
    }
}
