// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! Solver independent constraint language.
//!
//! Integer terms, boolean formulas over them and integer -> integer arrays.
//! All nodes are reference counted, so cloning a term is cheap and
//! sub-terms are shared between constraints.

use std::fmt::Display;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// Signed division, rounding towards zero.
    Div,
    /// Signed remainder. Has the sign of the dividend.
    Rem,
}

/// Bitwise operations. The operands are reinterpreted as
/// 32bit bit-vectors and the result is converted back signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    AShr,
    Shl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Cmp {
    pub fn holds(&self, a: i64, b: i64) -> bool {
        match self {
            Cmp::Eq => a == b,
            Cmp::Ne => a != b,
            Cmp::Gt => a > b,
            Cmp::Ge => a >= b,
            Cmp::Lt => a < b,
            Cmp::Le => a <= b,
        }
    }

    /// The comparison which holds exactly if `self` does not.
    pub fn negate(&self) -> Cmp {
        match self {
            Cmp::Eq => Cmp::Ne,
            Cmp::Ne => Cmp::Eq,
            Cmp::Gt => Cmp::Le,
            Cmp::Ge => Cmp::Lt,
            Cmp::Lt => Cmp::Ge,
            Cmp::Le => Cmp::Gt,
        }
    }

    /// The comparison with swapped operands: `a < b` <=> `b > a`.
    pub fn flip(&self) -> Cmp {
        match self {
            Cmp::Eq => Cmp::Eq,
            Cmp::Ne => Cmp::Ne,
            Cmp::Gt => Cmp::Lt,
            Cmp::Ge => Cmp::Le,
            Cmp::Lt => Cmp::Gt,
            Cmp::Le => Cmp::Ge,
        }
    }
}

pub enum TermKind {
    Int(i64),
    Symbol(Rc<str>),
    Arith(ArithOp, Term, Term),
    Bits(BitOp, Term, Term),
    Neg(Term),
    /// 32bit bitwise not.
    BitNot(Term),
    Ite(Formula, Term, Term),
    Select(ArrayTerm, Term),
}

#[derive(Clone)]
pub struct Term(Rc<TermKind>);

pub enum FormulaKind {
    Bool(bool),
    Cmp(Cmp, Term, Term),
    Not(Formula),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

#[derive(Clone)]
pub struct Formula(Rc<FormulaKind>);

pub enum ArrayKind {
    Symbol(Rc<str>),
    Store(ArrayTerm, Term, Term),
}

#[derive(Clone)]
pub struct ArrayTerm(Rc<ArrayKind>);

impl Term {
    fn new(kind: TermKind) -> Term {
        Term(Rc::new(kind))
    }

    pub fn kind(&self) -> &TermKind {
        &self.0
    }

    pub fn int(v: i64) -> Term {
        Term::new(TermKind::Int(v))
    }

    pub fn symbol(name: &str) -> Term {
        Term::new(TermKind::Symbol(Rc::from(name)))
    }

    /// The constant value if this term is a literal.
    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            TermKind::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn arith(op: ArithOp, a: &Term, b: &Term) -> Term {
        Term::new(TermKind::Arith(op, a.clone(), b.clone()))
    }

    pub fn bits(op: BitOp, a: &Term, b: &Term) -> Term {
        Term::new(TermKind::Bits(op, a.clone(), b.clone()))
    }

    pub fn add(&self, other: &Term) -> Term {
        Term::arith(ArithOp::Add, self, other)
    }

    pub fn sub(&self, other: &Term) -> Term {
        Term::arith(ArithOp::Sub, self, other)
    }

    pub fn mul(&self, other: &Term) -> Term {
        Term::arith(ArithOp::Mul, self, other)
    }

    pub fn neg(&self) -> Term {
        Term::new(TermKind::Neg(self.clone()))
    }

    pub fn bit_not(&self) -> Term {
        Term::new(TermKind::BitNot(self.clone()))
    }

    pub fn ite(cond: &Formula, then: &Term, otherwise: &Term) -> Term {
        Term::new(TermKind::Ite(cond.clone(), then.clone(), otherwise.clone()))
    }

    pub fn cmp(&self, cmp: Cmp, other: &Term) -> Formula {
        Formula::new(FormulaKind::Cmp(cmp, self.clone(), other.clone()))
    }

    pub fn eq(&self, other: &Term) -> Formula {
        self.cmp(Cmp::Eq, other)
    }

    pub fn ne(&self, other: &Term) -> Formula {
        self.cmp(Cmp::Ne, other)
    }

    pub fn gt(&self, other: &Term) -> Formula {
        self.cmp(Cmp::Gt, other)
    }

    pub fn ge(&self, other: &Term) -> Formula {
        self.cmp(Cmp::Ge, other)
    }

    pub fn lt(&self, other: &Term) -> Formula {
        self.cmp(Cmp::Lt, other)
    }

    pub fn le(&self, other: &Term) -> Formula {
        self.cmp(Cmp::Le, other)
    }
}

impl Formula {
    fn new(kind: FormulaKind) -> Formula {
        Formula(Rc::new(kind))
    }

    pub fn kind(&self) -> &FormulaKind {
        &self.0
    }

    pub fn bool(b: bool) -> Formula {
        Formula::new(FormulaKind::Bool(b))
    }

    pub fn not(&self) -> Formula {
        Formula::new(FormulaKind::Not(self.clone()))
    }

    pub fn and(fs: Vec<Formula>) -> Formula {
        Formula::new(FormulaKind::And(fs))
    }

    pub fn or(fs: Vec<Formula>) -> Formula {
        Formula::new(FormulaKind::Or(fs))
    }
}

impl ArrayTerm {
    pub fn kind(&self) -> &ArrayKind {
        &self.0
    }

    pub fn symbol(name: &str) -> ArrayTerm {
        ArrayTerm(Rc::new(ArrayKind::Symbol(Rc::from(name))))
    }

    /// A new array version which maps `idx` to `val`.
    pub fn store(&self, idx: &Term, val: &Term) -> ArrayTerm {
        ArrayTerm(Rc::new(ArrayKind::Store(
            self.clone(),
            idx.clone(),
            val.clone(),
        )))
    }

    pub fn select(&self, idx: &Term) -> Term {
        Term::new(TermKind::Select(self.clone(), idx.clone()))
    }

    /// Number of stores on top of the base array.
    pub fn version(&self) -> usize {
        let mut n = 0;
        let mut cur = self;
        while let ArrayKind::Store(inner, _, _) = cur.kind() {
            n += 1;
            cur = inner;
        }
        n
    }
}

fn fmt_int(f: &mut std::fmt::Formatter<'_>, v: i64) -> std::fmt::Result {
    if v < 0 {
        write!(f, "(- {})", v.unsigned_abs())
    } else {
        write!(f, "{}", v)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            TermKind::Int(v) => fmt_int(f, *v),
            TermKind::Symbol(s) => write!(f, "{}", s),
            TermKind::Arith(op, a, b) => {
                let op = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "sdiv",
                    ArithOp::Rem => "srem",
                };
                write!(f, "({} {} {})", op, a, b)
            }
            TermKind::Bits(op, a, b) => {
                let op = match op {
                    BitOp::And => "bvand",
                    BitOp::Or => "bvor",
                    BitOp::Xor => "bvxor",
                    BitOp::AShr => "bvashr",
                    BitOp::Shl => "bvshl",
                };
                write!(f, "(bv2int ({} {} {}))", op, a, b)
            }
            TermKind::Neg(a) => write!(f, "(- {})", a),
            TermKind::BitNot(a) => write!(f, "(bv2int (bvnot {}))", a),
            TermKind::Ite(c, a, b) => write!(f, "(ite {} {} {})", c, a, b),
            TermKind::Select(m, i) => write!(f, "(select {} {})", m, i),
        }
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            FormulaKind::Bool(b) => write!(f, "{}", b),
            FormulaKind::Cmp(cmp, a, b) => {
                let op = match cmp {
                    Cmp::Eq => "=",
                    Cmp::Gt => ">",
                    Cmp::Ge => ">=",
                    Cmp::Lt => "<",
                    Cmp::Le => "<=",
                    Cmp::Ne => "distinct",
                };
                write!(f, "({} {} {})", op, a, b)
            }
            FormulaKind::Not(a) => write!(f, "(not {})", a),
            FormulaKind::And(fs) | FormulaKind::Or(fs) => {
                let op = if matches!(self.kind(), FormulaKind::And(_)) {
                    "and"
                } else {
                    "or"
                };
                write!(f, "({}", op)?;
                for sub in fs.iter() {
                    write!(f, " {}", sub)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for ArrayTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            ArrayKind::Symbol(s) => write!(f, "{}", s),
            ArrayKind::Store(m, i, v) => write!(f, "(store {} {} {})", m, i, v),
        }
    }
}
