// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

//! Statements attached to the ICFG and the variables they operate on.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display};

use crate::icfg::NodeId;

/// Identifier of a program variable.
/// Either a top-level value or a memory object (see [SymbolTable]).
#[derive(Clone, Copy, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct VarId(pub u32);

impl Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for VarId {
    fn from(value: u32) -> VarId {
        VarId(value)
    }
}

/// Kind of a memory object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Stack,
    Heap,
    Global,
    Function,
    /// A constant integer. Taking its "address" yields the constant itself.
    ConstInt(i64),
    /// The null pointer. Its address is 0.
    NullPtr,
}

impl ObjectKind {
    /// True if the object occupies a virtual address.
    pub fn is_location(&self) -> bool {
        !matches!(self, ObjectKind::ConstInt(_) | ObjectKind::NullPtr)
    }
}

/// All memory objects of a program. Every variable which is not
/// registered here is a top-level value variable.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    objects: BTreeMap<VarId, ObjectKind>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            objects: BTreeMap::new(),
        }
    }

    pub fn add_object(&mut self, var: VarId, kind: ObjectKind) {
        self.objects.insert(var, kind);
    }

    pub fn object(&self, var: VarId) -> Option<ObjectKind> {
        self.objects.get(&var).copied()
    }

    pub fn is_object(&self, var: VarId) -> bool {
        self.objects.contains_key(&var)
    }

    pub fn objects(&self) -> impl Iterator<Item = (VarId, ObjectKind)> + '_ {
        self.objects.iter().map(|(v, k)| (*v, *k))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    Xor,
    And,
    Or,
    AShr,
    Shl,
}

/// Integer compare predicates.
/// Signed and unsigned variants are the same comparison in the integer model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not. 1 if the operand is 0, otherwise 0.
    Not,
    /// 32bit bitwise not.
    BitNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexOperand {
    Const(i64),
    Var(VarId),
}

/// One index of a gep. The index is scaled by the flattened
/// element count of the indexed type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GepIndex {
    pub index: IndexOperand,
    pub stride: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GepOffset {
    /// Constant, already flattened field index.
    Field(u32),
    /// Sum of index * stride.
    Indexed(Vec<GepIndex>),
}

/// Binds a formal parameter of the callee to an actual argument of the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamBinding {
    pub actual: VarId,
    pub formal: VarId,
}

/// Binds the result variable of the caller to the value returned by the callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetBinding {
    pub value: VarId,
    pub result: VarId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    /// `lhs = &obj`
    AddressOf { lhs: VarId, obj: VarId },
    /// `lhs = rhs`
    Copy { lhs: VarId, rhs: VarId },
    /// `lhs = *ptr`
    Load { lhs: VarId, ptr: VarId },
    /// `*ptr = value`
    Store { ptr: VarId, value: VarId },
    /// `lhs = &base[offset]`
    FieldOffset {
        lhs: VarId,
        base: VarId,
        offset: GepOffset,
    },
    Binary {
        res: VarId,
        op: BinaryOp,
        lhs: VarId,
        rhs: VarId,
    },
    Compare {
        res: VarId,
        pred: Predicate,
        lhs: VarId,
        rhs: VarId,
    },
    Unary {
        res: VarId,
        op: UnaryOp,
        operand: VarId,
    },
    /// The branch instruction itself. The taken successor is
    /// constrained by the condition of the outgoing edge.
    Branch { cond: VarId },
    Select {
        res: VarId,
        cond: VarId,
        on_true: VarId,
        on_false: VarId,
    },
    /// SSA merge. Each operand is paired with the predecessor node it flows in from.
    Phi {
        res: VarId,
        incoming: Vec<(VarId, NodeId)>,
    },
    CallParamBind(ParamBinding),
    ReturnValueBind(RetBinding),
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::AddressOf { lhs, obj } => write!(f, "v{} = &o{}", lhs, obj),
            Statement::Copy { lhs, rhs } => write!(f, "v{} = v{}", lhs, rhs),
            Statement::Load { lhs, ptr } => write!(f, "v{} = *v{}", lhs, ptr),
            Statement::Store { ptr, value } => write!(f, "*v{} = v{}", ptr, value),
            Statement::FieldOffset { lhs, base, offset } => {
                write!(f, "v{} = gep v{}, {:?}", lhs, base, offset)
            }
            Statement::Binary { res, op, lhs, rhs } => {
                write!(f, "v{} = {:?} v{}, v{}", res, op, lhs, rhs)
            }
            Statement::Compare {
                res,
                pred,
                lhs,
                rhs,
            } => write!(f, "v{} = cmp {:?} v{}, v{}", res, pred, lhs, rhs),
            Statement::Unary { res, op, operand } => write!(f, "v{} = {:?} v{}", res, op, operand),
            Statement::Branch { cond } => write!(f, "br v{}", cond),
            Statement::Select {
                res,
                cond,
                on_true,
                on_false,
            } => write!(f, "v{} = v{} ? v{} : v{}", res, cond, on_true, on_false),
            Statement::Phi { res, incoming } => {
                write!(f, "v{} = phi", res)?;
                for (v, pred) in incoming.iter() {
                    write!(f, " [v{}, {}]", v, pred)?;
                }
                Ok(())
            }
            Statement::CallParamBind(b) => write!(f, "v{} <- v{} (param)", b.formal, b.actual),
            Statement::ReturnValueBind(b) => write!(f, "v{} <- v{} (ret)", b.result, b.value),
        }
    }
}
