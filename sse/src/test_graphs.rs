// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use crate::{
    icfg::{Icfg, NodeId, NodeKind},
    ir::{
        BinaryOp, GepIndex, GepOffset, IndexOperand, ObjectKind, ParamBinding, Predicate,
        RetBinding, Statement, VarId,
    },
};

pub fn n(id: u32) -> NodeId {
    NodeId(id)
}

pub fn v(id: u32) -> VarId {
    VarId(id)
}

/// Value variables bound to constants in the global node.
pub const C0: u32 = 900;
pub const C1: u32 = 901;
pub const C2: u32 = 902;
pub const C3: u32 = 903;
pub const C5: u32 = 905;
pub const C10: u32 = 910;
pub const C15: u32 = 915;

fn constant_object(c: u32) -> VarId {
    v(c + 1000)
}

fn constant_value(c: u32) -> i64 {
    (c - 900) as i64
}

pub fn assert_call(args: Vec<VarId>) -> NodeKind {
    NodeKind::Call {
        callee: Some("assert".to_owned()),
        args,
    }
}

pub fn call(callee: &str, args: Vec<VarId>) -> NodeKind {
    NodeKind::Call {
        callee: Some(callee.to_owned()),
        args,
    }
}

/// A graph with the global node `0` binding the given constants.
pub fn with_globals(constants: &[u32]) -> Icfg {
    let mut icfg = Icfg::new();
    icfg.add_node(n(0), NodeKind::Global).unwrap();
    for c in constants.iter() {
        icfg.add_object(constant_object(*c), ObjectKind::ConstInt(constant_value(*c)));
        icfg.add_statement(
            n(0),
            Statement::AddressOf {
                lhs: v(*c),
                obj: constant_object(*c),
            },
        )
        .unwrap();
    }
    icfg
}

pub fn add_intra_nodes(icfg: &mut Icfg, ids: &[u32]) {
    for id in ids.iter() {
        icfg.add_node(n(*id), NodeKind::Intra).unwrap();
    }
}

pub fn add_chain(icfg: &mut Icfg, ids: &[u32]) {
    for w in ids.windows(2) {
        icfg.add_intra_edge(n(w[0]), n(w[1])).unwrap();
    }
}

pub const OBJ_P: u32 = 100;

// int *p = &o; *p = 5; x = *p; assert(x == 5);
//
// 0 -> 1 -> 2 -> 3 -> 4 -> 5
pub fn get_linear_store_load() -> Icfg {
    let mut icfg = with_globals(&[C5]);
    icfg.add_object(v(OBJ_P), ObjectKind::Stack);
    add_intra_nodes(&mut icfg, &[1, 2, 3, 4]);
    icfg.add_node(n(5), assert_call(vec![v(3)])).unwrap();
    add_chain(&mut icfg, &[0, 1, 2, 3, 4, 5]);

    #[cfg_attr(rustfmt, rustfmt_skip)]
    {
    icfg.add_statement(n(1), Statement::AddressOf { lhs: v(1), obj: v(OBJ_P) }).unwrap();
    icfg.add_statement(n(2), Statement::Store { ptr: v(1), value: v(C5) }).unwrap();
    icfg.add_statement(n(4), Statement::Load { lhs: v(2), ptr: v(1) }).unwrap();
    icfg.add_statement(n(4), Statement::Compare { res: v(3), pred: Predicate::Eq, lhs: v(2), rhs: v(C5) }).unwrap();
    }
    icfg
}

// a = input; if (a > 10) b = a + 1; else b = 10; assert(b >= 10);
//
//           +-> 3 -+
// 0 -> 1 -> 2      5 -> 6
//           +-> 4 -+
pub fn get_branch_diamond() -> Icfg {
    let mut icfg = with_globals(&[C1, C10]);
    icfg.add_node(n(1), NodeKind::FunctionEntry).unwrap();
    add_intra_nodes(&mut icfg, &[2, 3, 4, 5]);
    icfg.add_node(n(6), assert_call(vec![v(6)])).unwrap();
    add_chain(&mut icfg, &[0, 1, 2]);
    icfg.add_branch_edge(n(2), n(3), v(2), 1).unwrap();
    icfg.add_branch_edge(n(2), n(4), v(2), 0).unwrap();
    add_chain(&mut icfg, &[3, 5, 6]);
    add_chain(&mut icfg, &[4, 5]);

    #[cfg_attr(rustfmt, rustfmt_skip)]
    {
    icfg.add_statement(n(2), Statement::Compare { res: v(2), pred: Predicate::Sgt, lhs: v(1), rhs: v(C10) }).unwrap();
    icfg.add_statement(n(2), Statement::Branch { cond: v(2) }).unwrap();
    icfg.add_statement(n(3), Statement::Binary { res: v(3), op: BinaryOp::Add, lhs: v(1), rhs: v(C1) }).unwrap();
    icfg.add_statement(n(4), Statement::Copy { lhs: v(4), rhs: v(C10) }).unwrap();
    icfg.add_statement(n(5), Statement::Phi { res: v(5), incoming: vec![(v(3), n(3)), (v(4), n(4))] }).unwrap();
    icfg.add_statement(n(5), Statement::Compare { res: v(6), pred: Predicate::Sge, lhs: v(5), rhs: v(C10) }).unwrap();
    }
    icfg
}

// i = 0; while (i < 1) { i = i + 1; } assert(i >= 1);
//
//                +--------+
//                v        |
// 0 -> 1 -> 2 -> 3 -> 4 -> 5
//                |
//                +-> 6 -> 7
pub fn get_simple_loop() -> Icfg {
    let mut icfg = with_globals(&[C0, C1]);
    icfg.add_node(n(1), NodeKind::FunctionEntry).unwrap();
    add_intra_nodes(&mut icfg, &[2, 3, 4, 5, 6]);
    icfg.add_node(n(7), assert_call(vec![v(4)])).unwrap();
    add_chain(&mut icfg, &[0, 1, 2, 3]);
    icfg.add_branch_edge(n(3), n(4), v(2), 1).unwrap();
    icfg.add_branch_edge(n(3), n(6), v(2), 0).unwrap();
    add_chain(&mut icfg, &[4, 5, 3]);
    add_chain(&mut icfg, &[6, 7]);

    #[cfg_attr(rustfmt, rustfmt_skip)]
    {
    icfg.add_statement(n(3), Statement::Phi { res: v(1), incoming: vec![(v(C0), n(2)), (v(3), n(5))] }).unwrap();
    icfg.add_statement(n(3), Statement::Compare { res: v(2), pred: Predicate::Slt, lhs: v(1), rhs: v(C1) }).unwrap();
    icfg.add_statement(n(3), Statement::Branch { cond: v(2) }).unwrap();
    icfg.add_statement(n(4), Statement::Binary { res: v(3), op: BinaryOp::Add, lhs: v(1), rhs: v(C1) }).unwrap();
    icfg.add_statement(n(6), Statement::Compare { res: v(4), pred: Predicate::Sge, lhs: v(1), rhs: v(C1) }).unwrap();
    }
    icfg
}

// x = 0; assert(x > 0);
//
// 0 -> 1 -> 2 -> 3
pub fn get_failing_assert() -> Icfg {
    let mut icfg = with_globals(&[C0]);
    add_intra_nodes(&mut icfg, &[1, 2]);
    icfg.add_node(n(3), assert_call(vec![v(2)])).unwrap();
    add_chain(&mut icfg, &[0, 1, 2, 3]);

    #[cfg_attr(rustfmt, rustfmt_skip)]
    {
    icfg.add_statement(n(1), Statement::Copy { lhs: v(1), rhs: v(C0) }).unwrap();
    icfg.add_statement(n(2), Statement::Compare { res: v(2), pred: Predicate::Sgt, lhs: v(1), rhs: v(C0) }).unwrap();
    }
    icfg
}

pub const INC_ENTRY: u32 = 10;
pub const INC_EXIT: u32 = 12;

/// Adds `int inc(int x) { return x + 1; }` as nodes 10..12.
/// Formal parameter v20, return value v21.
fn add_inc(icfg: &mut Icfg) {
    icfg.add_function_node(n(10), NodeKind::FunctionEntry, "inc").unwrap();
    icfg.add_function_node(n(11), NodeKind::Intra, "inc").unwrap();
    icfg.add_function_node(n(12), NodeKind::FunctionExit, "inc").unwrap();
    add_chain(icfg, &[10, 11, 12]);
    icfg.add_statement(
        n(11),
        Statement::Binary {
            res: v(21),
            op: BinaryOp::Add,
            lhs: v(20),
            rhs: v(C1),
        },
    )
    .unwrap();
}

fn add_inc_call(icfg: &mut Icfg, site: u32, ret: u32, arg: VarId, result: VarId) {
    icfg.add_node(n(site), call("inc", vec![arg])).unwrap();
    icfg.add_node(n(ret), NodeKind::ReturnSite { call_site: n(site) })
        .unwrap();
    icfg.add_call_edge(
        n(site),
        n(INC_ENTRY),
        vec![ParamBinding {
            actual: arg,
            formal: v(20),
        }],
    )
    .unwrap();
    icfg.add_return_edge(
        n(INC_EXIT),
        n(ret),
        n(site),
        Some(RetBinding {
            value: v(21),
            result,
        }),
    )
    .unwrap();
}

// a = inc(1); b = inc(a); assert(b == 3);
//
// 0 -> 1 -> 2 ~> inc ~> 3 -> 4 ~> inc ~> 5 -> 6 -> 7
pub fn get_two_calls() -> Icfg {
    let mut icfg = with_globals(&[C1, C3]);
    icfg.add_function_node(n(1), NodeKind::FunctionEntry, "main").unwrap();
    add_inc(&mut icfg);
    add_inc_call(&mut icfg, 2, 3, v(C1), v(1));
    add_inc_call(&mut icfg, 4, 5, v(1), v(2));
    icfg.add_function_node(n(6), NodeKind::Intra, "main").unwrap();
    icfg.add_node(n(7), assert_call(vec![v(3)])).unwrap();
    add_chain(&mut icfg, &[0, 1, 2]);
    add_chain(&mut icfg, &[3, 4]);
    add_chain(&mut icfg, &[5, 6, 7]);
    icfg.add_statement(
        n(6),
        Statement::Compare {
            res: v(3),
            pred: Predicate::Eq,
            lhs: v(2),
            rhs: v(C3),
        },
    )
    .unwrap();
    icfg
}

// void f() { if (*) f(); }  main: f(); assert(1);
//
// 0 -> 1 -> 2 ~> 10 -> 11 ~> 10 ...
//                 |          13 ~> 12 -> 13
//                 +-> 13 ~> 3 -> 4
pub fn get_recursion() -> Icfg {
    let mut icfg = with_globals(&[C1]);
    icfg.add_function_node(n(1), NodeKind::FunctionEntry, "main").unwrap();
    icfg.add_node(n(2), call("f", vec![])).unwrap();
    icfg.add_node(n(3), NodeKind::ReturnSite { call_site: n(2) })
        .unwrap();
    icfg.add_node(n(4), assert_call(vec![v(C1)])).unwrap();
    icfg.add_function_node(n(10), NodeKind::FunctionEntry, "f").unwrap();
    icfg.add_function_node(n(11), call("f", vec![]), "f").unwrap();
    icfg.add_function_node(n(12), NodeKind::ReturnSite { call_site: n(11) }, "f")
        .unwrap();
    icfg.add_function_node(n(13), NodeKind::FunctionExit, "f").unwrap();
    add_chain(&mut icfg, &[0, 1, 2]);
    add_chain(&mut icfg, &[3, 4]);
    add_chain(&mut icfg, &[10, 11]);
    add_chain(&mut icfg, &[10, 13]);
    add_chain(&mut icfg, &[12, 13]);
    icfg.add_call_edge(n(2), n(10), vec![]).unwrap();
    icfg.add_call_edge(n(11), n(10), vec![]).unwrap();
    icfg.add_return_edge(n(13), n(3), n(2), None).unwrap();
    icfg.add_return_edge(n(13), n(12), n(11), None).unwrap();
    icfg
}

pub const OBJ_S: u32 = 101;

// struct { int a; int b; int c; } s;  p = &s; q = &p->b; *q = 15;
// r = &p[0 + 1 * idx] with idx = 2; *r = 5; x = *q; y = *r;
// assert(x + y == 20)
pub fn get_struct_fields() -> Icfg {
    let mut icfg = with_globals(&[C2, C5, C15]);
    icfg.add_object(v(OBJ_S), ObjectKind::Stack);
    add_intra_nodes(&mut icfg, &[1, 2, 3, 4]);
    icfg.add_node(n(5), assert_call(vec![v(8)])).unwrap();
    add_chain(&mut icfg, &[0, 1, 2, 3, 4, 5]);
    let c20 = v(920);
    icfg.add_object(v(1920), ObjectKind::ConstInt(20));

    #[cfg_attr(rustfmt, rustfmt_skip)]
    {
    icfg.add_statement(n(1), Statement::AddressOf { lhs: v(1), obj: v(OBJ_S) }).unwrap();
    icfg.add_statement(n(1), Statement::AddressOf { lhs: c20, obj: v(1920) }).unwrap();
    icfg.add_statement(n(2), Statement::FieldOffset { lhs: v(2), base: v(1), offset: GepOffset::Field(1) }).unwrap();
    icfg.add_statement(n(2), Statement::Store { ptr: v(2), value: v(C15) }).unwrap();
    icfg.add_statement(n(3), Statement::FieldOffset { lhs: v(3), base: v(1), offset: GepOffset::Indexed(vec![
        GepIndex { index: IndexOperand::Const(0), stride: 3 },
        GepIndex { index: IndexOperand::Var(v(C2)), stride: 1 },
    ]) }).unwrap();
    icfg.add_statement(n(3), Statement::Store { ptr: v(3), value: v(C5) }).unwrap();
    icfg.add_statement(n(4), Statement::Load { lhs: v(4), ptr: v(2) }).unwrap();
    icfg.add_statement(n(4), Statement::Load { lhs: v(5), ptr: v(3) }).unwrap();
    icfg.add_statement(n(4), Statement::Binary { res: v(6), op: BinaryOp::Add, lhs: v(4), rhs: v(5) }).unwrap();
    icfg.add_statement(n(4), Statement::Compare { res: v(8), pred: Predicate::Eq, lhs: v(6), rhs: c20 }).unwrap();
    }
    icfg
}

/// Where the parameter and return value bindings of a call are placed.
#[derive(Clone, Copy)]
pub enum BindingPlacement {
    /// On the call and return edges.
    Edges,
    /// As statements of the callee entry and of the return site.
    Nodes,
}

// int f(int p) { return p != 5; }  main: y = 5; r = f(y); assert(r);
//
// 0 -> 1 -> 2 ~> 10 -> 11 -> 12 ~> 3 -> 4
pub fn get_bound_call(placement: BindingPlacement) -> Icfg {
    let mut icfg = with_globals(&[C5]);
    icfg.add_function_node(n(1), NodeKind::FunctionEntry, "main").unwrap();
    icfg.add_node(n(2), call("f", vec![v(1)])).unwrap();
    icfg.add_node(n(3), NodeKind::ReturnSite { call_site: n(2) })
        .unwrap();
    icfg.add_node(n(4), assert_call(vec![v(2)])).unwrap();
    icfg.add_function_node(n(10), NodeKind::FunctionEntry, "f").unwrap();
    icfg.add_function_node(n(11), NodeKind::Intra, "f").unwrap();
    icfg.add_function_node(n(12), NodeKind::FunctionExit, "f").unwrap();
    add_chain(&mut icfg, &[0, 1, 2]);
    add_chain(&mut icfg, &[10, 11, 12]);
    add_chain(&mut icfg, &[3, 4]);

    let param = ParamBinding {
        actual: v(1),
        formal: v(20),
    };
    let ret = RetBinding {
        value: v(21),
        result: v(2),
    };
    match placement {
        BindingPlacement::Edges => {
            icfg.add_call_edge(n(2), n(10), vec![param]).unwrap();
            icfg.add_return_edge(n(12), n(3), n(2), Some(ret)).unwrap();
        }
        BindingPlacement::Nodes => {
            icfg.add_call_edge(n(2), n(10), vec![]).unwrap();
            icfg.add_return_edge(n(12), n(3), n(2), None).unwrap();
            icfg.add_statement(n(10), Statement::CallParamBind(param))
                .unwrap();
            icfg.add_statement(n(3), Statement::ReturnValueBind(ret))
                .unwrap();
        }
    }

    #[cfg_attr(rustfmt, rustfmt_skip)]
    {
    icfg.add_statement(n(1), Statement::Copy { lhs: v(1), rhs: v(C5) }).unwrap();
    icfg.add_statement(n(11), Statement::Compare { res: v(21), pred: Predicate::Ne, lhs: v(20), rhs: v(C5) }).unwrap();
    }
    icfg
}

// x = input; if (x > 5) { assert(x < 3); }
//
// 0 -> 1 -> 2 -> 3
pub fn get_guarded_contradiction() -> Icfg {
    let mut icfg = with_globals(&[C3, C5]);
    add_intra_nodes(&mut icfg, &[1, 2]);
    icfg.add_node(n(3), assert_call(vec![v(3)])).unwrap();
    add_chain(&mut icfg, &[0, 1]);
    icfg.add_branch_edge(n(1), n(2), v(2), 1).unwrap();
    add_chain(&mut icfg, &[2, 3]);

    #[cfg_attr(rustfmt, rustfmt_skip)]
    {
    icfg.add_statement(n(1), Statement::Compare { res: v(2), pred: Predicate::Sgt, lhs: v(1), rhs: v(C5) }).unwrap();
    icfg.add_statement(n(1), Statement::Branch { cond: v(2) }).unwrap();
    icfg.add_statement(n(2), Statement::Compare { res: v(3), pred: Predicate::Slt, lhs: v(1), rhs: v(C3) }).unwrap();
    }
    icfg
}
