// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

#![allow(dead_code)]

use sse::icfg::{Icfg, NodeId, NodeKind};
use sse::ir::{ObjectKind, Statement, VarId};

/// Ids of the objects backing constants start here.
const CONST_OBJECT_BASE: u32 = 10_000;

pub fn n(id: u32) -> NodeId {
    NodeId(id)
}

pub fn v(id: u32) -> VarId {
    VarId(id)
}

/// A graph whose global node `0` binds each `(var, value)` pair.
pub fn program_with_constants(constants: &[(u32, i64)]) -> Icfg {
    let mut icfg = Icfg::new();
    icfg.add_node(n(0), NodeKind::Global).unwrap();
    for (var, value) in constants.iter() {
        let obj = v(CONST_OBJECT_BASE + var);
        icfg.add_object(obj, ObjectKind::ConstInt(*value));
        icfg.add_statement(n(0), Statement::AddressOf { lhs: v(*var), obj })
            .unwrap();
    }
    icfg
}

pub fn intra_nodes(icfg: &mut Icfg, function: &str, ids: &[u32]) {
    for id in ids.iter() {
        icfg.add_function_node(n(*id), NodeKind::Intra, function)
            .unwrap();
    }
}

pub fn assertion(icfg: &mut Icfg, id: u32, arg: u32) {
    icfg.add_node(
        n(id),
        NodeKind::Call {
            callee: Some("svf_assert".to_owned()),
            args: vec![v(arg)],
        },
    )
    .unwrap();
}

pub fn chain(icfg: &mut Icfg, ids: &[u32]) {
    for w in ids.windows(2) {
        icfg.add_intra_edge(n(w[0]), n(w[1])).unwrap();
    }
}

pub fn statements(icfg: &mut Icfg, node: u32, stmts: Vec<Statement>) {
    for s in stmts.into_iter() {
        icfg.add_statement(n(node), s).unwrap();
    }
}
