// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

#[cfg(test)]
mod tests {
    use crate::{
        call_stack::CallStack,
        encoder::{value_var_name, PathEncoder},
        error::SseError,
        explorer::IcfgPath,
        icfg::{Icfg, NodeKind},
        ir::{BinaryOp, GepOffset, ObjectKind, ParamBinding, RetBinding, Statement, UnaryOp},
        memory::{Value, ADDRESS_MASK, DEFAULT_FIELD_STRIDE},
        solver::{ConstraintSolver, NativeSolver},
        test_graphs::{
            add_chain, add_intra_nodes, get_bound_call, get_branch_diamond,
            get_linear_store_load, get_simple_loop, get_struct_fields, get_two_calls, n, v,
            with_globals, BindingPlacement, C0, C1, C10, C3, C5, OBJ_P, OBJ_S,
        },
    };

    /// The path along the given node ids.
    fn path_of(icfg: &Icfg, ids: &[u32]) -> IcfgPath {
        let mut edges = Vec::new();
        for w in ids.windows(2) {
            let from = icfg.node_index(n(w[0])).unwrap();
            let to = icfg.node_index(n(w[1])).unwrap();
            let (edge, _) = icfg
                .out_edges(from)
                .into_iter()
                .find(|(_, t)| *t == to)
                .unwrap_or_else(|| panic!("No edge {} -> {}", w[0], w[1]));
            edges.push(edge);
        }
        IcfgPath::new(n(ids[0]), edges)
    }

    fn encoder(icfg: &Icfg) -> PathEncoder<'_, NativeSolver> {
        PathEncoder::new(icfg, NativeSolver::new(), DEFAULT_FIELD_STRIDE)
    }

    fn root() -> CallStack {
        CallStack::new()
    }

    #[test]
    fn test_store_load() {
        let icfg = get_linear_store_load();
        let mut enc = encoder(&icfg);
        assert!(enc.encode(&path_of(&icfg, &[0, 1, 2, 3, 4, 5])).unwrap());
        assert_eq!(
            enc.evaluate_var(&root(), v(1)).unwrap(),
            Some(Value::Address(ADDRESS_MASK))
        );
        assert_eq!(enc.evaluate_var(&root(), v(2)).unwrap(), Some(Value::Scalar(5)));
        assert_eq!(enc.evaluate_var(&root(), v(3)).unwrap(), Some(Value::Scalar(1)));
        assert_eq!(
            enc.evaluate_var(&root(), v(OBJ_P)).unwrap(),
            Some(Value::Address(ADDRESS_MASK))
        );
        assert!(enc.get_memory().is_stored(ADDRESS_MASK));
        // Never bound on this path.
        assert_eq!(enc.evaluate_var(&root(), v(77)).unwrap(), None);
    }

    #[test]
    fn test_reencode_is_independent() {
        let icfg = get_linear_store_load();
        let mut enc = encoder(&icfg);
        let path = path_of(&icfg, &[0, 1, 2, 3, 4, 5]);
        assert!(enc.encode(&path).unwrap());
        let first = enc.get_solver_mut().num_constraints();
        assert!(enc.encode(&path).unwrap());
        assert_eq!(enc.get_solver_mut().num_constraints(), first);
        assert_eq!(enc.evaluate_var(&root(), v(2)).unwrap(), Some(Value::Scalar(5)));
        assert_eq!(enc.get_memory().allocated().count(), 1);

        enc.reset_exploration();
        assert_eq!(enc.get_memory().allocated().count(), 0);
        assert!(enc.bound_variables().is_empty());
    }

    #[test]
    fn test_global_bindings() {
        let icfg = get_linear_store_load();
        let mut enc = encoder(&icfg);
        assert!(enc.encode(&path_of(&icfg, &[0])).unwrap());
        let names: Vec<String> = enc.bound_variables().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec![value_var_name(&root(), v(C5))]);
        assert_eq!(enc.evaluate_var(&root(), v(C5)).unwrap(), Some(Value::Scalar(5)));
    }

    #[test]
    fn test_unbound_read_is_fresh_symbol() {
        let icfg = get_linear_store_load();
        let mut enc = encoder(&icfg);
        let t = enc.read(v(42)).unwrap();
        assert_eq!(t.to_string(), "ValVar42");
        assert!(enc.read(v(OBJ_P)).unwrap().as_int().is_some());
    }

    #[test]
    fn test_branch_conditions() {
        let icfg = get_branch_diamond();
        let mut enc = encoder(&icfg);
        assert!(enc.encode(&path_of(&icfg, &[0, 1, 2, 3, 5, 6])).unwrap());
        let a = enc.evaluate_var(&root(), v(1)).unwrap().unwrap().raw();
        assert!(a > 10, "Input {} does not take the true branch", a);
        assert_eq!(
            enc.evaluate_var(&root(), v(5)).unwrap(),
            Some(Value::Scalar(a + 1))
        );

        assert!(enc.encode(&path_of(&icfg, &[0, 1, 2, 4, 5, 6])).unwrap());
        let a = enc.evaluate_var(&root(), v(1)).unwrap().unwrap().raw();
        assert!(a <= 10, "Input {} does not take the false branch", a);
        assert_eq!(enc.evaluate_var(&root(), v(5)).unwrap(), Some(Value::Scalar(10)));
    }

    #[test]
    fn test_loop_versions() {
        let icfg = get_simple_loop();
        let mut enc = encoder(&icfg);
        assert!(!enc.encode(&path_of(&icfg, &[0, 1, 2, 3, 6, 7])).unwrap());
        assert!(enc
            .encode(&path_of(&icfg, &[0, 1, 2, 3, 4, 5, 3, 6, 7]))
            .unwrap());
        // The loop header was executed twice. The latest version counts.
        assert_eq!(enc.evaluate_var(&root(), v(1)).unwrap(), Some(Value::Scalar(1)));
        assert_eq!(enc.evaluate_var(&root(), v(2)).unwrap(), Some(Value::Scalar(0)));
        assert_eq!(enc.evaluate_var(&root(), v(4)).unwrap(), Some(Value::Scalar(1)));
    }

    #[test]
    fn test_call_contexts() {
        let icfg = get_two_calls();
        let mut enc = encoder(&icfg);
        let path = path_of(&icfg, &[0, 1, 2, 10, 11, 12, 3, 4, 10, 11, 12, 5, 6, 7]);
        assert!(enc.encode(&path).unwrap());
        let first = root().push(n(2));
        let second = root().push(n(4));
        assert_eq!(enc.evaluate_var(&first, v(20)).unwrap(), Some(Value::Scalar(1)));
        assert_eq!(enc.evaluate_var(&first, v(21)).unwrap(), Some(Value::Scalar(2)));
        assert_eq!(enc.evaluate_var(&second, v(20)).unwrap(), Some(Value::Scalar(2)));
        assert_eq!(enc.evaluate_var(&second, v(21)).unwrap(), Some(Value::Scalar(3)));
        assert_eq!(enc.evaluate_var(&root(), v(2)).unwrap(), Some(Value::Scalar(3)));
        assert_eq!(enc.evaluate_var(&root(), v(3)).unwrap(), Some(Value::Scalar(1)));
        assert!(enc.get_call_stack().is_empty());
        assert!(enc
            .bound_variables()
            .iter()
            .any(|(name, _)| name == "ValVar21@[4]"));
    }

    #[test]
    fn test_return_to_wrong_site() {
        let icfg = get_two_calls();
        let mut enc = encoder(&icfg);
        // Enter inc from call site 2 but return to the return site of 4.
        let path = path_of(&icfg, &[0, 1, 2, 10, 11, 12, 5]);
        let res = enc.encode(&path);
        assert!(
            matches!(
                res,
                Err(SseError::CallStackMismatch { expected, .. }) if expected == n(4)
            ),
            "Unexpected result: {:?}",
            res
        );
    }

    #[test]
    fn test_bindings_on_nodes() {
        for placement in [BindingPlacement::Edges, BindingPlacement::Nodes] {
            let icfg = get_bound_call(placement);
            let mut enc = encoder(&icfg);
            assert!(enc.encode(&path_of(&icfg, &[0, 1, 2, 10, 11, 12, 3, 4])).unwrap());
            let callee = root().push(n(2));
            assert_eq!(enc.evaluate_var(&callee, v(20)).unwrap(), Some(Value::Scalar(5)));
            assert_eq!(enc.evaluate_var(&callee, v(21)).unwrap(), Some(Value::Scalar(0)));
            assert_eq!(enc.evaluate_var(&root(), v(2)).unwrap(), Some(Value::Scalar(0)));
            // The formal is never bound in the caller.
            assert_eq!(enc.evaluate_var(&root(), v(20)).unwrap(), None);
        }
    }

    #[test]
    fn test_misplaced_binding() {
        let mut icfg = with_globals(&[C5]);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);
        icfg.add_statement(
            n(1),
            Statement::CallParamBind(ParamBinding {
                actual: v(C5),
                formal: v(20),
            }),
        )
        .unwrap();
        let mut enc = encoder(&icfg);
        let res = enc.encode(&path_of(&icfg, &[0, 1]));
        assert!(
            matches!(res, Err(SseError::MisplacedBinding { node, .. }) if node == n(1)),
            "Unexpected result: {:?}",
            res
        );

        let mut icfg = with_globals(&[C5]);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);
        icfg.add_statement(
            n(1),
            Statement::ReturnValueBind(RetBinding {
                value: v(C5),
                result: v(2),
            }),
        )
        .unwrap();
        let mut enc = encoder(&icfg);
        let res = enc.encode(&path_of(&icfg, &[0, 1]));
        assert!(matches!(res, Err(SseError::MisplacedBinding { .. })));
    }

    #[test]
    fn test_phi_without_predecessor() {
        let mut icfg = with_globals(&[C0]);
        add_intra_nodes(&mut icfg, &[1, 2, 3]);
        add_chain(&mut icfg, &[0, 1, 3]);
        add_chain(&mut icfg, &[0, 2, 3]);
        icfg.add_statement(
            n(3),
            Statement::Phi {
                res: v(1),
                incoming: vec![(v(C0), n(2))],
            },
        )
        .unwrap();
        let mut enc = encoder(&icfg);
        assert!(enc.encode(&path_of(&icfg, &[0, 2, 3])).unwrap());
        let res = enc.encode(&path_of(&icfg, &[0, 1, 3]));
        assert!(matches!(
            res,
            Err(SseError::PhiWithoutPredecessor { node, .. }) if node == n(3)
        ));
    }

    #[test]
    fn test_ambiguous_phi() {
        let mut icfg = with_globals(&[C0, C1]);
        add_intra_nodes(&mut icfg, &[1, 2]);
        add_chain(&mut icfg, &[0, 1, 2]);
        icfg.add_statement(
            n(2),
            Statement::Phi {
                res: v(1),
                incoming: vec![(v(C0), n(1)), (v(C0), n(1))],
            },
        )
        .unwrap();
        {
            let mut enc = encoder(&icfg);
            // The same variable twice is no ambiguity.
            assert!(enc.encode(&path_of(&icfg, &[0, 1, 2])).unwrap());
        }

        icfg.add_statement(
            n(2),
            Statement::Phi {
                res: v(2),
                incoming: vec![(v(C0), n(1)), (v(C1), n(1))],
            },
        )
        .unwrap();
        let mut enc = encoder(&icfg);
        let res = enc.encode(&path_of(&icfg, &[0, 1, 2]));
        assert!(matches!(res, Err(SseError::AmbiguousPhi { count: 2, .. })));
    }

    #[test]
    fn test_dereference_scalar() {
        let mut icfg = with_globals(&[C5]);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);
        icfg.add_statement(n(1), Statement::Copy { lhs: v(1), rhs: v(C5) })
            .unwrap();
        icfg.add_statement(n(1), Statement::Load { lhs: v(2), ptr: v(1) })
            .unwrap();
        let mut enc = encoder(&icfg);
        let res = enc.encode(&path_of(&icfg, &[0, 1]));
        assert!(matches!(res, Err(SseError::NotAnAddress(5))));
    }

    #[test]
    fn test_address_of_non_object() {
        let mut icfg = with_globals(&[]);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);
        icfg.add_statement(n(1), Statement::AddressOf { lhs: v(1), obj: v(2) })
            .unwrap();
        let mut enc = encoder(&icfg);
        let res = enc.encode(&path_of(&icfg, &[0, 1]));
        assert!(matches!(res, Err(SseError::NotAnObject(o)) if o == v(2)));
    }

    #[test]
    fn test_null_pointer() {
        let mut icfg = with_globals(&[]);
        icfg.add_object(v(50), ObjectKind::NullPtr);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);
        icfg.add_statement(n(1), Statement::AddressOf { lhs: v(1), obj: v(50) })
            .unwrap();
        icfg.add_statement(n(1), Statement::Store { ptr: v(1), value: v(1) })
            .unwrap();
        let mut enc = encoder(&icfg);
        let res = enc.encode(&path_of(&icfg, &[0, 1]));
        assert!(matches!(res, Err(SseError::NotAnAddress(0))));
    }

    #[test]
    fn test_select() {
        let mut icfg = with_globals(&[C0, C1, C5, C10]);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);

        #[cfg_attr(rustfmt, rustfmt_skip)]
        {
        icfg.add_statement(n(1), Statement::Select { res: v(1), cond: v(C1), on_true: v(C5), on_false: v(C10) }).unwrap();
        icfg.add_statement(n(1), Statement::Select { res: v(2), cond: v(C0), on_true: v(C5), on_false: v(C10) }).unwrap();
        // v(30) is an unconstrained input.
        icfg.add_statement(n(1), Statement::Select { res: v(3), cond: v(30), on_true: v(C5), on_false: v(C10) }).unwrap();
        }

        let mut enc = encoder(&icfg);
        assert!(enc.encode(&path_of(&icfg, &[0, 1])).unwrap());
        assert_eq!(enc.evaluate_var(&root(), v(1)).unwrap(), Some(Value::Scalar(5)));
        assert_eq!(enc.evaluate_var(&root(), v(2)).unwrap(), Some(Value::Scalar(10)));
        let either = enc.evaluate_var(&root(), v(3)).unwrap().unwrap().raw();
        assert!(either == 5 || either == 10, "Select produced {}", either);
        let (_, t) = enc
            .bound_variables()
            .into_iter()
            .find(|(name, _)| name == "ValVar3")
            .unwrap();
        // Bound to its own symbol, which is defined by an ite.
        assert_eq!(t.to_string(), "ValVar3");
    }

    #[test]
    fn test_arithmetic() {
        let mut icfg = with_globals(&[C0, C3, C10]);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);
        let bin = |res: u32, op: BinaryOp, lhs: u32, rhs: u32| Statement::Binary {
            res: v(res),
            op,
            lhs: v(lhs),
            rhs: v(rhs),
        };
        let un = |res: u32, op: UnaryOp, operand: u32| Statement::Unary {
            res: v(res),
            op,
            operand: v(operand),
        };
        let stmts = vec![
            bin(1, BinaryOp::And, C10, C3),
            bin(2, BinaryOp::SDiv, C10, C3),
            bin(3, BinaryOp::SRem, C10, C3),
            un(4, UnaryOp::Neg, C10),
            bin(5, BinaryOp::SDiv, 4, C3),
            bin(6, BinaryOp::SRem, 4, C3),
            bin(7, BinaryOp::Xor, C10, C3),
            bin(8, BinaryOp::Or, C10, C3),
            bin(9, BinaryOp::Shl, C10, C3),
            bin(10, BinaryOp::AShr, 4, C3),
            un(11, UnaryOp::BitNot, C10),
            un(12, UnaryOp::Not, C0),
            un(13, UnaryOp::Not, C10),
            bin(14, BinaryOp::Sub, C3, C10),
            bin(15, BinaryOp::Mul, C3, C10),
        ];
        for s in stmts.into_iter() {
            icfg.add_statement(n(1), s).unwrap();
        }
        let mut enc = encoder(&icfg);
        assert!(enc.encode(&path_of(&icfg, &[0, 1])).unwrap());
        let expected: [(u32, i64); 15] = [
            (1, 2),
            (2, 3),
            (3, 1),
            (4, -10),
            (5, -3),
            (6, -1),
            (7, 9),
            (8, 11),
            (9, 80),
            (10, -2),
            (11, -11),
            (12, 1),
            (13, 0),
            (14, -7),
            (15, 30),
        ];
        for (var, val) in expected.iter() {
            assert_eq!(
                enc.evaluate_var(&root(), v(*var)).unwrap(),
                Some(Value::Scalar(*val)),
                "Wrong value of v{}",
                var
            );
        }
    }

    #[test]
    fn test_struct_fields() {
        let icfg = get_struct_fields();
        let mut enc = encoder(&icfg);
        assert!(enc.encode(&path_of(&icfg, &[0, 1, 2, 3, 4, 5])).unwrap());
        assert_eq!(
            enc.evaluate_var(&root(), v(2)).unwrap(),
            Some(Value::Address(ADDRESS_MASK + 1))
        );
        assert_eq!(
            enc.evaluate_var(&root(), v(3)).unwrap(),
            Some(Value::Address(ADDRESS_MASK + 2))
        );
        assert_eq!(enc.evaluate_var(&root(), v(4)).unwrap(), Some(Value::Scalar(15)));
        assert_eq!(enc.evaluate_var(&root(), v(5)).unwrap(), Some(Value::Scalar(5)));
        assert_eq!(enc.evaluate_var(&root(), v(8)).unwrap(), Some(Value::Scalar(1)));
        assert_eq!(enc.get_memory().object_at(ADDRESS_MASK + 2), Some((v(OBJ_S), 2)));
    }

    #[test]
    fn test_field_out_of_bounds() {
        let mut icfg = with_globals(&[]);
        icfg.add_object(v(OBJ_S), ObjectKind::Stack);
        add_intra_nodes(&mut icfg, &[1]);
        add_chain(&mut icfg, &[0, 1]);
        icfg.add_statement(n(1), Statement::AddressOf { lhs: v(1), obj: v(OBJ_S) })
            .unwrap();
        icfg.add_statement(
            n(1),
            Statement::FieldOffset {
                lhs: v(2),
                base: v(1),
                offset: GepOffset::Field(DEFAULT_FIELD_STRIDE),
            },
        )
        .unwrap();
        let mut enc = encoder(&icfg);
        let res = enc.encode(&path_of(&icfg, &[0, 1]));
        assert!(matches!(res, Err(SseError::FieldOutOfBounds { .. })));
    }

    #[test]
    fn test_node_kinds() {
        let icfg = get_two_calls();
        assert!(matches!(
            icfg.get_node(n(3)).unwrap().get_kind(),
            NodeKind::ReturnSite { call_site } if *call_site == n(2)
        ));
        assert_eq!(icfg.get_node(n(11)).unwrap().get_function(), Some("inc"));
    }
}
