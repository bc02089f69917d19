//! End-to-end translation tests.
//!
//! Each test hand-builds a `CodeObject` the way the bytecode frontend would
//! and checks the translated object tree: block structure, statement order,
//! terminators, and the SSA argument/parameter pairing at joins.

use std::rc::Rc;

use pyir::{
    translate, BinaryOp, BuiltinCaller, CodeObject, CollectTrace, Constant, Expr, FormatFunction, Instruction,
    NodeCall, Object, Options, RawConstant, Severity, Ssa, Stmt, Terminator, TranslateErrorKind, Translator,
};

fn module(consts: Vec<RawConstant>, names: &[&str], varnames: &[&str], instructions: Vec<Instruction>) -> CodeObject {
    CodeObject {
        co_name: "<module>".to_owned(),
        co_filename: "./test.py".to_owned(),
        co_consts: consts,
        co_names: names.iter().map(|name| (*name).to_owned()).collect(),
        co_varnames: varnames.iter().map(|name| (*name).to_owned()).collect(),
        co_cellvars: vec![],
        co_freevars: vec![],
        instructions,
    }
}

fn function_code(name: &str) -> Rc<CodeObject> {
    Rc::new(CodeObject {
        co_name: name.to_owned(),
        co_filename: "./test.py".to_owned(),
        co_consts: vec![RawConstant::None],
        co_names: vec![],
        co_varnames: vec![],
        co_cellvars: vec![],
        co_freevars: vec![],
        instructions: vec![Instruction::new("LOAD_CONST", 0, 0), Instruction::new("RETURN_VALUE", 0, 2)],
    })
}

fn local(name: &str) -> Expr {
    Expr::LocalVar(name.to_owned())
}

/// Collects every jump edge of a terminator.
fn node_calls(term: &Terminator) -> Vec<&NodeCall> {
    match term {
        Terminator::Return(_) => vec![],
        Terminator::Jump(calls) => calls.iter().collect(),
        Terminator::If { then_, else_, .. } => {
            let mut calls = node_calls(then_);
            calls.extend(node_calls(else_));
            calls
        }
    }
}

/// Checks that every jump supplies exactly as many SSA arguments as its
/// target declares parameters, and that every target exists.
fn assert_jump_arities(object: &Object) {
    let arities: std::collections::HashMap<&str, usize> = object
        .toplevel
        .iter()
        .map(|node| (node.label.as_str(), node.ssa_parameters.len()))
        .collect();
    for node in &object.toplevel {
        for call in node_calls(&node.last) {
            let expected = arities
                .get(call.label.as_str())
                .unwrap_or_else(|| panic!("jump from {} targets unknown label {}", node.label, call.label));
            assert_eq!(
                call.ssa_args.len(),
                *expected,
                "jump from {} to {} has wrong arity",
                node.label,
                call.label
            );
        }
    }
    for (_, child) in &object.objects {
        assert_jump_arities(child);
    }
}

// === Straight-line Code ===

#[test]
fn return_constant() {
    let obj = translate(&module(
        vec![RawConstant::Int(42)],
        &[],
        &[],
        vec![Instruction::new("LOAD_CONST", 0, 0), Instruction::new("RETURN_VALUE", 0, 2)],
    ))
    .unwrap();

    assert_eq!(obj.name.to_string(), "test");
    assert_eq!(obj.toplevel.len(), 1);
    let node = &obj.toplevel[0];
    assert!(node.stmts.is_empty());
    assert_eq!(node.last, Terminator::Return(Expr::Const(Constant::Int(42))));
}

#[test]
fn binary_add_of_locals() {
    let obj = translate(&module(
        vec![],
        &[],
        &["a", "b"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("LOAD_FAST", 1, 2),
            Instruction::new("BINARY_ADD", 0, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    assert_eq!(node.stmts.len(), 1);
    assert_eq!(
        node.stmts[0].1,
        Stmt::BuiltinCall {
            lhs: Ssa(0),
            call: BuiltinCaller::Binary(BinaryOp::Add),
            args: vec![local("a"), local("b")],
        }
    );
    assert_eq!(node.last, Terminator::Return(Expr::Temp(Ssa(0))));
}

#[test]
fn pop_top_preserves_side_effects_of_plain_values() {
    let obj = translate(&module(
        vec![RawConstant::None],
        &[],
        &["a"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("POP_TOP", 0, 2),
            Instruction::new("LOAD_CONST", 0, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
        ],
    ))
    .unwrap();

    // a plain value is materialized into a throwaway temporary
    assert_eq!(
        obj.toplevel[0].stmts[0].1,
        Stmt::Assign {
            lhs: Expr::Temp(Ssa(0)),
            rhs: local("a"),
        }
    );
}

#[test]
fn pop_top_discards_call_results_silently() {
    let obj = translate(&module(
        vec![RawConstant::Int(42), RawConstant::None],
        &["print"],
        &[],
        vec![
            Instruction::new("LOAD_NAME", 0, 0),
            Instruction::new("LOAD_CONST", 0, 2),
            Instruction::new("CALL_FUNCTION", 1, 4),
            Instruction::new("POP_TOP", 0, 6),
            Instruction::new("LOAD_CONST", 1, 8),
            Instruction::new("RETURN_VALUE", 0, 10),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    // just the call: the POP_TOP of its temp emits nothing
    assert_eq!(node.stmts.len(), 1);
    let Stmt::Call { callee, args, .. } = &node.stmts[0].1 else {
        panic!("expected a call statement, got {}", node.stmts[0].1);
    };
    assert_eq!(callee.to_string(), "print");
    assert_eq!(args.len(), 1);
}

// === Conditionals & Joins ===

#[test]
fn pop_jump_if_false_builds_three_blocks() {
    let obj = translate(&module(
        vec![RawConstant::Int(1), RawConstant::Int(2)],
        &[],
        &["a"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("POP_JUMP_IF_FALSE", 10, 2),
            Instruction::new("LOAD_CONST", 0, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
            Instruction::new("LOAD_CONST", 1, 10).jump_target(),
            Instruction::new("RETURN_VALUE", 0, 12),
        ],
    ))
    .unwrap();

    assert_eq!(obj.toplevel.len(), 3);
    let entry = &obj.toplevel[0];
    assert_eq!(
        entry.last,
        Terminator::If {
            cond: local("a"),
            then_: Box::new(Terminator::Jump(vec![NodeCall {
                label: "b1".to_owned(),
                ssa_args: vec![],
            }])),
            else_: Box::new(Terminator::Jump(vec![NodeCall {
                label: "b2".to_owned(),
                ssa_args: vec![],
            }])),
        }
    );
    assert_eq!(obj.toplevel[1].last, Terminator::Return(Expr::Const(Constant::Int(1))));
    assert_eq!(obj.toplevel[2].last, Terminator::Return(Expr::Const(Constant::Int(2))));
    assert_jump_arities(&obj);
}

#[test]
fn pop_jump_if_true_negates_the_condition() {
    let obj = translate(&module(
        vec![RawConstant::Int(1), RawConstant::Int(2)],
        &[],
        &["a"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("POP_JUMP_IF_TRUE", 10, 2),
            Instruction::new("LOAD_CONST", 0, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
            Instruction::new("LOAD_CONST", 1, 10).jump_target(),
            Instruction::new("RETURN_VALUE", 0, 12),
        ],
    ))
    .unwrap();

    let Terminator::If { cond, .. } = &obj.toplevel[0].last else {
        panic!("expected a conditional terminator");
    };
    assert_eq!(*cond, Expr::Not(Box::new(local("a"))));
}

#[test]
fn jump_forward_joins_with_ssa_parameters() {
    // x = 1 if c else 2
    let obj = translate(&module(
        vec![RawConstant::Int(1), RawConstant::Int(2), RawConstant::None],
        &[],
        &["c", "x"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("POP_JUMP_IF_FALSE", 8, 2),
            Instruction::new("LOAD_CONST", 0, 4),
            Instruction::new("JUMP_FORWARD", 2, 6),
            Instruction::new("LOAD_CONST", 1, 8).jump_target(),
            Instruction::new("STORE_FAST", 1, 10).jump_target(),
            Instruction::new("LOAD_CONST", 2, 12),
            Instruction::new("RETURN_VALUE", 0, 14),
        ],
    ))
    .unwrap();

    assert_eq!(obj.toplevel.len(), 4);
    let join = &obj.toplevel[3];
    assert_eq!(join.ssa_parameters.len(), 1);
    let param = join.ssa_parameters[0];
    assert_eq!(
        join.stmts[0].1,
        Stmt::Assign {
            lhs: local("x"),
            rhs: Expr::Temp(param),
        }
    );
    // both predecessors supply exactly one value
    assert_eq!(node_calls(&obj.toplevel[1].last)[0].ssa_args, vec![Expr::Const(Constant::Int(1))]);
    assert_eq!(node_calls(&obj.toplevel[2].last)[0].ssa_args, vec![Expr::Const(Constant::Int(2))]);
    assert_jump_arities(&obj);
}

#[test]
fn jump_if_true_or_pop_keeps_condition_on_jump_edge() {
    // a or b
    let obj = translate(&module(
        vec![],
        &[],
        &["a", "b"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("JUMP_IF_TRUE_OR_POP", 6, 2),
            Instruction::new("LOAD_FAST", 1, 4),
            Instruction::new("RETURN_VALUE", 0, 6).jump_target(),
        ],
    ))
    .unwrap();

    let entry = &obj.toplevel[0];
    let Terminator::If { cond, then_, else_ } = &entry.last else {
        panic!("expected a conditional terminator");
    };
    // fall-through happens when the condition is false
    assert_eq!(*cond, Expr::Not(Box::new(local("a"))));
    // the fall-through (pop) edge drops the condition argument
    let then_calls = node_calls(then_);
    assert_eq!(then_calls[0].ssa_args, Vec::<Expr>::new());
    // the jump edge keeps it
    let else_calls = node_calls(else_);
    assert_eq!(else_calls[0].ssa_args, vec![local("a")]);

    // the merged block returns its single parameter
    let merge = &obj.toplevel[2];
    assert_eq!(merge.ssa_parameters.len(), 1);
    assert_eq!(merge.last, Terminator::Return(Expr::Temp(merge.ssa_parameters[0])));
    assert_jump_arities(&obj);
}

// === Loops ===

#[test]
fn for_iter_loop_shape() {
    // for x in xs: pass
    let obj = translate(&module(
        vec![RawConstant::None],
        &[],
        &["xs", "x"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("GET_ITER", 0, 2),
            Instruction::new("FOR_ITER", 8, 4).jump_target(),
            Instruction::new("STORE_FAST", 1, 6),
            Instruction::new("JUMP_ABSOLUTE", 4, 8),
            Instruction::new("LOAD_CONST", 0, 14).jump_target(),
            Instruction::new("RETURN_VALUE", 0, 16),
        ],
    ))
    .unwrap();

    assert_eq!(obj.toplevel.len(), 4);
    let [entry, head, body, exit] = &obj.toplevel[..] else {
        panic!("expected four blocks");
    };

    // entry computes the iterator and falls into the synthesized loop head
    assert_eq!(
        entry.stmts[0].1,
        Stmt::BuiltinCall {
            lhs: Ssa(0),
            call: BuiltinCaller::GetIter,
            args: vec![local("xs")],
        }
    );
    assert_eq!(node_calls(&entry.last)[0].ssa_args, vec![Expr::Temp(Ssa(0))]);

    // loop head advances the iterator and branches on exhaustion
    assert_eq!(head.ssa_parameters.len(), 1);
    let iter_param = head.ssa_parameters[0];
    let Stmt::BuiltinCall { call: BuiltinCaller::NextIter, args, lhs: next_id } = &head.stmts[0].1 else {
        panic!("expected NextIter, got {}", head.stmts[0].1);
    };
    assert_eq!(args, &vec![Expr::Temp(iter_param)]);
    let Stmt::BuiltinCall { call: BuiltinCaller::HasNextIter, .. } = &head.stmts[1].1 else {
        panic!("expected HasNextIter, got {}", head.stmts[1].1);
    };
    let Terminator::If { .. } = &head.last else {
        panic!("expected a two-way branch");
    };

    // the body prelude restores the iterator and fetches the current item
    let Stmt::BuiltinCall { call: BuiltinCaller::IterData, args: data_args, lhs: data } = &body.stmts[0].1 else {
        panic!("expected the IterData prelude, got {}", body.stmts[0].1);
    };
    assert_eq!(data_args, &vec![Expr::Temp(*next_id)]);
    assert_eq!(
        body.stmts[1].1,
        Stmt::Assign {
            lhs: local("x"),
            rhs: Expr::Temp(*data),
        }
    );
    // the back-jump feeds the iterator back into the loop head
    assert_eq!(node_calls(&body.last)[0].ssa_args, vec![Expr::Temp(iter_param)]);
    assert_eq!(node_calls(&body.last)[0].label, head.label);

    // the exit block resumes with the drained stack unchanged
    assert!(exit.ssa_parameters.is_empty());
    assert_eq!(exit.last, Terminator::Return(Expr::Const(Constant::Null)));
    assert_jump_arities(&obj);
}

#[test]
fn backward_jump_to_unregistered_offset_is_an_error() {
    let err = translate(&module(
        vec![RawConstant::None],
        &[],
        &[],
        vec![
            Instruction::new("LOAD_CONST", 0, 0),
            Instruction::new("POP_TOP", 0, 2),
            Instruction::new("JUMP_ABSOLUTE", 2, 4),
        ],
    ))
    .unwrap_err();

    assert_eq!(err.kind(), &TranslateErrorKind::MissingBackEdge { from: 4, to: 2 });
    assert_eq!(err.severity(), Severity::External);
}

// === Imports ===

#[test]
fn import_name_stages_expression_and_statement() {
    let obj = translate(&module(
        vec![RawConstant::Int(0), RawConstant::None],
        &["os"],
        &[],
        vec![
            Instruction::new("LOAD_CONST", 0, 0),
            Instruction::new("LOAD_CONST", 1, 2),
            Instruction::new("IMPORT_NAME", 0, 4),
            Instruction::new("POP_TOP", 0, 6),
            Instruction::new("LOAD_CONST", 1, 8),
            Instruction::new("RETURN_VALUE", 0, 10),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    // exactly the import marker: POP_TOP discards the import result silently
    assert_eq!(node.stmts.len(), 1);
    let Stmt::ImportName { id, fromlist } = &node.stmts[0].1 else {
        panic!("expected an import statement, got {}", node.stmts[0].1);
    };
    assert_eq!(id.to_string(), "os");
    assert!(fromlist.is_empty());
}

#[test]
fn store_name_rebinds_imported_names() {
    // import os; os
    let obj = translate(&module(
        vec![RawConstant::Int(0), RawConstant::None],
        &["os"],
        &[],
        vec![
            Instruction::new("LOAD_CONST", 0, 0),
            Instruction::new("LOAD_CONST", 1, 2),
            Instruction::new("IMPORT_NAME", 0, 4),
            Instruction::new("STORE_NAME", 0, 6),
            Instruction::new("LOAD_NAME", 0, 8),
            Instruction::new("POP_TOP", 0, 10),
            Instruction::new("LOAD_CONST", 1, 12),
            Instruction::new("RETURN_VALUE", 0, 14),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    // the assignment target is the module slot ...
    let Stmt::Assign { lhs, rhs } = &node.stmts[1].1 else {
        panic!("expected the import assignment, got {}", node.stmts[1].1);
    };
    assert_eq!(lhs.to_string(), "test.os");
    assert!(matches!(rhs, Expr::ImportName { .. }));
    // ... but later loads resolve to the imported entity, not $unknown
    let Stmt::Assign { rhs, .. } = &node.stmts[2].1 else {
        panic!("expected the discard assignment, got {}", node.stmts[2].1);
    };
    assert_eq!(rhs.to_string(), "os");
}

#[test]
fn import_from_warns_on_undeclared_name_but_continues() {
    let code = module(
        vec![
            RawConstant::Int(0),
            RawConstant::Tuple(vec![RawConstant::String("path".to_owned())]),
            RawConstant::None,
        ],
        &["os", "sep"],
        &[],
        vec![
            Instruction::new("LOAD_CONST", 0, 0),
            Instruction::new("LOAD_CONST", 1, 2),
            Instruction::new("IMPORT_NAME", 0, 4),
            Instruction::new("IMPORT_FROM", 1, 6),
            Instruction::new("RETURN_VALUE", 0, 8),
        ],
    );
    let mut sink = CollectTrace::new();
    let obj = Translator::translate_module(&code, Options::default(), &mut sink).unwrap();

    assert!(sink.output().contains("warning: IMPORT_FROM"));
    let Terminator::Return(Expr::ImportFrom { name, .. }) = &obj.toplevel[0].last else {
        panic!("expected the import projection to flow through");
    };
    assert_eq!(name, "sep");
}

#[test]
fn relative_import_walks_up_the_module_path() {
    let mut code = module(
        vec![RawConstant::Int(2), RawConstant::None],
        &["helpers"],
        &[],
        vec![
            Instruction::new("LOAD_CONST", 0, 0),
            Instruction::new("LOAD_CONST", 1, 2),
            Instruction::new("IMPORT_NAME", 0, 4),
            Instruction::new("POP_TOP", 0, 6),
            Instruction::new("LOAD_CONST", 1, 8),
            Instruction::new("RETURN_VALUE", 0, 10),
        ],
    );
    code.co_filename = "./pkg/sub/mod.py".to_owned();
    let obj = translate(&code).unwrap();

    let Stmt::ImportName { id, .. } = &obj.toplevel[0].stmts[0].1 else {
        panic!("expected an import statement");
    };
    // two levels up from pkg.sub.mod is pkg, then the name is appended
    assert_eq!(id.to_string(), "pkg.helpers");
}

#[test]
fn relative_import_beyond_the_root_fails() {
    let err = translate(&module(
        vec![RawConstant::Int(3), RawConstant::None],
        &["x"],
        &[],
        vec![
            Instruction::new("LOAD_CONST", 0, 0),
            Instruction::new("LOAD_CONST", 1, 2),
            Instruction::new("IMPORT_NAME", 0, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
        ],
    ))
    .unwrap_err();

    assert!(matches!(err.kind(), TranslateErrorKind::ImportNameDepth { depth: 3, .. }));
}

// === Functions & Classes ===

#[test]
fn make_function_with_annotations() {
    let obj = translate(&module(
        vec![
            RawConstant::Tuple(vec![RawConstant::String("x".to_owned())]),
            RawConstant::Code(function_code("f")),
            RawConstant::String("f".to_owned()),
            RawConstant::None,
        ],
        &["int", "f"],
        &[],
        vec![
            Instruction::new("LOAD_NAME", 0, 0),
            Instruction::new("LOAD_CONST", 0, 2),
            Instruction::new("BUILD_CONST_KEY_MAP", 1, 4),
            Instruction::new("LOAD_CONST", 1, 6),
            Instruction::new("LOAD_CONST", 2, 8),
            Instruction::new("MAKE_FUNCTION", 4, 10),
            Instruction::new("STORE_NAME", 1, 12),
            Instruction::new("LOAD_CONST", 3, 14),
            Instruction::new("RETURN_VALUE", 0, 16),
        ],
    ))
    .unwrap();

    assert_eq!(obj.functions.get("f").unwrap().to_string(), "test.f");

    let Stmt::Assign { lhs, rhs } = &obj.toplevel[0].stmts[0].1 else {
        panic!("expected the function assignment");
    };
    assert_eq!(lhs.to_string(), "test.f");
    let Expr::Function { qualname, annotations, .. } = rhs else {
        panic!("expected a function object, got {rhs}");
    };
    assert_eq!(qualname.to_string(), "test.f");
    let annotations = annotations.as_ref().unwrap();
    assert_eq!(
        annotations.get(&Constant::String("x".to_owned())).unwrap().to_string(),
        "int"
    );

    // the embedded code object became a nested translation
    assert_eq!(obj.objects.len(), 1);
    assert_eq!(obj.objects[0].1.name.to_string(), "test.f");
    assert_eq!(obj.objects[0].1.toplevel[0].last, Terminator::Return(Expr::Const(Constant::Null)));
}

#[test]
fn make_function_with_no_flags_consumes_exactly_two_entries() {
    let obj = translate(&module(
        vec![RawConstant::Code(function_code("f")), RawConstant::String("f".to_owned())],
        &[],
        &["marker", "f"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("LOAD_CONST", 0, 2),
            Instruction::new("LOAD_CONST", 1, 4),
            Instruction::new("MAKE_FUNCTION", 0, 6),
            Instruction::new("STORE_FAST", 1, 8),
            Instruction::new("RETURN_VALUE", 0, 10),
        ],
    ))
    .unwrap();

    // the sentinel below the two operands is untouched
    assert_eq!(obj.toplevel[0].last, Terminator::Return(local("marker")));
}

#[test]
fn build_class_records_the_class_name() {
    let obj = translate(&module(
        vec![
            RawConstant::Code(function_code("C")),
            RawConstant::String("C".to_owned()),
            RawConstant::None,
        ],
        &["C"],
        &[],
        vec![
            Instruction::new("LOAD_BUILD_CLASS", 0, 0),
            Instruction::new("LOAD_CONST", 0, 2),
            Instruction::new("LOAD_CONST", 1, 4),
            Instruction::new("MAKE_FUNCTION", 0, 6),
            Instruction::new("LOAD_CONST", 1, 8),
            Instruction::new("CALL_FUNCTION", 2, 10),
            Instruction::new("STORE_NAME", 0, 12),
            Instruction::new("LOAD_CONST", 2, 14),
            Instruction::new("RETURN_VALUE", 0, 16),
        ],
    ))
    .unwrap();

    assert!(obj.classes.contains("C"));
    let Stmt::Assign { lhs, rhs } = &obj.toplevel[0].stmts[0].1 else {
        panic!("expected the class assignment");
    };
    assert_eq!(lhs.to_string(), "test.C");
    assert!(matches!(rhs, Expr::Class(args) if args.len() == 2));
}

#[test]
fn call_method_stages_a_method_call() {
    let obj = translate(&module(
        vec![RawConstant::Int(1), RawConstant::None],
        &["append"],
        &["xs"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("LOAD_METHOD", 0, 2),
            Instruction::new("LOAD_CONST", 0, 4),
            Instruction::new("CALL_METHOD", 1, 6),
            Instruction::new("POP_TOP", 0, 8),
            Instruction::new("LOAD_CONST", 1, 10),
            Instruction::new("RETURN_VALUE", 0, 12),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    assert_eq!(node.stmts.len(), 1);
    let Stmt::CallMethod { callee, args, .. } = &node.stmts[0].1 else {
        panic!("expected a method call, got {}", node.stmts[0].1);
    };
    assert_eq!(callee.to_string(), "$LoadMethod(xs, append)");
    assert_eq!(args[0].value, Expr::Const(Constant::Int(1)));
}

// === Collections & Unpacking ===

#[test]
fn build_map_of_zero_entries_consumes_nothing() {
    let obj = translate(&module(
        vec![RawConstant::None],
        &[],
        &["d"],
        vec![
            Instruction::new("BUILD_MAP", 0, 0),
            Instruction::new("STORE_FAST", 0, 2),
            Instruction::new("LOAD_CONST", 0, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
        ],
    ))
    .unwrap();

    assert_eq!(
        obj.toplevel[0].stmts[0].1,
        Stmt::Assign {
            lhs: local("d"),
            rhs: Expr::Collection {
                kind: pyir::CollectionKind::Map,
                values: vec![],
            },
        }
    );
}

#[test]
fn unpack_sequence_pushes_subscripts_in_index_order() {
    let obj = translate(&module(
        vec![RawConstant::None],
        &[],
        &["pair", "x", "y"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("UNPACK_SEQUENCE", 2, 2),
            Instruction::new("STORE_FAST", 1, 4),
            Instruction::new("STORE_FAST", 2, 6),
            Instruction::new("LOAD_CONST", 0, 8),
            Instruction::new("RETURN_VALUE", 0, 10),
        ],
    ))
    .unwrap();

    let subscript = |i: i64| Expr::Subscript {
        exp: Box::new(local("pair")),
        index: Box::new(Expr::Const(Constant::Int(i))),
    };
    // the first store receives index 0
    assert_eq!(
        obj.toplevel[0].stmts[0].1,
        Stmt::Assign {
            lhs: local("x"),
            rhs: subscript(0),
        }
    );
    assert_eq!(
        obj.toplevel[0].stmts[1].1,
        Stmt::Assign {
            lhs: local("y"),
            rhs: subscript(1),
        }
    );
}

#[test]
fn unpack_sequence_of_zero_fails() {
    let err = translate(&module(
        vec![],
        &[],
        &["pair"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("UNPACK_SEQUENCE", 0, 2),
        ],
    ))
    .unwrap_err();

    assert_eq!(err.kind(), &TranslateErrorKind::UnpackSequence(0));
    assert_eq!(err.severity(), Severity::External);
}

#[test]
fn const_key_map_key_count_must_match() {
    let err = translate(&module(
        vec![
            RawConstant::Int(1),
            RawConstant::Tuple(vec![RawConstant::String("a".to_owned()), RawConstant::String("b".to_owned())]),
        ],
        &[],
        &[],
        vec![
            Instruction::new("LOAD_CONST", 0, 0),
            Instruction::new("LOAD_CONST", 1, 2),
            Instruction::new("BUILD_CONST_KEY_MAP", 1, 4),
        ],
    ))
    .unwrap_err();

    assert_eq!(err.kind(), &TranslateErrorKind::BuildConstKeyMapLength { expected: 1, got: 2 });
}

// === Attribute & Subscript Stores ===

#[test]
fn store_attr_and_store_subscr_build_compound_targets() {
    // obj.field = v; obj[k] = v
    let obj = translate(&module(
        vec![RawConstant::None],
        &["field"],
        &["obj", "k", "v"],
        vec![
            Instruction::new("LOAD_FAST", 2, 0),
            Instruction::new("LOAD_FAST", 0, 2),
            Instruction::new("STORE_ATTR", 0, 4),
            Instruction::new("LOAD_FAST", 2, 6),
            Instruction::new("LOAD_FAST", 0, 8),
            Instruction::new("LOAD_FAST", 1, 10),
            Instruction::new("STORE_SUBSCR", 0, 12),
            Instruction::new("LOAD_CONST", 0, 14),
            Instruction::new("RETURN_VALUE", 0, 16),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    assert_eq!(
        node.stmts[0].1,
        Stmt::Assign {
            lhs: Expr::GetAttr {
                exp: Box::new(local("obj")),
                attr: "field".to_owned(),
            },
            rhs: local("v"),
        }
    );
    assert_eq!(
        node.stmts[1].1,
        Stmt::Assign {
            lhs: Expr::Subscript {
                exp: Box::new(local("obj")),
                index: Box::new(local("k")),
            },
            rhs: local("v"),
        }
    );
}

#[test]
fn dup_top_duplicates_without_popping() {
    // a = b = x
    let obj = translate(&module(
        vec![RawConstant::None],
        &[],
        &["x", "a", "b"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("DUP_TOP", 0, 2),
            Instruction::new("STORE_FAST", 1, 4),
            Instruction::new("STORE_FAST", 2, 6),
            Instruction::new("LOAD_CONST", 0, 8),
            Instruction::new("RETURN_VALUE", 0, 10),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    assert_eq!(node.stmts[0].1, Stmt::Assign { lhs: local("a"), rhs: local("x") });
    assert_eq!(node.stmts[1].1, Stmt::Assign { lhs: local("b"), rhs: local("x") });
}

#[test]
fn load_closure_selects_cellvars_then_freevars() {
    let mut code = module(
        vec![RawConstant::None],
        &[],
        &[],
        vec![
            Instruction::new("LOAD_CLOSURE", 0, 0),
            Instruction::new("LOAD_CLOSURE", 1, 2),
            Instruction::new("BUILD_TUPLE", 2, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
        ],
    );
    code.co_cellvars = vec!["cell".to_owned()];
    code.co_freevars = vec!["free".to_owned()];
    let obj = translate(&code).unwrap();

    assert_eq!(
        obj.toplevel[0].last,
        Terminator::Return(Expr::Collection {
            kind: pyir::CollectionKind::Tuple,
            values: vec![
                Expr::LoadClosure("cell".to_owned()),
                Expr::LoadClosure("free".to_owned()),
            ],
        })
    );
}

// === Annotations ===

#[test]
fn setup_annotations_registers_the_dunder_and_emits_a_marker() {
    let obj = translate(&module(
        vec![RawConstant::None],
        &["__annotations__"],
        &[],
        vec![
            Instruction::new("SETUP_ANNOTATIONS", 0, 0),
            Instruction::new("LOAD_NAME", 0, 2),
            Instruction::new("POP_TOP", 0, 4),
            Instruction::new("LOAD_CONST", 0, 6),
            Instruction::new("RETURN_VALUE", 0, 8),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    assert_eq!(node.stmts[0].1, Stmt::SetupAnnotations);
    // the registered name resolves to the module slot afterwards
    let Stmt::Assign { rhs, .. } = &node.stmts[1].1 else {
        panic!("expected the discard assignment");
    };
    assert_eq!(rhs.to_string(), "test.__annotations__");
}

// === F-strings ===

#[test]
fn format_value_applies_conversion_then_format() {
    // f"{x!r:>10}"
    let obj = translate(&module(
        vec![RawConstant::String(">10".to_owned())],
        &[],
        &["x"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("LOAD_CONST", 0, 2),
            Instruction::new("FORMAT_VALUE", 6, 4),
            Instruction::new("RETURN_VALUE", 0, 6),
        ],
    ))
    .unwrap();

    let node = &obj.toplevel[0];
    assert_eq!(
        node.stmts[0].1,
        Stmt::BuiltinCall {
            lhs: Ssa(0),
            call: BuiltinCaller::FormatFn(FormatFunction::Repr),
            args: vec![local("x")],
        }
    );
    assert_eq!(
        node.stmts[1].1,
        Stmt::BuiltinCall {
            lhs: Ssa(1),
            call: BuiltinCaller::Format,
            args: vec![Expr::Temp(Ssa(0)), Expr::Const(Constant::String(">10".to_owned()))],
        }
    );
    assert_eq!(node.last, Terminator::Return(Expr::Temp(Ssa(1))));
}

// === Errors & Options ===

#[test]
fn compare_op_index_out_of_range_fails() {
    let err = translate(&module(
        vec![],
        &[],
        &["a", "b"],
        vec![
            Instruction::new("LOAD_FAST", 0, 0),
            Instruction::new("LOAD_FAST", 1, 2),
            Instruction::new("COMPARE_OP", 10, 4),
        ],
    ))
    .unwrap_err();

    assert_eq!(err.kind(), &TranslateErrorKind::CompareOp(10));
}

#[test]
fn unsupported_opcode_fails() {
    let err = translate(&module(
        vec![],
        &[],
        &[],
        vec![Instruction::new("SETUP_FINALLY", 0, 0)],
    ))
    .unwrap_err();

    assert_eq!(
        err.kind(),
        &TranslateErrorKind::UnsupportedOpcode("SETUP_FINALLY".to_owned())
    );
    assert_eq!(err.severity(), Severity::Internal);
}

#[test]
fn return_on_empty_stack_fails() {
    let err = translate(&module(vec![], &[], &[], vec![Instruction::new("RETURN_VALUE", 0, 0)])).unwrap_err();
    assert_eq!(err.kind(), &TranslateErrorKind::EmptyStack("RETURN_VALUE"));
}

#[test]
fn debug_option_traces_every_instruction() {
    let code = module(
        vec![RawConstant::Int(42)],
        &[],
        &[],
        vec![Instruction::new("LOAD_CONST", 0, 0), Instruction::new("RETURN_VALUE", 0, 2)],
    );
    let mut sink = CollectTrace::new();
    Translator::translate_module(&code, Options { debug: true }, &mut sink).unwrap();

    assert!(sink.output().contains("LOAD_CONST"));
    assert!(sink.output().contains("RETURN_VALUE"));
}

#[test]
fn code_objects_deserialize_from_frontend_dumps() {
    let json = r#"{
        "co_name": "<module>",
        "co_filename": "./demo.py",
        "co_consts": [{"Int": 7}],
        "instructions": [
            {"opname": "LOAD_CONST", "arg": 0, "offset": 0},
            {"opname": "RETURN_VALUE", "offset": 2}
        ]
    }"#;
    let code: CodeObject = serde_json::from_str(json).unwrap();
    let obj = translate(&code).unwrap();
    assert_eq!(obj.name.to_string(), "demo");
    assert_eq!(obj.toplevel[0].last, Terminator::Return(Expr::Const(Constant::Int(7))));
}
