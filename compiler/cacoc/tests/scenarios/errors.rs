//! Internal errors surface as `CompileError`s with an ICE prefix.

use caco_frame::FrameError;
use caco_ir::{DefId, ExprId, ProgramBuilder, TypeId};
use cacoc::CompileError;

use crate::common::{convert, define};

#[test]
fn wrong_argument_count_is_an_arity_mismatch() {
    let mut b = ProgramBuilder::new();
    let p = b.param("p", TypeId::INT);
    let read_p = b.use_of(p);
    let (f_def, f, f_binding) = define(&mut b, "f", vec![p], TypeId::INT, read_p);
    let f_use = b.use_of(f_def);
    let two = b.int(2);
    let call = b.call(f_use, vec![two]);
    let body = b.block(vec![f_binding, call]);
    let (_, g, binding) = define(&mut b, "g", vec![], TypeId::INT, body);
    let program = b.finish(binding);

    let mut conversion = convert(&program);
    let error = conversion.call(g, f, &[], None).unwrap_err();
    assert_eq!(
        error,
        CompileError::Frame(FrameError::ArityMismatch {
            callee: "f".to_owned(),
            expected: 2,
            found: 1,
        })
    );
    assert_eq!(
        error.to_string(),
        "internal compiler error: call to `f` passes 1 arguments, expected 2"
    );
}

#[test]
fn unknown_lambda_and_definition_are_reported() {
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let (_, f, binding) = define(&mut b, "f", vec![], TypeId::INT, zero);
    let program = b.finish(binding);
    let conversion = convert(&program);

    let stranger = ExprId::new(9999);
    assert_eq!(
        conversion.epilogue(stranger).unwrap_err(),
        CompileError::UnknownLambda(stranger)
    );
    assert!(matches!(
        conversion.handler(stranger),
        Err(CompileError::Frame(FrameError::MissingHandler(_)))
    ));

    let missing = DefId::new(9999);
    assert_eq!(
        conversion.variable_access(f, missing).unwrap_err(),
        CompileError::UnknownDefinition(missing)
    );
}

#[test]
fn variable_of_an_unrelated_function_is_inaccessible() {
    // top { a { let x = 1; x }; b { 0 }; b() }
    let mut b = ProgramBuilder::new();
    let x = b.variable("x", TypeId::INT);
    let one = b.int(1);
    let decl_x = b.declare(x, one);
    let read_x = b.use_of(x);
    let a_body = b.block(vec![decl_x, read_x]);
    let (_, _, a_binding) = define(&mut b, "a", vec![], TypeId::INT, a_body);
    let zero = b.int(0);
    let (b_def, sibling, b_binding) = define(&mut b, "b", vec![], TypeId::INT, zero);
    let b_use = b.use_of(b_def);
    let call = b.call(b_use, vec![]);
    let body = b.block(vec![a_binding, b_binding, call]);
    let (_, _, binding) = define(&mut b, "top", vec![], TypeId::INT, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    let error = conversion.variable_access(sibling, x).unwrap_err();
    assert!(matches!(
        error,
        CompileError::Frame(FrameError::VariableAccess { ref function, .. }) if function == "b"
    ));
    assert!(error.to_string().starts_with("internal compiler error: `b` has no access"));
}
