//! Static functions versus closures.

use caco_analysis::LambdaKind;
use caco_ir::{ProgramBuilder, TypeId};
use pretty_assertions::assert_eq;

use crate::common::{convert, define};

#[test]
fn returned_lambda_is_a_closure() {
    // mk { c { 1 }; c }
    let mut b = ProgramBuilder::new();
    let one = b.int(1);
    let (c_def, closure, c_binding) = define(&mut b, "c", vec![], TypeId::INT, one);
    let c_use = b.use_of(c_def);
    let body = b.block(vec![c_binding, c_use]);
    let closure_type = b.function_type(vec![], TypeId::INT);
    let (_, maker, binding) = define(&mut b, "mk", vec![], closure_type, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    assert_eq!(
        conversion.classification().kind(closure),
        Some(LambdaKind::Closure)
    );
    assert_eq!(
        conversion.classification().kind(maker),
        Some(LambdaKind::StaticFunction)
    );
    assert!(conversion.handler(closure).unwrap().is_closure());
}

#[test]
fn lambda_stored_in_an_outer_variable_is_a_closure() {
    // outer { zero { 0 }; let slot = zero; inner { c { 1 }; slot = c; 0 }; inner() }
    let mut b = ProgramBuilder::new();
    let fn_type = b.function_type(vec![], TypeId::INT);
    let slot = b.variable("slot", fn_type);

    let one = b.int(1);
    let (c_def, closure, c_binding) = define(&mut b, "c", vec![], TypeId::INT, one);
    let slot_use = b.use_of(slot);
    let c_use = b.use_of(c_def);
    let store = b.assign(slot_use, c_use);
    let zero = b.int(0);
    let inner_body = b.block(vec![c_binding, store, zero]);
    let (inner_def, inner, inner_binding) = define(&mut b, "inner", vec![], TypeId::INT, inner_body);

    let zero = b.int(0);
    let (zero_def, zero_fn, zero_binding) = define(&mut b, "zero", vec![], TypeId::INT, zero);
    let zero_use = b.use_of(zero_def);
    let decl_slot = b.declare(slot, zero_use);
    let inner_use = b.use_of(inner_def);
    let call_inner = b.call(inner_use, vec![]);
    let body = b.block(vec![zero_binding, decl_slot, inner_binding, call_inner]);
    let (_, outer, binding) = define(&mut b, "outer", vec![], TypeId::INT, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    let classification = conversion.classification();
    assert!(classification.is_closure(closure));
    assert!(classification.is_static(inner));
    assert!(classification.is_static(outer));
    // Stored at its own level only.
    assert!(classification.is_static(zero_fn));
}

#[test]
fn anonymous_lambda_is_a_closure() {
    // main { let anon = [] => 2; anon() }
    let mut b = ProgramBuilder::new();
    let fn_type = b.function_type(vec![], TypeId::INT);
    let anon = b.variable("anon", fn_type);
    let two = b.int(2);
    let lambda = b.lambda(vec![], TypeId::INT, two);
    let decl = b.declare(anon, lambda);
    let anon_use = b.use_of(anon);
    let call = b.call(anon_use, vec![]);
    let body = b.block(vec![decl, call]);
    let (_, main, binding) = define(&mut b, "main", vec![], TypeId::INT, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    assert!(conversion.classification().is_closure(lambda));
    assert!(conversion.classification().is_static(main));
    assert_eq!(
        conversion.handler(lambda).unwrap().label(),
        format!("lambda_{}", lambda.raw())
    );
}

#[test]
fn named_local_helper_is_static() {
    // g { h { 1 }; h() }
    let mut b = ProgramBuilder::new();
    let one = b.int(1);
    let (h_def, helper, h_binding) = define(&mut b, "h", vec![], TypeId::INT, one);
    let h_use = b.use_of(h_def);
    let call = b.call(h_use, vec![]);
    let body = b.block(vec![h_binding, call]);
    let (_, g, binding) = define(&mut b, "g", vec![], TypeId::INT, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    assert!(conversion.classification().is_static(helper));
    assert!(conversion.classification().is_static(g));
    assert_eq!(conversion.handlers().closures().count(), 0);
    assert_eq!(conversion.handlers().static_functions().count(), 2);
}

#[test]
fn helper_captured_by_an_escaping_closure_becomes_a_closure() {
    // mk { s { 1 }; c { s() }; c }
    let mut b = ProgramBuilder::new();
    let one = b.int(1);
    let (s_def, helper, s_binding) = define(&mut b, "s", vec![], TypeId::INT, one);
    let s_use = b.use_of(s_def);
    let call_s = b.call(s_use, vec![]);
    let (c_def, closure, c_binding) = define(&mut b, "c", vec![], TypeId::INT, call_s);
    let c_use = b.use_of(c_def);
    let body = b.block(vec![s_binding, c_binding, c_use]);
    let closure_type = b.function_type(vec![], TypeId::INT);
    let (_, _, binding) = define(&mut b, "mk", vec![], closure_type, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    assert!(conversion.classification().is_closure(closure));
    assert!(conversion.classification().is_closure(helper));
}
