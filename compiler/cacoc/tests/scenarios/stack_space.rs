//! Frame sizes: the link always takes the first word, locals shared with
//! nested functions take one word each, everything else lives in registers.

use caco_frame::VariableAllocation;
use caco_ir::{BinaryOp, CfgNode, HardwareRegister, LValue, ProgramBuilder, TypeId};
use pretty_assertions::assert_eq;

use crate::common::{convert, define, rbp, rsp};

#[test]
fn function_without_variables_reserves_only_its_link() {
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let (_, f, binding) = define(&mut b, "f", vec![], TypeId::INT, zero);
    let program = b.finish(binding);

    let conversion = convert(&program);
    let handler = conversion.handler(f).unwrap();
    assert_eq!(handler.stack_space().get(), 8);
    assert_eq!(
        handler.get_variable_allocation(handler.link()),
        Ok(&VariableAllocation::OnStack(0))
    );
}

/// `g(a) { let x = a; inner() { x }; inner() }`
#[test]
fn nested_used_local_takes_a_second_word() {
    let mut b = ProgramBuilder::new();
    let a = b.param("a", TypeId::INT);
    let x = b.variable("x", TypeId::INT);

    let read_x = b.use_of(x);
    let (inner_def, _, inner_binding) = define(&mut b, "inner", vec![], TypeId::INT, read_x);
    let read_a = b.use_of(a);
    let decl_x = b.declare(x, read_a);
    let inner_use = b.use_of(inner_def);
    let call_inner = b.call(inner_use, vec![]);
    let body = b.block(vec![decl_x, inner_binding, call_inner]);
    let (_, g, binding) = define(&mut b, "g", vec![a], TypeId::INT, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    let handler = conversion.handler(g).unwrap();
    assert_eq!(handler.stack_space().get(), 16);

    let x = conversion.variable(x).unwrap();
    let a = conversion.variable(a).unwrap();
    assert_eq!(handler.get_variable_allocation(x), Ok(&VariableAllocation::OnStack(8)));
    assert!(handler
        .get_variable_allocation(a)
        .is_ok_and(VariableAllocation::is_in_register));
}

/// `g(a, b) { let t = a + b; t }`: nothing is shared, so nothing but the
/// link touches the stack.
#[test]
fn unshared_locals_stay_in_registers() {
    let mut b = ProgramBuilder::new();
    let p = b.param("p", TypeId::INT);
    let q = b.param("q", TypeId::INT);
    let t = b.variable("t", TypeId::INT);

    let read_p = b.use_of(p);
    let read_q = b.use_of(q);
    let sum = b.binary(BinaryOp::Add, read_p, read_q);
    let decl_t = b.declare(t, sum);
    let read_t = b.use_of(t);
    let body = b.block(vec![decl_t, read_t]);
    let (_, g, binding) = define(&mut b, "g", vec![p, q], TypeId::INT, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    let handler = conversion.handler(g).unwrap();
    assert_eq!(handler.stack_space().get(), 8);
    assert_eq!(handler.frame().stack_offsets(), vec![0]);
    assert_eq!(handler.arity(), 2);
    assert_eq!(handler.argument_count(), 3);
}

/// Spill slots handed out after the prologue still land in its frame.
#[test]
fn spill_slots_grow_the_reserved_space() {
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let (_, f, binding) = define(&mut b, "f", vec![], TypeId::INT, zero);
    let program = b.finish(binding);

    let mut conversion = convert(&program);
    let prologue = conversion.prologue(f).unwrap();

    let first = conversion.spill_slot(f, false).unwrap();
    let second = conversion.spill_slot(f, true).unwrap();
    assert_eq!(
        first,
        LValue::memory(CfgNode::sub(rbp(), CfgNode::known(8)), false)
    );
    assert_eq!(
        second,
        LValue::memory(CfgNode::sub(rbp(), CfgNode::known(16)), true)
    );

    let handler = conversion.handler(f).unwrap();
    assert_eq!(handler.stack_space().get(), 24);
    assert_eq!(handler.reference_accesses(), &[16]);
    assert_eq!(
        prologue[2],
        CfgNode::assign(
            LValue::hardware(HardwareRegister::Rsp),
            CfgNode::sub(rsp(), CfgNode::known(24))
        )
    );
}
