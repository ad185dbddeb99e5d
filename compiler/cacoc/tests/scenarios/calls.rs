//! Call sites: argument marshalling, dynamic alignment, results and calls
//! through function values.

use caco_frame::Layout;
use caco_ir::{CfgNode, ExprId, HardwareRegister, LValue, Program, ProgramBuilder, Register, TypeId};
use cacoc::BackendConfig;
use pretty_assertions::assert_eq;

use crate::common::{convert, convert_with, define, rbp, rsp};

const ARGUMENT_REGISTERS: [HardwareRegister; 6] = [
    HardwareRegister::Rdi,
    HardwareRegister::Rsi,
    HardwareRegister::Rdx,
    HardwareRegister::Rcx,
    HardwareRegister::R8,
    HardwareRegister::R9,
];

/// `outer { f(p0, .., pn) { 0 }; f(0, .., n) }`
fn caller_of(arity: usize) -> (Program, ExprId, ExprId) {
    let mut b = ProgramBuilder::new();
    let params: Vec<_> = (0..arity)
        .map(|i| b.param(&format!("p{i}"), TypeId::INT))
        .collect();
    let zero = b.int(0);
    let (f_def, f, f_binding) = define(&mut b, "f", params, TypeId::INT, zero);

    let args: Vec<_> = (0..arity).map(|i| b.int(i64::try_from(i).unwrap())).collect();
    let f_use = b.use_of(f_def);
    let call = b.call(f_use, args);
    let body = b.block(vec![f_binding, call]);
    let (_, outer, binding) = define(&mut b, "outer", vec![], TypeId::INT, body);
    (b.finish(binding), outer, f)
}

fn arguments(count: usize) -> Vec<Layout> {
    (0..count)
        .map(|i| Layout::Simple(CfgNode::known(i64::try_from(i).unwrap())))
        .collect()
}

fn register_writes(nodes: &[CfgNode]) -> Vec<(HardwareRegister, CfgNode)> {
    nodes
        .iter()
        .take_while(|node| !matches!(node, CfgNode::Call { .. }))
        .filter_map(|node| match node {
            CfgNode::Assign { dst, value } => match dst.as_node() {
                CfgNode::RegisterUse {
                    register: Register::Fixed(register),
                    ..
                } if *register != HardwareRegister::Rsp => Some((*register, (**value).clone())),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn pushed_arguments(nodes: &[CfgNode]) -> usize {
    nodes
        .iter()
        .filter(|node| matches!(node, CfgNode::Push(value) if **value != rsp()))
        .count()
}

fn alignment_padding(nodes: &[CfgNode]) -> Option<i64> {
    nodes.iter().find_map(|node| {
        let CfgNode::Assign { value, .. } = node else {
            return None;
        };
        let CfgNode::Add(_, shift) = value.as_ref() else {
            return None;
        };
        let CfgNode::Mod(dividend, _) = shift.as_ref() else {
            return None;
        };
        let CfgNode::Add(_, padding) = dividend.as_ref() else {
            return None;
        };
        match padding.as_ref() {
            CfgNode::Constant(constant) => Some(constant.value()),
            _ => None,
        }
    })
}

#[test]
fn arguments_go_to_registers_in_order_then_the_stack() {
    for arity in 0..=10 {
        let (program, outer, f) = caller_of(arity);
        let mut conversion = convert(&program);
        let nodes = conversion.call(outer, f, &arguments(arity), None).unwrap();

        let writes = register_writes(&nodes);
        let in_registers = (arity + 1).min(6);
        let registers: Vec<_> = writes.iter().map(|(register, _)| *register).collect();
        assert_eq!(registers, ARGUMENT_REGISTERS[..in_registers].to_vec(), "arity {arity}");
        for (index, (_, value)) in writes.iter().enumerate().take(arity) {
            assert_eq!(*value, CfgNode::known(i64::try_from(index).unwrap()));
        }
        assert_eq!(pushed_arguments(&nodes), arity + 1 - in_registers, "arity {arity}");
        assert!(nodes.contains(&CfgNode::call(CfgNode::label("f"), arity + 1)));
    }
}

#[test]
fn alignment_padding_by_argument_count() {
    let expected = [0, 0, 0, 0, 0, 0, 8, 0, 8, 0, 8];
    let padding: Vec<i64> = (0..=10)
        .map(|arity| {
            let (program, outer, f) = caller_of(arity);
            let mut conversion = convert(&program);
            let nodes = conversion.call(outer, f, &arguments(arity), None).unwrap();
            alignment_padding(&nodes).unwrap()
        })
        .collect();
    assert_eq!(padding, expected.to_vec());
}

#[test]
fn alignment_can_be_turned_off() {
    let (program, outer, f) = caller_of(7);
    let mut conversion = convert_with(&program, &BackendConfig::default().with_align_calls(false));
    let nodes = conversion.call(outer, f, &arguments(7), None).unwrap();
    assert_eq!(alignment_padding(&nodes), None);
    assert!(!nodes.contains(&CfgNode::push(rsp())));
    // Still releases its two stack arguments.
    assert!(nodes.contains(&CfgNode::assign(
        LValue::hardware(HardwareRegister::Rsp),
        CfgNode::add(rsp(), CfgNode::known(16))
    )));
}

#[test]
fn parent_passes_its_own_frame_as_link() {
    let (program, outer, f) = caller_of(1);
    let mut conversion = convert(&program);
    let nodes = conversion.call(outer, f, &arguments(1), None).unwrap();
    assert_eq!(
        register_writes(&nodes),
        vec![
            (HardwareRegister::Rdi, CfgNode::known(0)),
            (HardwareRegister::Rsi, rbp()),
        ]
    );
}

#[test]
fn result_is_read_from_rax() {
    let (program, outer, f) = caller_of(0);
    let mut conversion = convert(&program);
    let destination = conversion.registers_mut().fresh(false);
    let result = Layout::Simple(CfgNode::virtual_register(destination));
    let nodes = conversion.call(outer, f, &[], Some(&result)).unwrap();

    let call = nodes
        .iter()
        .position(|node| matches!(node, CfgNode::Call { .. }))
        .unwrap();
    assert_eq!(
        nodes[call + 1],
        CfgNode::assign(
            LValue::virtual_register(destination),
            CfgNode::hardware(HardwareRegister::Rax)
        )
    );
    assert_eq!(nodes.last(), Some(&CfgNode::pop(LValue::hardware(HardwareRegister::Rsp))));
}

/// `mk { let x = 1; c { x }; c }`, then a call through `c`'s value.
#[test]
fn closure_is_called_through_its_function_value() {
    let mut b = ProgramBuilder::new();
    let x = b.variable("x", TypeId::INT);
    let read_x = b.use_of(x);
    let (c_def, closure, c_binding) = define(&mut b, "c", vec![], TypeId::INT, read_x);
    let one = b.int(1);
    let decl_x = b.declare(x, one);
    let c_use = b.use_of(c_def);
    let body = b.block(vec![decl_x, c_binding, c_use]);
    let closure_type = b.function_type(vec![], TypeId::INT);
    let (_, maker, binding) = define(&mut b, "mk", vec![], closure_type, body);
    let program = b.finish(binding);

    let mut conversion = convert(&program);
    assert!(conversion.handler(closure).unwrap().is_closure());

    let maker_id = conversion.handler(maker).unwrap().id();
    let c_var = conversion.variable(c_def).unwrap();
    let value = conversion
        .handlers()
        .variable_layout(maker_id, conversion.arena(), c_var)
        .unwrap();
    let Layout::Function { code, link } = value.clone() else {
        panic!("function variable has a function layout, got {value:?}");
    };

    let destination = conversion.registers_mut().fresh(false);
    let result = Layout::Simple(CfgNode::virtual_register(destination));
    let nodes = conversion
        .call_value("c", &value, 0, &[], Some(&result))
        .unwrap();

    assert_eq!(register_writes(&nodes), vec![(HardwareRegister::Rdi, link)]);
    assert!(nodes.contains(&CfgNode::call(code, 1)));

    // Calling the closure by label is refused.
    assert!(conversion.call(maker, closure, &[], None).is_err());
}

#[test]
fn only_function_values_can_be_called() {
    let (program, _, _) = caller_of(0);
    let mut conversion = convert(&program);
    let value = Layout::Simple(CfgNode::known(0));
    assert!(matches!(
        conversion.call_value("n", &value, 0, &[], None),
        Err(cacoc::CompileError::NotAFunctionValue(name)) if name == "n"
    ));
}
