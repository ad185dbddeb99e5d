//! Prologues and epilogues generated through the pipeline.

use caco_ir::{BinaryOp, CfgNode, HardwareRegister, LValue, ProgramBuilder, TypeId};
use cacoc::BackendConfig;
use pretty_assertions::assert_eq;

use crate::common::{convert, convert_with, define, rbp, rsp};

#[test]
fn prologue_and_epilogue_bracket_the_frame() {
    let mut b = ProgramBuilder::new();
    let p = b.param("p", TypeId::INT);
    let read_p = b.use_of(p);
    let (_, f, binding) = define(&mut b, "f", vec![p], TypeId::INT, read_p);
    let program = b.finish(binding);

    let mut conversion = convert(&program);
    let prologue = conversion.prologue(f).unwrap();
    let epilogue = conversion.epilogue(f).unwrap();

    assert_eq!(prologue[0], CfgNode::push(rbp()));
    assert_eq!(
        prologue[1],
        CfgNode::assign(
            LValue::hardware(HardwareRegister::Rbp),
            CfgNode::sub(rsp(), CfgNode::known(8))
        )
    );
    // p arrives in RDI, the static link in RSI.
    let p_access = conversion.variable_access(f, p).unwrap();
    assert!(prologue.contains(&CfgNode::assign(
        p_access,
        CfgNode::hardware(HardwareRegister::Rdi)
    )));
    assert_eq!(
        prologue.last(),
        Some(&CfgNode::assign(
            LValue::memory(CfgNode::sub(rbp(), CfgNode::known(0)), false),
            CfgNode::hardware(HardwareRegister::Rsi)
        ))
    );

    let n = epilogue.len();
    assert_eq!(
        epilogue[n - 2..].to_vec(),
        vec![
            CfgNode::assign(
                LValue::hardware(HardwareRegister::Rsp),
                CfgNode::add(rbp(), CfgNode::known(8))
            ),
            CfgNode::pop(LValue::hardware(HardwareRegister::Rbp)),
        ]
    );
}

/// `mk(a) { c { a + 1 }; c }`: the captured parameter moves into a heap cell.
#[test]
fn captured_parameter_is_copied_into_its_cell() {
    let mut b = ProgramBuilder::new();
    let a = b.param("a", TypeId::INT);
    let read_a = b.use_of(a);
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, read_a, one);
    let (c_def, _, c_binding) = define(&mut b, "c", vec![], TypeId::INT, sum);
    let c_use = b.use_of(c_def);
    let body = b.block(vec![c_binding, c_use]);
    let closure_type = b.function_type(vec![], TypeId::INT);
    let (_, maker, binding) = define(&mut b, "mk", vec![a], closure_type, body);
    let program = b.finish(binding);

    let mut conversion = convert_with(
        &program,
        &BackendConfig::default().with_heap_cell_allocator("rt_cell"),
    );
    let a_access = conversion.variable_access(maker, a).unwrap();
    let prologue = conversion.prologue(maker).unwrap();

    let first_call = prologue
        .iter()
        .position(|node| *node == CfgNode::call(CfgNode::label("rt_cell"), 1))
        .unwrap();
    let binding = prologue
        .iter()
        .position(|node| matches!(node, CfgNode::Assign { dst, .. } if *dst == a_access))
        .unwrap();
    assert!(first_call < binding);

    // The parameter is parked in a temporary before any call clobbers RDI.
    let CfgNode::Assign { value, .. } = &prologue[binding] else {
        unreachable!()
    };
    assert!(matches!(
        value.as_ref(),
        CfgNode::RegisterUse {
            register: caco_ir::Register::Virtual(_),
            ..
        }
    ));
}

#[test]
fn epilogue_returns_function_values_in_two_registers() {
    // mk { c { 1 }; c }
    let mut b = ProgramBuilder::new();
    let one = b.int(1);
    let (c_def, _, c_binding) = define(&mut b, "c", vec![], TypeId::INT, one);
    let c_use = b.use_of(c_def);
    let body = b.block(vec![c_binding, c_use]);
    let closure_type = b.function_type(vec![], TypeId::INT);
    let (_, maker, binding) = define(&mut b, "mk", vec![], closure_type, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    let handler = conversion.handler(maker).unwrap();
    assert_eq!(handler.result_size(), 2);

    let result = handler.result_layout().flatten();
    let epilogue = conversion.epilogue(maker).unwrap();
    assert!(epilogue.contains(&CfgNode::assign(
        LValue::hardware(HardwareRegister::Rax),
        result[0].clone()
    )));
    // The link half is a reference.
    assert!(epilogue.contains(&CfgNode::assign(
        LValue::register(caco_ir::Register::Fixed(HardwareRegister::Rdx), true),
        result[1].clone()
    )));
}
