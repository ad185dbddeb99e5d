//! Variable and frame pointer access across nesting levels.

use caco_frame::{FrameError, VariableAllocation};
use caco_ir::{BinaryOp, CfgNode, DefId, ExprId, LValue, Program, ProgramBuilder, TypeId};
use cacoc::CompileError;
use pretty_assertions::assert_eq;

use crate::common::{convert, define, load, load_reference, rbp};

struct Nest {
    program: Program,
    x: DefId,
    h: ExprId,
    g: ExprId,
    f: ExprId,
}

/// `h { let x = 1; g { f { x }; f() }; g() }`
fn nest() -> Nest {
    let mut b = ProgramBuilder::new();
    let x = b.variable("x", TypeId::INT);

    let read_x = b.use_of(x);
    let (f_def, f, f_binding) = define(&mut b, "f", vec![], TypeId::INT, read_x);
    let f_use = b.use_of(f_def);
    let call_f = b.call(f_use, vec![]);
    let g_body = b.block(vec![f_binding, call_f]);
    let (g_def, g, g_binding) = define(&mut b, "g", vec![], TypeId::INT, g_body);

    let one = b.int(1);
    let decl_x = b.declare(x, one);
    let g_use = b.use_of(g_def);
    let call_g = b.call(g_use, vec![]);
    let h_body = b.block(vec![decl_x, g_binding, call_g]);
    let (_, h, h_binding) = define(&mut b, "h", vec![], TypeId::INT, h_body);

    Nest {
        program: b.finish(h_binding),
        x,
        h,
        g,
        f,
    }
}

#[test]
fn static_depths_follow_nesting() {
    let nest = nest();
    let conversion = convert(&nest.program);
    let depths: Vec<u32> = [nest.h, nest.g, nest.f]
        .iter()
        .map(|&lambda| conversion.handler(lambda).unwrap().static_depth())
        .collect();
    assert_eq!(depths, vec![0, 1, 2]);
}

#[test]
fn two_levels_up_walks_the_static_link_twice() {
    let nest = nest();
    let conversion = convert(&nest.program);

    let x = conversion.variable(nest.x).unwrap();
    let offset = conversion
        .handler(nest.h)
        .unwrap()
        .get_variable_allocation(x)
        .ok()
        .and_then(VariableAllocation::stack_offset)
        .unwrap();
    assert_eq!(offset, 8);

    assert_eq!(
        conversion.variable_access(nest.f, nest.x).unwrap(),
        LValue::memory(
            CfgNode::sub(load(load(rbp())), CfgNode::known(offset)),
            false
        )
    );
    // One level less from g.
    assert_eq!(
        conversion.variable_access(nest.g, nest.x).unwrap(),
        LValue::memory(CfgNode::sub(load(rbp()), CfgNode::known(offset)), false)
    );
    // And none from h itself.
    assert_eq!(
        conversion.variable_access(nest.h, nest.x).unwrap(),
        LValue::memory(CfgNode::sub(rbp(), CfgNode::known(offset)), false)
    );
}

#[test]
fn own_link_is_one_load_at_offset_zero() {
    let nest = nest();
    let conversion = convert(&nest.program);
    let handlers = conversion.handlers();

    for lambda in [nest.h, nest.g, nest.f] {
        let handler = conversion.handler(lambda).unwrap();
        let access = handlers
            .generate_variable_access(handler.id(), handler.link())
            .unwrap();
        assert_eq!(access.into_node(), load(CfgNode::sub(rbp(), CfgNode::known(0))));
    }
}

#[test]
fn frame_pointers_of_ancestors() {
    let nest = nest();
    let conversion = convert(&nest.program);
    assert_eq!(conversion.frame_pointer(nest.f, nest.f).unwrap(), rbp());
    assert_eq!(conversion.frame_pointer(nest.f, nest.g).unwrap(), load(rbp()));
    assert_eq!(conversion.frame_pointer(nest.f, nest.h).unwrap(), load(load(rbp())));
}

#[test]
fn descendants_are_out_of_reach() {
    let nest = nest();
    let conversion = convert(&nest.program);
    assert!(matches!(
        conversion.frame_pointer(nest.h, nest.f),
        Err(CompileError::Frame(FrameError::FramePointerAccess { .. }))
    ));
}

struct Maker {
    program: Program,
    x: DefId,
    y: DefId,
    maker: ExprId,
    closure: ExprId,
    helper: ExprId,
}

/// `mk { let x = 1; c { let y = 2; s { x + y }; s() }; c }`
fn maker() -> Maker {
    let mut b = ProgramBuilder::new();
    let x = b.variable("x", TypeId::INT);
    let y = b.variable("y", TypeId::INT);

    let read_x = b.use_of(x);
    let read_y = b.use_of(y);
    let sum = b.binary(BinaryOp::Add, read_x, read_y);
    let (s_def, helper, s_binding) = define(&mut b, "s", vec![], TypeId::INT, sum);

    let two = b.int(2);
    let decl_y = b.declare(y, two);
    let s_use = b.use_of(s_def);
    let call_s = b.call(s_use, vec![]);
    let c_body = b.block(vec![decl_y, s_binding, call_s]);
    let (c_def, closure, c_binding) = define(&mut b, "c", vec![], TypeId::INT, c_body);

    let one = b.int(1);
    let decl_x = b.declare(x, one);
    let c_use = b.use_of(c_def);
    let mk_body = b.block(vec![decl_x, c_binding, c_use]);
    let closure_type = b.function_type(vec![], TypeId::INT);
    let (_, maker, mk_binding) = define(&mut b, "mk", vec![], closure_type, mk_body);

    Maker {
        program: b.finish(mk_binding),
        x,
        y,
        maker,
        closure,
        helper,
    }
}

#[test]
fn captured_variable_lives_in_a_heap_cell() {
    let m = maker();
    let conversion = convert(&m.program);
    let x = conversion.variable(m.x).unwrap();
    assert!(conversion.escapes().escapes(x));

    let maker = conversion.handler(m.maker).unwrap();
    let pointer = maker.heap_pointer(x).unwrap();
    let pointer_offset = maker
        .get_variable_allocation(pointer)
        .ok()
        .and_then(VariableAllocation::stack_offset)
        .unwrap();
    assert!(maker.reference_accesses().contains(&pointer_offset));

    let cell = load_reference(CfgNode::sub(rbp(), CfgNode::known(pointer_offset)));
    assert_eq!(
        conversion.variable_access(m.maker, m.x).unwrap().into_node(),
        load(CfgNode::add(cell, CfgNode::known(0)))
    );
}

#[test]
fn closure_reads_captures_through_its_environment() {
    let m = maker();
    let conversion = convert(&m.program);
    let environment = load_reference(CfgNode::sub(rbp(), CfgNode::known(0)));
    let slot = load_reference(CfgNode::add(environment, CfgNode::known(0)));
    assert_eq!(
        conversion.variable_access(m.closure, m.x).unwrap().into_node(),
        load(CfgNode::add(slot, CfgNode::known(0)))
    );
}

#[test]
fn closure_cannot_reach_enclosing_frames() {
    let m = maker();
    let conversion = convert(&m.program);
    assert!(matches!(
        conversion.frame_pointer(m.closure, m.maker),
        Err(CompileError::Frame(FrameError::FramePointerAccess { .. }))
    ));
}

#[test]
fn static_helper_inside_closure_uses_both_chains() {
    let m = maker();
    let conversion = convert(&m.program);

    let helper = conversion.handler(m.helper).unwrap();
    let closure = conversion.handler(m.closure).unwrap();
    assert_eq!(helper.ancestors(), &[closure.id()]);

    let y = conversion.variable(m.y).unwrap();
    let y_offset = closure
        .get_variable_allocation(y)
        .ok()
        .and_then(VariableAllocation::stack_offset)
        .unwrap();
    assert_eq!(
        conversion.variable_access(m.helper, m.y).unwrap(),
        LValue::memory(CfgNode::sub(load(rbp()), CfgNode::known(y_offset)), false)
    );

    let environment = load_reference(CfgNode::sub(load(rbp()), CfgNode::known(0)));
    let slot = load_reference(CfgNode::add(environment, CfgNode::known(0)));
    assert_eq!(
        conversion.variable_access(m.helper, m.x).unwrap().into_node(),
        load(CfgNode::add(slot, CfgNode::known(0)))
    );
}

#[test]
fn registers_are_private_to_their_frame() {
    // g(a) { inner() { 0 }; inner() }: `a` stays in a register of g.
    let mut b = ProgramBuilder::new();
    let a = b.param("a", TypeId::INT);
    let zero = b.int(0);
    let (inner_def, inner, inner_binding) = define(&mut b, "inner", vec![], TypeId::INT, zero);
    let inner_use = b.use_of(inner_def);
    let call_inner = b.call(inner_use, vec![]);
    let body = b.block(vec![inner_binding, call_inner]);
    let (_, g, binding) = define(&mut b, "g", vec![a], TypeId::INT, body);
    let program = b.finish(binding);

    let conversion = convert(&program);
    assert!(conversion.variable_access(g, a).is_ok());
    assert!(matches!(
        conversion.variable_access(inner, a),
        Err(CompileError::Frame(FrameError::VariableAccess { .. }))
    ));
}
