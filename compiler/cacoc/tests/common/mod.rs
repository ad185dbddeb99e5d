//! Shared helpers for the scenario tests.

use cacoc::{convert_closures, init_tracing, BackendConfig, ClosureConversion};
use caco_ir::{CfgNode, DefId, ExprId, HardwareRegister, Program, ProgramBuilder, TypeId};

pub fn convert(program: &Program) -> ClosureConversion {
    convert_with(program, &BackendConfig::default())
}

pub fn convert_with(program: &Program, config: &BackendConfig) -> ClosureConversion {
    init_tracing();
    convert_closures(program, config).expect("closure conversion succeeds")
}

/// Bind `name` to a lambda over `params` with the given body.
///
/// Returns the definition, the lambda and the binding expression.
pub fn define(
    b: &mut ProgramBuilder,
    name: &str,
    params: Vec<DefId>,
    result: TypeId,
    body: ExprId,
) -> (DefId, ExprId, ExprId) {
    let def = b.function_name(name, &params, result);
    let lambda = b.lambda(params, result, body);
    let binding = b.function(def, lambda);
    (def, lambda, binding)
}

pub fn rbp() -> CfgNode {
    CfgNode::hardware(HardwareRegister::Rbp)
}

pub fn rsp() -> CfgNode {
    CfgNode::hardware(HardwareRegister::Rsp)
}

/// `[address]`, not a reference.
pub fn load(address: CfgNode) -> CfgNode {
    CfgNode::MemoryAccess {
        address: Box::new(address),
        holds_reference: false,
    }
}

pub fn load_reference(address: CfgNode) -> CfgNode {
    CfgNode::MemoryAccess {
        address: Box::new(address),
        holds_reference: true,
    }
}
