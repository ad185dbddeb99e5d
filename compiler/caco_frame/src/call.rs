//! Call-site generation.
//!
//! # Sequence
//!
//! 1. Optionally align: save `rsp` twice, then drop one copy if the words
//!    about to be pushed would leave `rsp` off a 16-byte boundary. The
//!    caller cannot know its own stack parity statically, so the decision
//!    is made at run time.
//! 2. Reserve space for results that do not fit in registers.
//! 3. Evaluate stack arguments into temporaries, load register arguments,
//!    push the temporaries in reverse (the first excess argument ends up
//!    next to the return address).
//! 4. Call, release the stack arguments, read results back.
//! 5. Restore the saved `rsp` if step 1 ran.
//!
//! The link is always the last argument.

use caco_ir::{CfgNode, HardwareRegister, LValue, Register, VirtualRegisters, WORD_SIZE};

use crate::{CallConvention, CallableHandlers, FrameError, HandlerId, Layout};

/// What is being called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callee {
    /// Used in diagnostics only.
    pub name: String,
    /// Code address.
    pub code: CfgNode,
    /// Static link or closure environment; `None` for runtime routines.
    pub link: Option<CfgNode>,
    /// Declared parameter count.
    pub arity: usize,
    /// Flattened result size.
    pub result_size: usize,
}

impl Callee {
    /// A runtime routine: called by label, no link.
    pub fn foreign(label: &str, arity: usize, result_size: usize) -> Self {
        Self {
            name: label.to_owned(),
            code: CfgNode::label(label),
            link: None,
            arity,
            result_size,
        }
    }

    /// A call through a function value (`Layout::Function`).
    pub fn function_value(name: &str, value: &Layout, arity: usize, result_size: usize) -> Option<Self> {
        match value {
            Layout::Function { code, link } => Some(Self {
                name: name.to_owned(),
                code: code.clone(),
                link: Some(link.clone()),
                arity,
                result_size,
            }),
            Layout::Simple(_) | Layout::Struct(_) => None,
        }
    }
}

fn rsp() -> CfgNode {
    CfgNode::hardware(HardwareRegister::Rsp)
}

fn words(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX / WORD_SIZE) * WORD_SIZE
}

fn adjust_rsp(nodes: &mut Vec<CfgNode>, bytes: i64) {
    let value = if bytes < 0 {
        CfgNode::sub(rsp(), CfgNode::known(-bytes))
    } else {
        CfgNode::add(rsp(), CfgNode::known(bytes))
    };
    nodes.push(CfgNode::assign(LValue::hardware(HardwareRegister::Rsp), value));
}

/// Emit a complete call to `callee`.
///
/// `arguments` are the declared arguments; the callee's link, if any, is
/// appended. Results are copied into `result` when given.
pub fn generate_call(
    convention: &dyn CallConvention,
    callee: &Callee,
    arguments: &[Layout],
    result: Option<&Layout>,
    align: bool,
    regs: &mut VirtualRegisters,
) -> Result<Vec<CfgNode>, FrameError> {
    let link_count = usize::from(callee.link.is_some());
    if arguments.len() != callee.arity {
        return Err(FrameError::ArityMismatch {
            callee: callee.name.clone(),
            expected: callee.arity + link_count,
            found: arguments.len() + link_count,
        });
    }

    let mut flat: Vec<CfgNode> = arguments.iter().flat_map(Layout::flatten).collect();
    flat.extend(callee.link.iter().cloned());

    let register_count = flat.len().min(convention.argument_registers().len());
    let stack_arguments = flat.len() - register_count;
    let stack_results = convention.stack_result_count(callee.result_size);

    let mut nodes = Vec::new();

    if align {
        nodes.push(CfgNode::push(rsp()));
        nodes.push(CfgNode::push(rsp()));
        let parity = words((stack_arguments + stack_results) % 2);
        let shift = CfgNode::modulo(
            CfgNode::add(rsp(), CfgNode::known(parity)),
            CfgNode::known(2 * WORD_SIZE),
        );
        nodes.push(CfgNode::assign(
            LValue::hardware(HardwareRegister::Rsp),
            CfgNode::add(rsp(), shift),
        ));
    }

    if stack_results > 0 {
        adjust_rsp(&mut nodes, -words(stack_results));
    }

    let temporaries: Vec<_> = flat[register_count..]
        .iter()
        .map(|argument| {
            let temporary = regs.fresh(argument.holds_reference());
            nodes.push(CfgNode::assign(
                LValue::virtual_register(temporary),
                argument.clone(),
            ));
            temporary
        })
        .collect();

    for (argument, &register) in flat.iter().zip(convention.argument_registers()) {
        nodes.push(CfgNode::assign(
            LValue::register(Register::Fixed(register), argument.holds_reference()),
            argument.clone(),
        ));
    }

    for &temporary in temporaries.iter().rev() {
        nodes.push(CfgNode::push(CfgNode::virtual_register(temporary)));
    }

    nodes.push(CfgNode::call(callee.code.clone(), flat.len()));

    if stack_arguments > 0 {
        adjust_rsp(&mut nodes, words(stack_arguments));
    }

    let mut released = 0;
    if let Some(result) = result {
        let results = result.flatten();
        let destinations = results
            .iter()
            .map(|node| {
                node.as_lvalue().ok_or_else(|| FrameError::ResultNotAssignable {
                    callee: callee.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (destination, &register) in destinations.iter().zip(convention.result_registers()) {
            nodes.push(CfgNode::assign(
                destination.clone(),
                CfgNode::RegisterUse {
                    register: Register::Fixed(register),
                    holds_reference: destination.holds_reference(),
                },
            ));
        }

        for destination in destinations
            .iter()
            .skip(convention.result_registers().len())
            .take(stack_results)
        {
            let temporary = regs.fresh(destination.holds_reference());
            nodes.push(CfgNode::pop(LValue::virtual_register(temporary)));
            nodes.push(CfgNode::assign(
                destination.clone(),
                CfgNode::virtual_register(temporary),
            ));
            released += 1;
        }
    }
    if stack_results > released {
        adjust_rsp(&mut nodes, words(stack_results - released));
    }

    if align {
        nodes.push(CfgNode::pop(LValue::hardware(HardwareRegister::Rsp)));
    }

    tracing::trace!(
        callee = %callee.name,
        arguments = flat.len(),
        stack_arguments,
        stack_results,
        align,
        "generated call"
    );
    Ok(nodes)
}

/// Call the static function handled by `callee` from inside `caller`,
/// threading the static link.
pub fn generate_call_from(
    handlers: &CallableHandlers,
    caller: HandlerId,
    callee: HandlerId,
    arguments: &[Layout],
    result: Option<&Layout>,
    regs: &mut VirtualRegisters,
) -> Result<Vec<CfgNode>, FrameError> {
    let target = handlers.get(callee);
    if target.is_closure() {
        return Err(FrameError::ClosureCall {
            callee: target.label().to_owned(),
        });
    }
    let callee_info = Callee {
        name: target.label().to_owned(),
        code: CfgNode::label(target.label()),
        link: Some(handlers.static_link_for_call(caller, callee)?),
        arity: target.arity(),
        result_size: target.result_size(),
    };
    generate_call(
        handlers.convention(),
        &callee_info,
        arguments,
        result,
        handlers.options().align_calls,
        regs,
    )
}
