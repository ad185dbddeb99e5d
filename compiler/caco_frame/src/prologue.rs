//! Prologue and epilogue generation.
//!
//! Prologue:
//! 1. `push rbp`, then `rbp = rsp - 8`: the word right below the saved
//!    frame pointer becomes the link slot at `OnStack(0)`.
//! 2. `rsp -= stack space` (lazy: spills may still grow the frame).
//! 3. Copy preserved registers into their save registers.
//! 4. Bind each flattened parameter and the link from where the
//!    convention delivers them. If the frame owns heap cells, the incoming
//!    values are parked in temporaries first and the cells are allocated
//!    before binding, since the allocation call clobbers argument
//!    registers and parameters may themselves live in cells.
//!
//! Epilogue restores preserved registers, moves the result layout into the
//! convention's result locations and unwinds `rsp`/`rbp`. The `ret` itself
//! belongs to instruction selection.

use caco_ir::{CfgNode, HardwareRegister, LValue, VirtualRegisters, WORD_SIZE};

use crate::call::{generate_call, Callee};
use crate::{CallableHandlers, FrameError, HandlerId, Layout};

fn rbp() -> CfgNode {
    CfgNode::hardware(HardwareRegister::Rbp)
}

fn rsp() -> CfgNode {
    CfgNode::hardware(HardwareRegister::Rsp)
}

impl CallableHandlers {
    pub fn generate_prologue(
        &self,
        id: HandlerId,
        regs: &mut VirtualRegisters,
    ) -> Result<Vec<CfgNode>, FrameError> {
        let handler = self.get(id);
        let convention = self.convention();

        let mut nodes = vec![
            CfgNode::push(rbp()),
            CfgNode::assign(
                LValue::hardware(HardwareRegister::Rbp),
                CfgNode::sub(rsp(), CfgNode::known(WORD_SIZE)),
            ),
            CfgNode::assign(
                LValue::hardware(HardwareRegister::Rsp),
                CfgNode::sub(rsp(), CfgNode::lazy(handler.stack_space())),
            ),
        ];

        for &(register, saved) in handler.preserved_registers() {
            nodes.push(CfgNode::assign(
                LValue::virtual_register(saved),
                CfgNode::hardware(register),
            ));
        }

        let arguments = handler.flattened_arguments();
        let mut incoming: Vec<CfgNode> = arguments
            .iter()
            .enumerate()
            .map(|(index, &var)| {
                convention
                    .argument_allocation(index)
                    .wrap_local(handler.frame().holds_reference(var))
                    .into_node()
            })
            .collect();

        if !handler.heap_pointers().is_empty() {
            incoming = incoming
                .into_iter()
                .map(|source| {
                    let temporary = regs.fresh(source.holds_reference());
                    nodes.push(CfgNode::assign(LValue::virtual_register(temporary), source));
                    CfgNode::virtual_register(temporary)
                })
                .collect();

            let allocator = Callee::foreign(&self.options().heap_cell_allocator, 1, 1);
            let cell_size = [Layout::Simple(CfgNode::known(WORD_SIZE))];
            for &(_, pointer) in handler.heap_pointers() {
                let destination = Layout::Simple(self.generate_variable_access(id, pointer)?.into_node());
                nodes.extend(generate_call(
                    convention,
                    &allocator,
                    &cell_size,
                    Some(&destination),
                    self.options().align_calls,
                    regs,
                )?);
            }
        }

        for (&var, source) in arguments.iter().zip(incoming) {
            let destination = self.generate_variable_access(id, var)?;
            nodes.push(CfgNode::assign(destination, source));
        }

        tracing::trace!(
            handler = id.raw(),
            arguments = arguments.len(),
            heap_cells = handler.heap_pointers().len(),
            "generated prologue"
        );
        Ok(nodes)
    }

    pub fn generate_epilogue(&self, id: HandlerId) -> Vec<CfgNode> {
        let handler = self.get(id);
        let convention = self.convention();
        let mut nodes = Vec::new();

        for &(register, saved) in handler.preserved_registers() {
            nodes.push(CfgNode::assign(
                LValue::hardware(register),
                CfgNode::virtual_register(saved),
            ));
        }

        let argument_count = handler.argument_count();
        for (index, value) in handler.result_layout().flatten().into_iter().enumerate() {
            let destination = convention
                .return_allocation(index, argument_count)
                .wrap_local(value.holds_reference());
            nodes.push(CfgNode::assign(destination, value));
        }

        nodes.push(CfgNode::assign(
            LValue::hardware(HardwareRegister::Rsp),
            CfgNode::add(rbp(), CfgNode::known(WORD_SIZE)),
        ));
        nodes.push(CfgNode::pop(LValue::hardware(HardwareRegister::Rbp)));
        nodes
    }
}
