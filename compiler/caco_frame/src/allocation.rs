//! Where a primitive variable lives.

use std::fmt;

use caco_ir::{CfgNode, HardwareRegister, LValue, Register};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariableAllocation {
    InRegister(Register),
    /// Byte offset below the frame pointer: the slot is `[rbp - offset]`.
    /// Negative offsets address the caller's part of the stack.
    OnStack(i64),
    /// The variable lives in a heap cell; `pointer` (always an `OnStack`
    /// slot) holds the cell's address.
    ViaPointer {
        pointer: Box<VariableAllocation>,
        offset: i64,
    },
}

impl VariableAllocation {
    pub fn via_pointer(pointer: VariableAllocation, offset: i64) -> Self {
        VariableAllocation::ViaPointer {
            pointer: Box::new(pointer),
            offset,
        }
    }

    /// Lvalue for this allocation in the frame whose base is `frame_pointer`.
    pub fn wrap(&self, frame_pointer: &CfgNode, holds_reference: bool) -> LValue {
        match self {
            VariableAllocation::InRegister(register) => LValue::register(*register, holds_reference),
            VariableAllocation::OnStack(offset) => LValue::memory(
                CfgNode::sub(frame_pointer.clone(), CfgNode::known(*offset)),
                holds_reference,
            ),
            VariableAllocation::ViaPointer { pointer, offset } => {
                let cell = pointer.wrap(frame_pointer, true);
                LValue::memory(
                    CfgNode::add(cell.into_node(), CfgNode::known(*offset)),
                    holds_reference,
                )
            }
        }
    }

    /// Lvalue relative to the current frame pointer.
    pub fn wrap_local(&self, holds_reference: bool) -> LValue {
        self.wrap(&CfgNode::hardware(HardwareRegister::Rbp), holds_reference)
    }

    pub fn is_in_register(&self) -> bool {
        matches!(self, VariableAllocation::InRegister(_))
    }

    pub fn stack_offset(&self) -> Option<i64> {
        match self {
            VariableAllocation::OnStack(offset) => Some(*offset),
            _ => None,
        }
    }
}

impl fmt::Display for VariableAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableAllocation::InRegister(register) => write!(f, "{register}"),
            VariableAllocation::OnStack(offset) => write!(f, "stack[{offset}]"),
            VariableAllocation::ViaPointer { pointer, offset } => write!(f, "*({pointer}) + {offset}"),
        }
    }
}
