//! Per-callable stack bookkeeping shared by both handler kinds.

use rustc_hash::FxHashMap;

use caco_ir::{CfgNode, LValue, StackSpace, VarId, VariableArena, WORD_SIZE};

use crate::VariableAllocation;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Slot {
    allocation: VariableAllocation,
    holds_reference: bool,
}

/// Allocation table and stack high-water mark of one frame.
#[derive(Debug, Default)]
pub struct FrameAllocator {
    slots: FxHashMap<VarId, Slot>,
    stack_space: StackSpace,
    reference_offsets: Vec<i64>,
}

impl FrameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) where `var` lives.
    ///
    /// Stack slots raise the stack space to cover them; stack slots holding
    /// references are remembered for stack scanning.
    pub fn register_variable_allocation(
        &mut self,
        arena: &VariableArena,
        var: VarId,
        allocation: VariableAllocation,
    ) {
        let holds_reference = arena.holds_reference(var);
        if let VariableAllocation::OnStack(offset) = allocation {
            if holds_reference && !self.reference_offsets.contains(&offset) {
                self.reference_offsets.push(offset);
            }
            self.stack_space.extend_to(offset + WORD_SIZE);
        }
        self.slots.insert(
            var,
            Slot {
                allocation,
                holds_reference,
            },
        );
    }

    /// Put `var` in the next free stack slot and return its lvalue.
    pub fn allocate_frame_variable(&mut self, arena: &VariableArena, var: VarId) -> LValue {
        let allocation = VariableAllocation::OnStack(self.stack_space.get());
        let access = allocation.wrap_local(arena.holds_reference(var));
        self.register_variable_allocation(arena, var, allocation);
        access
    }

    pub fn get_variable_allocation(&self, var: VarId) -> Option<&VariableAllocation> {
        self.slots.get(&var).map(|slot| &slot.allocation)
    }

    pub fn has_variable_allocation(&self, var: VarId) -> bool {
        self.slots.contains_key(&var)
    }

    /// Whether the primitive stored for `var` is a reference.
    pub fn holds_reference(&self, var: VarId) -> bool {
        self.slots.get(&var).is_some_and(|slot| slot.holds_reference)
    }

    /// Lvalue for `var` relative to `frame_pointer`, if allocated here.
    pub fn access(&self, var: VarId, frame_pointer: &CfgNode) -> Option<LValue> {
        self.slots
            .get(&var)
            .map(|slot| slot.allocation.wrap(frame_pointer, slot.holds_reference))
    }

    /// Current stack space; the returned handle observes later growth.
    pub fn stack_space(&self) -> StackSpace {
        self.stack_space.clone()
    }

    /// Stack offsets holding references, in registration order.
    pub fn reference_offsets(&self) -> &[i64] {
        &self.reference_offsets
    }

    /// Every stack offset in use, ascending.
    pub fn stack_offsets(&self) -> Vec<i64> {
        let mut offsets: Vec<i64> = self
            .slots
            .values()
            .filter_map(|slot| slot.allocation.stack_offset())
            .collect();
        offsets.sort_unstable();
        offsets
    }
}
