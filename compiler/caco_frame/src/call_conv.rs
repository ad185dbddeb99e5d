//! Calling conventions.
//!
//! A convention answers three questions: where the `i`-th (flattened)
//! argument arrives, where the `i`-th result leaves, and which registers the
//! callee must hand back unchanged. Everything here is relative to the
//! callee's frame after its prologue ran.
//!
//! # Frame picture (addresses grow upwards)
//!
//! ```text
//! [stack result k]
//! [stack result 0]
//! [stack argument n]
//! [stack argument 6]      rbp + 24
//! [return address]        rbp + 16
//! [saved rbp]             rbp + 8
//! [link]                  rbp      <- OnStack(0)
//! [locals]                rbp - 8, rbp - 16, ...
//! ```

use caco_ir::{HardwareRegister, Register, WORD_SIZE};

use crate::VariableAllocation;

/// Words between the frame pointer and the first stack argument: the link
/// slot itself, the saved frame pointer and the return address.
pub const STACK_ARGUMENTS_BASE: i64 = 3;

/// Which convention a backend targets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CallConventionKind {
    #[default]
    SystemVAmd64,
}

impl CallConventionKind {
    pub fn convention(self) -> Box<dyn CallConvention> {
        match self {
            CallConventionKind::SystemVAmd64 => Box::new(SystemVAmd64),
        }
    }
}

pub trait CallConvention {
    /// Registers carrying the first arguments, in order.
    fn argument_registers(&self) -> &[HardwareRegister];

    /// Registers carrying the first results, in order.
    fn result_registers(&self) -> &[HardwareRegister];

    /// Registers a callee must preserve (the frame and stack pointers are
    /// handled by the prologue and epilogue themselves).
    fn preserved_registers(&self) -> &[HardwareRegister];

    /// Arguments that do not fit in registers.
    fn stack_argument_count(&self, argument_count: usize) -> usize {
        argument_count.saturating_sub(self.argument_registers().len())
    }

    /// Results that do not fit in registers.
    fn stack_result_count(&self, result_count: usize) -> usize {
        result_count.saturating_sub(self.result_registers().len())
    }

    /// Where the callee finds argument `index`.
    fn argument_allocation(&self, index: usize) -> VariableAllocation {
        let registers = self.argument_registers();
        match registers.get(index) {
            Some(&register) => VariableAllocation::InRegister(Register::Fixed(register)),
            None => VariableAllocation::OnStack(-WORD_SIZE * (words(index - registers.len()) + STACK_ARGUMENTS_BASE)),
        }
    }

    /// Where the callee leaves result `index`. Stack results sit right above
    /// the stack arguments, in space the caller reserved.
    fn return_allocation(&self, index: usize, argument_count: usize) -> VariableAllocation {
        let registers = self.result_registers();
        match registers.get(index) {
            Some(&register) => VariableAllocation::InRegister(Register::Fixed(register)),
            None => {
                let stack_arguments = words(self.stack_argument_count(argument_count));
                let slot = words(index - registers.len());
                VariableAllocation::OnStack(-WORD_SIZE * (STACK_ARGUMENTS_BASE + stack_arguments + slot))
            }
        }
    }
}

fn words(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX / WORD_SIZE)
}

/// The System V AMD64 ABI, restricted to integer-class values.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemVAmd64;

impl SystemVAmd64 {
    const ARGUMENTS: [HardwareRegister; 6] = [
        HardwareRegister::Rdi,
        HardwareRegister::Rsi,
        HardwareRegister::Rdx,
        HardwareRegister::Rcx,
        HardwareRegister::R8,
        HardwareRegister::R9,
    ];

    const RESULTS: [HardwareRegister; 2] = [HardwareRegister::Rax, HardwareRegister::Rdx];

    const PRESERVED: [HardwareRegister; 5] = [
        HardwareRegister::Rbx,
        HardwareRegister::R12,
        HardwareRegister::R13,
        HardwareRegister::R14,
        HardwareRegister::R15,
    ];
}

impl CallConvention for SystemVAmd64 {
    fn argument_registers(&self) -> &[HardwareRegister] {
        &Self::ARGUMENTS
    }

    fn result_registers(&self) -> &[HardwareRegister] {
        &Self::RESULTS
    }

    fn preserved_registers(&self) -> &[HardwareRegister] {
        &Self::PRESERVED
    }
}
