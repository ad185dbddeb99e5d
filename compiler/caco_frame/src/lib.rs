//! Frames, calling conventions and call sites for the Cacophony backend.
//!
//! This crate provides:
//!
//! - **Allocations** ([`VariableAllocation`]): register, stack slot, or heap
//!   cell reached through a stack slot.
//!
//! - **Frame allocation** ([`FrameAllocator`]): the allocation table and
//!   stack high-water mark every handler is built on.
//!
//! - **Handlers** ([`CallableHandlers`], [`CallableHandler`]): one per
//!   lambda, static function or closure, answering variable access and
//!   frame pointer queries and emitting prologues and epilogues.
//!
//! - **Calls** ([`CallConvention`], [`generate_call`],
//!   [`generate_call_from`]): argument and result marshalling with optional
//!   dynamic stack alignment.
//!
//! # Crate Dependencies
//!
//! Builds on `caco_ir` for IR nodes and variables and on `caco_analysis`
//! for static structure, escape and classification results.

mod allocation;
mod call;
mod call_conv;
mod error;
mod frame;
mod handler;
mod layout;
mod prologue;

pub use allocation::VariableAllocation;
pub use call::{generate_call, generate_call_from, Callee};
pub use call_conv::{CallConvention, CallConventionKind, SystemVAmd64, STACK_ARGUMENTS_BASE};
pub use error::FrameError;
pub use frame::FrameAllocator;
pub use handler::{
    generate_handlers, CallableHandler, CallableHandlers, CapturedVariable, FrameOptions,
    HandlerId, HandlerInput, HandlerKind,
};
pub use layout::Layout;
