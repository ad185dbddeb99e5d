//! Shared data model for the Cacophony backend.
//!
//! This crate provides:
//!
//! - **AST and front-end results** ([`Ast`], [`ExprArena`], [`ResolvedNames`],
//!   [`TypeCheckResult`]): what name resolution and type checking hand to
//!   the backend.
//!
//! - **Types** ([`TypePool`]): interned, acyclic, queried structurally.
//!
//! - **Variables** ([`VariableArena`], [`VariablesMap`]): the storage units
//!   closure conversion reasons about and the frame allocator places.
//!
//! - **CFG nodes** ([`CfgNode`], [`LValue`]): the tree IR emitted for
//!   variable access, calls, prologues and epilogues.
//!
//! - **Programs** ([`Program`], [`ProgramBuilder`]): the bundle of the above
//!   that one compilation unit consists of.
//!
//! # Crate Dependencies
//!
//! `caco_ir` is a leaf: analysis (`caco_analysis`) and frame generation
//! (`caco_frame`) both build on it.

mod ast;
mod cfg;
mod interner;
mod name;
mod program;
mod resolve;
mod types;
mod variable;

pub use ast::{
    Ast, BinaryOp, DefId, DefKind, Definition, ExprArena, ExprId, ExprKind, UnaryOp,
};
pub use cfg::{
    CfgNode, Constant, HardwareRegister, LValue, Register, StackSpace, VirtualRegister,
    VirtualRegisters, WORD_SIZE,
};
pub use interner::StringInterner;
pub use name::Name;
pub use program::{Program, ProgramBuilder};
pub use resolve::ResolvedNames;
pub use types::{Type, TypeCheckResult, TypeId, TypePool};
pub use variable::{VarId, Variable, VariableArena, VariablesMap};
