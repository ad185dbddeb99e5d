//! Frame generation errors.
//!
//! All of these are internal compiler errors: they mean an earlier pass (or
//! the caller lowering a function body) asked for something the frame layout
//! cannot provide.

use caco_analysis::AnalysisError;
use caco_ir::{ExprId, VarId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A callable asked for a variable it neither owns, inherits through its
    /// static link chain, nor captured.
    #[error("`{function}` has no access to variable {variable:?}")]
    VariableAccess { function: String, variable: VarId },

    /// A closure (or a static function outside the chain) asked for another
    /// frame's base pointer.
    #[error("`{function}` cannot reach the frame of `{target}`")]
    FramePointerAccess { function: String, target: String },

    #[error("call to `{callee}` passes {found} arguments, expected {expected}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("result of `{callee}` is not written to an assignable location")]
    ResultNotAssignable { callee: String },

    /// Closures are only reachable through their function value, which
    /// carries the environment.
    #[error("closure `{callee}` must be called through its function value")]
    ClosureCall { callee: String },

    #[error("no handler was generated for lambda {0:?}")]
    MissingHandler(ExprId),

    /// Handlers are built in non-decreasing static depth; an ancestor
    /// without a handler means that order was broken.
    #[error("handler for lambda {lambda:?} built before its ancestor {ancestor:?}")]
    ConstructionOrder { lambda: ExprId, ancestor: ExprId },

    #[error("{count} handlers exceed the handler id range")]
    TooManyHandlers { count: usize },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}
