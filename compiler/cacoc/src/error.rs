//! Driver-level errors.

use caco_analysis::AnalysisError;
use caco_frame::FrameError;
use caco_ir::{DefId, ExprId};

/// Any failure of closure conversion.
///
/// None of these describe a problem in the user's program: each one means a
/// pass (or the lowering code calling into the backend) broke a contract.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("internal compiler error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("internal compiler error: {0}")]
    Frame(#[from] FrameError),

    #[error("internal compiler error: definition {0:?} has no variable")]
    UnknownDefinition(DefId),

    #[error("internal compiler error: expression {0:?} is not an analyzed lambda")]
    UnknownLambda(ExprId),

    #[error("internal compiler error: `{0}` is called but is not a function value")]
    NotAFunctionValue(String),
}
