//! Analysis errors.
//!
//! Every variant signals a broken contract with an upstream pass (name
//! resolution or type checking), never a problem in the user's program.

use caco_ir::{DefId, ExprId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("expression {0:?} has no type")]
    MissingType(ExprId),
    #[error("definition {0:?} has no type")]
    MissingDefinitionType(DefId),
    #[error("variable use {0:?} was not resolved to a definition")]
    UnresolvedName(ExprId),
    #[error("definition {0:?} has no variable")]
    MissingVariable(DefId),
    #[error("lambda {0:?} was not analyzed")]
    UnknownLambda(ExprId),
}
