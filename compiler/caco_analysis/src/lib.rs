//! Closure-conversion analyses for the Cacophony backend.
//!
//! Passes, in pipeline order:
//!
//! - **Variables map** ([`build_variables_map`]): one [`Variable`] per
//!   definition, one lvalue entry per assignable expression.
//! - **Call graph** ([`build_call_graph`]): direct calls between named
//!   functions.
//! - **Static structure** ([`analyze_functions`]): parent, static depth,
//!   declared and used variables of every lambda.
//! - **Escape analysis** ([`analyze_escapes`]): which functional entities
//!   outlive their defining frame, and which variables need heap cells.
//! - **Classification** ([`classify_closures`]): static function or closure.
//!
//! All passes are pure functions of their inputs. Failures are
//! [`AnalysisError`]s: a missing type or resolution is a bug upstream.
//!
//! [`Variable`]: caco_ir::Variable

mod call_graph;
mod classify;
mod error;
mod escape;
mod stack;
mod static_structure;
mod use_type;
mod variables;

pub use call_graph::{build_call_graph, named_functions, CallGraph};
pub use classify::{classify_closures, ClosureClassification, LambdaKind};
pub use error::AnalysisError;
pub use escape::{analyze_escapes, EscapeAnalysis, EscapeInput, FunctionalEntity};
pub use static_structure::{analyze_functions, AnalyzedFunction, FunctionAnalysis};
pub use use_type::UseType;
pub use variables::build_variables_map;

#[cfg(test)]
mod test_helpers;
