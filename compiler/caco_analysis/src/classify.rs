//! Closure classification.
//!
//! A lambda bound to a name whose variable and lambda both stay inside their
//! defining frame's lifetime is a static function: it is called directly and
//! reaches enclosing frames through a static link. Every other lambda
//! (escaping, or never bound to a name) is a closure.

use rustc_hash::FxHashMap;

use caco_ir::{ExprId, VariablesMap};

use crate::{EscapeAnalysis, FunctionAnalysis, FunctionalEntity};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LambdaKind {
    StaticFunction,
    Closure,
}

#[derive(Clone, Debug, Default)]
pub struct ClosureClassification {
    kinds: FxHashMap<ExprId, LambdaKind>,
}

impl ClosureClassification {
    pub fn kind(&self, lambda: ExprId) -> Option<LambdaKind> {
        self.kinds.get(&lambda).copied()
    }

    pub fn is_static(&self, lambda: ExprId) -> bool {
        self.kind(lambda) == Some(LambdaKind::StaticFunction)
    }

    pub fn is_closure(&self, lambda: ExprId) -> bool {
        self.kind(lambda) == Some(LambdaKind::Closure)
    }

    /// Lambdas of the given kind in ascending id order.
    pub fn lambdas(&self, kind: LambdaKind) -> Vec<ExprId> {
        let mut lambdas: Vec<ExprId> = self
            .kinds
            .iter()
            .filter(|&(_, &k)| k == kind)
            .map(|(&lambda, _)| lambda)
            .collect();
        lambdas.sort_unstable();
        lambdas
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

pub fn classify_closures(
    functions: &FunctionAnalysis,
    escapes: &EscapeAnalysis,
    vars: &VariablesMap,
) -> ClosureClassification {
    let mut kinds = FxHashMap::default();
    for function in functions.iter() {
        let named_var = function.name.and_then(|def| vars.definition(def));
        let kind = match named_var {
            Some(var)
                if !escapes.entity_escapes(FunctionalEntity::Variable(var))
                    && !escapes.lambda_escapes(function.lambda) =>
            {
                LambdaKind::StaticFunction
            }
            _ => LambdaKind::Closure,
        };
        tracing::trace!(lambda = function.lambda.raw(), ?kind, "classified lambda");
        kinds.insert(function.lambda, kind);
    }

    let classification = ClosureClassification { kinds };
    tracing::debug!(
        static_functions = classification.lambdas(LambdaKind::StaticFunction).len(),
        closures = classification.lambdas(LambdaKind::Closure).len(),
        "lambdas classified"
    );
    classification
}
