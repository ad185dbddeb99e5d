//! Direct call graph between lambdas.
//!
//! An edge `caller -> callee` exists when the body of `caller` (excluding
//! bodies of lambdas nested in it) calls a named function by name. Calls
//! through function values of unknown origin contribute no edge.

use rustc_hash::{FxHashMap, FxHashSet};

use caco_ir::{Ast, DefId, ExprId, ExprKind, ResolvedNames};

use crate::stack::ensure_sufficient_stack;

/// Map from every named function definition to its lambda.
pub fn named_functions(ast: &Ast) -> FxHashMap<DefId, ExprId> {
    ast.arena
        .expr_ids()
        .filter_map(|id| match ast.expr(id) {
            ExprKind::FunctionDef { def, lambda } => Some((*def, *lambda)),
            _ => None,
        })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    edges: FxHashMap<ExprId, FxHashSet<ExprId>>,
}

impl CallGraph {
    /// Lambdas directly called from `caller`, in ascending id order.
    pub fn callees(&self, caller: ExprId) -> Vec<ExprId> {
        let mut callees: Vec<ExprId> = self
            .edges
            .get(&caller)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        callees.sort_unstable();
        callees
    }

    /// Lambdas reachable from `caller` through one or more calls, excluding
    /// `caller` itself unless it is (mutually) recursive.
    pub fn reachable(&self, caller: ExprId) -> Vec<ExprId> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<ExprId> = self.callees(caller);
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.callees(next));
            }
        }
        let mut reachable: Vec<ExprId> = seen.into_iter().collect();
        reachable.sort_unstable();
        reachable
    }

    pub fn calls(&self, caller: ExprId, callee: ExprId) -> bool {
        self.edges
            .get(&caller)
            .is_some_and(|set| set.contains(&callee))
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.values().map(FxHashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the direct call graph of `ast`.
pub fn build_call_graph(ast: &Ast, names: &ResolvedNames) -> CallGraph {
    let mut builder = CallGraphBuilder {
        ast,
        names,
        named: named_functions(ast),
        graph: CallGraph::default(),
    };
    builder.visit(ast.root, None);
    tracing::debug!(edges = builder.graph.len(), "call graph built");
    builder.graph
}

struct CallGraphBuilder<'a> {
    ast: &'a Ast,
    names: &'a ResolvedNames,
    named: FxHashMap<DefId, ExprId>,
    graph: CallGraph,
}

impl CallGraphBuilder<'_> {
    fn visit(&mut self, expr: ExprId, current: Option<ExprId>) {
        let ast = self.ast;
        ensure_sufficient_stack(|| match ast.expr(expr) {
            ExprKind::Lambda { body, .. } => self.visit(*body, Some(expr)),
            ExprKind::Call { callee, args } => {
                if let (Some(caller), Some(target)) = (current, self.named_callee(*callee)) {
                    self.graph.edges.entry(caller).or_default().insert(target);
                }
                self.visit(*callee, current);
                for &arg in args {
                    self.visit(arg, current);
                }
            }
            kind => {
                for child in kind.children() {
                    self.visit(child, current);
                }
            }
        });
    }

    fn named_callee(&self, callee: ExprId) -> Option<ExprId> {
        match self.ast.expr(callee) {
            ExprKind::VariableUse(_) => {
                let def = self.names.get(callee)?;
                self.named.get(&def).copied()
            }
            _ => None,
        }
    }
}
