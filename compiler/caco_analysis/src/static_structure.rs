//! Static-structure analysis: lexical nesting and variable usage per lambda.
//!
//! # Algorithm
//!
//! 1. A single descent records, for every lambda, its parent, its static
//!    depth, the variables it declares (parameters and local declarations,
//!    including nested sub-variables) and the variables its own body reads
//!    or writes.
//! 2. Call closure: a lambda inherits the usage of every named function it
//!    reaches through the call graph, provided the callee is at least as
//!    deeply nested. Calling a local helper then behaves like inlining it.
//! 3. Children closure: a lambda inherits the usage of every lambda nested
//!    inside it, so whatever a descendant reaches through the lambda's frame
//!    is visible on the lambda itself.
//! 4. Usage is restricted to variables declared in the lambda or one of its
//!    lexical ancestors, and inverted into `variables_used_in_nested`.

use rustc_hash::{FxHashMap, FxHashSet};

use caco_ir::{Ast, DefId, ExprId, ExprKind, VarId, Variable, VariableArena, VariablesMap};

use crate::stack::ensure_sufficient_stack;
use crate::{AnalysisError, CallGraph, UseType};

/// Per-lambda result of static-structure analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzedFunction {
    pub lambda: ExprId,
    /// Definition binding the lambda to a name, for named functions.
    pub name: Option<DefId>,
    pub parent: Option<ExprId>,
    pub static_depth: u32,
    /// Variables declared here (parameters and locals, with sub-variables).
    pub declared: FxHashSet<VarId>,
    /// Every variable declared or used here, with its combined use type.
    /// Declared-but-unused variables map to [`UseType::UNUSED`].
    pub variables: FxHashMap<VarId, UseType>,
    /// Declared variables that some strictly nested lambda uses.
    pub variables_used_in_nested: FxHashSet<VarId>,
}

impl AnalyzedFunction {
    fn new(lambda: ExprId, name: Option<DefId>, parent: Option<ExprId>, static_depth: u32) -> Self {
        Self {
            lambda,
            name,
            parent,
            static_depth,
            declared: FxHashSet::default(),
            variables: FxHashMap::default(),
            variables_used_in_nested: FxHashSet::default(),
        }
    }

    /// Declared variables in ascending id order.
    pub fn declared_variables(&self) -> Vec<VarId> {
        sorted(self.declared.iter().copied())
    }

    /// Used variables declared by an ancestor, in ascending id order.
    pub fn outer_variables(&self) -> Vec<VarId> {
        sorted(
            self.variables
                .keys()
                .copied()
                .filter(|var| !self.declared.contains(var)),
        )
    }

    pub fn use_type(&self, var: VarId) -> UseType {
        self.variables.get(&var).copied().unwrap_or_default()
    }

    /// Whether this lambda needs anything from an enclosing frame.
    pub fn uses_outer_variables(&self) -> bool {
        self.variables.keys().any(|var| !self.declared.contains(var))
    }
}

fn sorted(vars: impl Iterator<Item = VarId>) -> Vec<VarId> {
    let mut vars: Vec<VarId> = vars.collect();
    vars.sort_unstable();
    vars
}

/// Static-structure analysis of every lambda in a compilation unit.
#[derive(Clone, Debug, Default)]
pub struct FunctionAnalysis {
    functions: FxHashMap<ExprId, AnalyzedFunction>,
    /// Lambdas in pre-order: every parent precedes its children.
    order: Vec<ExprId>,
    declared_in: FxHashMap<VarId, ExprId>,
    named: FxHashMap<DefId, ExprId>,
}

impl FunctionAnalysis {
    #[inline]
    pub fn get(&self, lambda: ExprId) -> Option<&AnalyzedFunction> {
        self.functions.get(&lambda)
    }

    pub fn function(&self, lambda: ExprId) -> Result<&AnalyzedFunction, AnalysisError> {
        self.get(lambda)
            .ok_or(AnalysisError::UnknownLambda(lambda))
    }

    /// Analyzed functions in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &AnalyzedFunction> + '_ {
        self.order.iter().filter_map(|lambda| self.functions.get(lambda))
    }

    /// Lambdas in non-decreasing static depth, pre-order within one depth.
    pub fn lambdas_by_depth(&self) -> Vec<ExprId> {
        let mut lambdas = self.order.clone();
        lambdas.sort_by_key(|lambda| self.functions.get(lambda).map_or(0, |f| f.static_depth));
        lambdas
    }

    /// Lambda whose frame owns `var`; `None` for top-level variables.
    pub fn declaring_function(&self, var: VarId) -> Option<ExprId> {
        self.declared_in.get(&var).copied()
    }

    /// Lambda bound to a named function definition.
    pub fn named_lambda(&self, def: DefId) -> Option<ExprId> {
        self.named.get(&def).copied()
    }

    /// Strict lexical ancestors of `lambda`, nearest first.
    pub fn ancestors(&self, lambda: ExprId) -> Vec<ExprId> {
        let mut ancestors = Vec::new();
        let mut current = self.get(lambda).and_then(|f| f.parent);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.get(parent).and_then(|f| f.parent);
        }
        ancestors
    }

    pub fn is_ancestor(&self, ancestor: ExprId, lambda: ExprId) -> bool {
        self.ancestors(lambda).contains(&ancestor)
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.functions.values().map(|f| f.static_depth).max()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Analyze the lexical structure and variable usage of every lambda in `ast`.
pub fn analyze_functions(
    ast: &Ast,
    vars: &VariablesMap,
    arena: &VariableArena,
    call_graph: &CallGraph,
) -> Result<FunctionAnalysis, AnalysisError> {
    let mut builder = RelationsBuilder {
        ast,
        vars,
        arena,
        stack: Vec::new(),
        analysis: FunctionAnalysis::default(),
    };
    builder.visit(ast.root)?;
    let mut analysis = builder.analysis;

    // Usage from the function's own body only.
    let base: FxHashMap<ExprId, FxHashMap<VarId, UseType>> = analysis
        .functions
        .iter()
        .map(|(&lambda, f)| (lambda, f.variables.clone()))
        .collect();
    let mut used = base.clone();

    for &lambda in &analysis.order {
        let depth = analysis.functions[&lambda].static_depth;
        for callee in call_graph.reachable(lambda) {
            let callee_deeper = analysis
                .get(callee)
                .is_some_and(|f| callee != lambda && f.static_depth >= depth);
            if let (true, Some(callee_used), Some(target)) =
                (callee_deeper, base.get(&callee), used.get_mut(&lambda))
            {
                merge(target, callee_used);
            }
        }
    }

    // Reverse pre-order visits children before their parents.
    for &lambda in analysis.order.iter().rev() {
        if let Some(parent) = analysis.functions[&lambda].parent {
            let child = used.get(&lambda).cloned().unwrap_or_default();
            if let Some(target) = used.get_mut(&parent) {
                merge(target, &child);
            }
        }
    }

    let mut restricted: FxHashMap<ExprId, FxHashMap<VarId, UseType>> = FxHashMap::default();
    for &lambda in &analysis.order {
        let mut variables = FxHashMap::default();
        for (&var, &use_type) in used.get(&lambda).into_iter().flatten() {
            let visible = analysis
                .declaring_function(var)
                .is_some_and(|owner| owner == lambda || analysis.is_ancestor(owner, lambda));
            if visible {
                *variables.entry(var).or_default() |= use_type;
            }
        }
        for &var in &analysis.functions[&lambda].declared {
            variables.entry(var).or_default();
        }
        restricted.insert(lambda, variables);
    }

    let mut nested: FxHashMap<ExprId, FxHashSet<VarId>> = FxHashMap::default();
    for (&lambda, variables) in &restricted {
        for &var in variables.keys() {
            if let Some(owner) = analysis.declaring_function(var) {
                if owner != lambda {
                    nested.entry(owner).or_default().insert(var);
                }
            }
        }
    }

    for (lambda, function) in &mut analysis.functions {
        function.variables = restricted.remove(lambda).unwrap_or_default();
        function.variables_used_in_nested = nested.remove(lambda).unwrap_or_default();
        tracing::trace!(
            lambda = lambda.raw(),
            depth = function.static_depth,
            variables = function.variables.len(),
            used_in_nested = function.variables_used_in_nested.len(),
            "analyzed function"
        );
    }

    tracing::debug!(
        lambdas = analysis.len(),
        max_depth = analysis.max_depth(),
        "static structure analyzed"
    );
    Ok(analysis)
}

fn merge(target: &mut FxHashMap<VarId, UseType>, source: &FxHashMap<VarId, UseType>) {
    for (&var, &use_type) in source {
        *target.entry(var).or_default() |= use_type;
    }
}

struct RelationsBuilder<'a> {
    ast: &'a Ast,
    vars: &'a VariablesMap,
    arena: &'a VariableArena,
    /// Enclosing lambdas, innermost last.
    stack: Vec<ExprId>,
    analysis: FunctionAnalysis,
}

impl RelationsBuilder<'_> {
    fn visit(&mut self, expr: ExprId) -> Result<(), AnalysisError> {
        let ast = self.ast;
        ensure_sufficient_stack(|| match ast.expr(expr) {
            ExprKind::Lambda { params, body } => self.visit_lambda(expr, None, params, *body),
            ExprKind::FunctionDef { def, lambda } => {
                self.declare(*def)?;
                self.analysis.named.insert(*def, *lambda);
                match ast.expr(*lambda) {
                    ExprKind::Lambda { params, body } => {
                        self.visit_lambda(*lambda, Some(*def), params, *body)
                    }
                    _ => self.visit(*lambda),
                }
            }
            ExprKind::VariableDecl { def, value } => {
                self.declare(*def)?;
                self.visit(*value)
            }
            ExprKind::VariableUse(_) | ExprKind::FieldRef { .. } => {
                self.mark_assignable(expr, UseType::READ)
            }
            ExprKind::Assign { target, value } => {
                self.visit_target(*target, UseType::WRITE)?;
                self.visit(*value)
            }
            ExprKind::CompoundAssign { target, value, .. } => {
                self.visit_target(*target, UseType::READ_WRITE)?;
                self.visit(*value)
            }
            kind => {
                for child in kind.children() {
                    self.visit(child)?;
                }
                Ok(())
            }
        })
    }

    fn visit_lambda(
        &mut self,
        lambda: ExprId,
        name: Option<DefId>,
        params: &[DefId],
        body: ExprId,
    ) -> Result<(), AnalysisError> {
        let parent = self.stack.last().copied();
        let depth = parent
            .and_then(|p| self.analysis.get(p))
            .map_or(0, |p| p.static_depth + 1);
        self.analysis
            .functions
            .insert(lambda, AnalyzedFunction::new(lambda, name, parent, depth));
        self.analysis.order.push(lambda);

        self.stack.push(lambda);
        for &param in params {
            self.declare(param)?;
        }
        let result = self.visit(body);
        self.stack.pop();
        result
    }

    fn visit_target(&mut self, target: ExprId, use_type: UseType) -> Result<(), AnalysisError> {
        match self.ast.expr(target) {
            ExprKind::VariableUse(_) | ExprKind::FieldRef { .. } => {
                self.mark_assignable(target, use_type)
            }
            // Writing through a reference only reads the reference.
            _ => self.visit(target),
        }
    }

    fn mark_assignable(&mut self, expr: ExprId, use_type: UseType) -> Result<(), AnalysisError> {
        let ast = self.ast;
        let Some(var) = self.vars.lvalue(expr) else {
            return match ast.expr(expr) {
                ExprKind::FieldRef { object, .. } => self.visit(*object),
                _ => Err(AnalysisError::UnresolvedName(expr)),
            };
        };
        for nested in self.arena.with_nested(var) {
            self.mark(nested, use_type);
        }

        // The enclosing structs of a projection are used too.
        let mut current = expr;
        while let ExprKind::FieldRef { object, .. } = ast.expr(current) {
            match self.vars.lvalue(*object) {
                Some(parent) => self.mark(parent, use_type),
                None => return self.visit(*object),
            }
            current = *object;
        }
        Ok(())
    }

    fn mark(&mut self, var: VarId, use_type: UseType) {
        if matches!(self.arena.get(var), Variable::Heap) {
            return;
        }
        if let Some(function) = self
            .stack
            .last()
            .and_then(|lambda| self.analysis.functions.get_mut(lambda))
        {
            *function.variables.entry(var).or_default() |= use_type;
        }
    }

    fn declare(&mut self, def: DefId) -> Result<(), AnalysisError> {
        let var = self
            .vars
            .definition(def)
            .ok_or(AnalysisError::MissingVariable(def))?;
        let Some(&lambda) = self.stack.last() else {
            return Ok(());
        };
        for nested in self.arena.with_nested(var) {
            self.analysis.declared_in.insert(nested, lambda);
            if let Some(function) = self.analysis.functions.get_mut(&lambda) {
                function.declared.insert(nested);
            }
        }
        Ok(())
    }
}
