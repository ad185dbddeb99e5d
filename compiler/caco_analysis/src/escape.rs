//! Escape analysis over functional entities.
//!
//! # Algorithm
//!
//! Only entities whose type can carry a function are tracked: variables of
//! such types and lambda expressions. Each gets a definition depth (the
//! static depth of the lambda declaring it, `-1` at top level; for a lambda,
//! its parent's depth) and a usage depth initialized to it.
//!
//! Edge collection (one AST walk):
//!
//! - assignment edges `lhs <- rhs` for assignments of escapable type,
//!   initialized declarations, named function definitions (`f <- lambda`)
//!   and arguments of calls to named functions (`param <- argument`);
//! - return edges `lambda -> entities` for `return` values and a lambda's
//!   final expression, when its result type can escape;
//! - result edges `call result of f <- entities f returns`. A call to a
//!   named function mentions its call result in the open contexts; a call
//!   through any other function value mentions the callee instead;
//! - capture edges `lambda <- outer variable` from the static-structure
//!   analysis.
//!
//! Entities stored into the heap, through `Allocation` or an assignment to
//! a dereferenced place, start at usage depth `-1`.
//!
//! Propagation is a worklist fixed point. Return edges first lower the
//! returned entities to the returning lambda's depth minus one. Then every
//! edge lowers its right-hand entities to the minimum usage depth of its
//! left-hand entities, revisiting an edge only when a left-hand entity
//! just dropped. Depths are bounded below by `-1` and only decrease, so the
//! loop terminates after at most `entities * (max_depth + 2)` steps.
//!
//! An entity escapes iff its usage depth ends below its definition depth.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use caco_ir::{
    Ast, DefId, ExprId, ExprKind, ResolvedNames, TypeCheckResult, TypePool, VarId, VariableArena,
    VariablesMap,
};

use crate::call_graph::named_functions;
use crate::stack::ensure_sufficient_stack;
use crate::{AnalysisError, FunctionAnalysis};

/// Unit of escape tracking.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionalEntity {
    Variable(VarId),
    Lambda(ExprId),
    /// Whatever a call to the lambda hands back.
    CallResult(ExprId),
}

/// `lhs <- rhs`: every right-hand entity is used at least as shallowly as
/// the shallowest left-hand entity.
#[derive(Clone, Debug, PartialEq, Eq)]
struct AssignmentEdge {
    lhs: SmallVec<[FunctionalEntity; 2]>,
    rhs: SmallVec<[FunctionalEntity; 4]>,
}

/// Everything the analysis needs from earlier passes.
#[derive(Copy, Clone)]
pub struct EscapeInput<'a> {
    pub ast: &'a Ast,
    pub names: &'a ResolvedNames,
    pub types: &'a TypeCheckResult,
    pub pool: &'a TypePool,
    pub vars: &'a VariablesMap,
    pub arena: &'a VariableArena,
    pub functions: &'a FunctionAnalysis,
}

/// Result of escape analysis.
#[derive(Clone, Debug, Default)]
pub struct EscapeAnalysis {
    definition_depth: FxHashMap<FunctionalEntity, i32>,
    usage_depth: FxHashMap<FunctionalEntity, i32>,
    /// Variables needing heap indirection, closed under nesting.
    escaping: FxHashSet<VarId>,
    iterations: usize,
    max_depth: i32,
}

impl EscapeAnalysis {
    /// Whether `var` must live on the heap. Covers sub-variables of escaping
    /// composites.
    #[inline]
    pub fn escapes(&self, var: VarId) -> bool {
        self.escaping.contains(&var)
    }

    /// Whether the entity's usage depth is below its definition depth.
    /// Untracked entities never escape.
    pub fn entity_escapes(&self, entity: FunctionalEntity) -> bool {
        match (
            self.usage_depth.get(&entity),
            self.definition_depth.get(&entity),
        ) {
            (Some(usage), Some(definition)) => usage < definition,
            _ => false,
        }
    }

    pub fn lambda_escapes(&self, lambda: ExprId) -> bool {
        self.entity_escapes(FunctionalEntity::Lambda(lambda))
    }

    pub fn usage_depth(&self, entity: FunctionalEntity) -> Option<i32> {
        self.usage_depth.get(&entity).copied()
    }

    pub fn definition_depth(&self, entity: FunctionalEntity) -> Option<i32> {
        self.definition_depth.get(&entity).copied()
    }

    /// Tracked entities in a stable order.
    pub fn entities(&self) -> Vec<FunctionalEntity> {
        let mut entities: Vec<_> = self.definition_depth.keys().copied().collect();
        entities.sort_unstable();
        entities
    }

    /// Heap-indirected variables in ascending id order.
    pub fn escaping_variables(&self) -> Vec<VarId> {
        let mut vars: Vec<_> = self.escaping.iter().copied().collect();
        vars.sort_unstable();
        vars
    }

    /// Worklist steps taken to reach the fixed point.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Upper bound on [`iterations`](Self::iterations).
    pub fn iteration_cap(&self) -> usize {
        let depth_levels = usize::try_from(self.max_depth + 2).unwrap_or(0);
        self.definition_depth.len() * depth_levels
    }
}

fn depth_of(depth: u32) -> i32 {
    i32::try_from(depth).unwrap_or(i32::MAX)
}

pub fn analyze_escapes(input: EscapeInput<'_>) -> Result<EscapeAnalysis, AnalysisError> {
    let tracked = tracked_variables(input)?;

    let mut definition_depth: FxHashMap<FunctionalEntity, i32> = FxHashMap::default();
    for &var in &tracked {
        let depth = input
            .functions
            .declaring_function(var)
            .and_then(|lambda| input.functions.get(lambda))
            .map_or(-1, |f| depth_of(f.static_depth));
        definition_depth.insert(FunctionalEntity::Variable(var), depth);
    }
    for function in input.functions.iter() {
        let outside = depth_of(function.static_depth) - 1;
        definition_depth.insert(FunctionalEntity::Lambda(function.lambda), outside);
        definition_depth.insert(FunctionalEntity::CallResult(function.lambda), outside);
    }

    let mut collector = EdgeCollector {
        input,
        tracked: &tracked,
        named: named_functions(input.ast),
        lambdas: Vec::new(),
        contexts: Vec::new(),
        barrier: 0,
        assignments: Vec::new(),
        returns: FxHashMap::default(),
        heap_stored: FxHashSet::default(),
    };
    collector.visit(input.ast.root)?;
    let EdgeCollector {
        mut assignments,
        returns,
        heap_stored,
        ..
    } = collector;

    let mut returning: Vec<_> = returns.keys().copied().collect();
    returning.sort_unstable();
    for lambda in returning {
        let mut rhs: SmallVec<[FunctionalEntity; 4]> = returns[&lambda].iter().copied().collect();
        rhs.sort_unstable();
        assignments.push(AssignmentEdge {
            lhs: smallvec::smallvec![FunctionalEntity::CallResult(lambda)],
            rhs,
        });
    }

    // A lambda is used wherever the variables it captures must stay alive.
    for function in input.functions.iter() {
        let captured: SmallVec<[FunctionalEntity; 4]> = function
            .outer_variables()
            .into_iter()
            .filter(|var| tracked.contains(var))
            .map(FunctionalEntity::Variable)
            .collect();
        if !captured.is_empty() {
            assignments.push(AssignmentEdge {
                lhs: smallvec::smallvec![FunctionalEntity::Lambda(function.lambda)],
                rhs: captured,
            });
        }
    }

    let mut usage_depth = definition_depth.clone();
    for (lambda, returned) in &returns {
        let bound = input
            .functions
            .get(*lambda)
            .map_or(-1, |f| depth_of(f.static_depth) - 1);
        for entity in returned {
            if let Some(depth) = usage_depth.get_mut(entity) {
                *depth = (*depth).min(bound);
            }
        }
    }

    for entity in &heap_stored {
        if let Some(depth) = usage_depth.get_mut(entity) {
            *depth = -1;
        }
    }

    let iterations = propagate(&assignments, &mut usage_depth);

    let mut result = EscapeAnalysis {
        definition_depth,
        usage_depth,
        escaping: FxHashSet::default(),
        iterations,
        max_depth: input.functions.max_depth().map_or(0, depth_of),
    };

    for entity in result.entities() {
        if !result.entity_escapes(entity) {
            continue;
        }
        let roots = match entity {
            FunctionalEntity::Variable(var) => vec![var],
            FunctionalEntity::Lambda(lambda) => input.functions.function(lambda)?.outer_variables(),
            FunctionalEntity::CallResult(_) => continue,
        };
        for root in roots {
            result.escaping.extend(input.arena.with_nested(root));
        }
    }

    tracing::debug!(
        entities = result.definition_depth.len(),
        assignment_edges = assignments.len(),
        iterations = result.iterations,
        escaping = result.escaping.len(),
        "escape analysis reached fixed point"
    );
    Ok(result)
}

/// Variables of escapable type declared anywhere in the unit.
fn tracked_variables(input: EscapeInput<'_>) -> Result<FxHashSet<VarId>, AnalysisError> {
    let mut tracked = FxHashSet::default();
    let mut consider = |def: DefId, always: bool| -> Result<(), AnalysisError> {
        let var = input
            .vars
            .definition(def)
            .ok_or(AnalysisError::MissingVariable(def))?;
        let escapable = always || {
            let ty = input
                .types
                .def_type(def)
                .ok_or(AnalysisError::MissingDefinitionType(def))?;
            input.pool.can_escape(ty)
        };
        if escapable {
            tracked.insert(var);
        }
        Ok(())
    };
    for id in input.ast.arena.expr_ids() {
        match input.ast.expr(id) {
            ExprKind::FunctionDef { def, .. } => consider(*def, true)?,
            ExprKind::VariableDecl { def, .. } => consider(*def, false)?,
            ExprKind::Lambda { params, .. } => {
                for &param in params {
                    consider(param, false)?;
                }
            }
            _ => {}
        }
    }
    Ok(tracked)
}

/// Worklist fixed point. Returns the number of entities processed.
fn propagate(
    edges: &[AssignmentEdge],
    usage_depth: &mut FxHashMap<FunctionalEntity, i32>,
) -> usize {
    let mut edges_by_lhs: FxHashMap<FunctionalEntity, SmallVec<[usize; 4]>> = FxHashMap::default();
    for (idx, edge) in edges.iter().enumerate() {
        for &entity in &edge.lhs {
            edges_by_lhs.entry(entity).or_default().push(idx);
        }
    }

    let mut initial: Vec<FunctionalEntity> = usage_depth.keys().copied().collect();
    initial.sort_unstable();
    let mut queued: FxHashSet<FunctionalEntity> = initial.iter().copied().collect();
    let mut worklist: VecDeque<FunctionalEntity> = initial.into();
    let mut iterations = 0;

    while let Some(entity) = worklist.pop_front() {
        queued.remove(&entity);
        iterations += 1;
        let Some(edge_ids) = edges_by_lhs.get(&entity) else {
            continue;
        };
        for &idx in edge_ids {
            let edge = &edges[idx];
            let Some(bound) = edge
                .lhs
                .iter()
                .filter_map(|lhs| usage_depth.get(lhs).copied())
                .min()
            else {
                continue;
            };
            for &rhs in &edge.rhs {
                let Some(depth) = usage_depth.get_mut(&rhs) else {
                    continue;
                };
                if *depth > bound {
                    tracing::trace!(entity = ?rhs, from = *depth, to = bound, "usage depth lowered");
                    *depth = bound;
                    if queued.insert(rhs) {
                        worklist.push_back(rhs);
                    }
                }
            }
        }
    }
    iterations
}

struct EdgeCollector<'a> {
    input: EscapeInput<'a>,
    tracked: &'a FxHashSet<VarId>,
    named: FxHashMap<DefId, ExprId>,
    /// Enclosing lambdas with "result can escape", innermost last.
    lambdas: Vec<(ExprId, bool)>,
    /// Open assignment/return sides collecting the entities they mention.
    contexts: Vec<FxHashSet<FunctionalEntity>>,
    /// Contexts below this index belong to an enclosing lambda and do not
    /// see entities mentioned inside the current one.
    barrier: usize,
    assignments: Vec<AssignmentEdge>,
    returns: FxHashMap<ExprId, FxHashSet<FunctionalEntity>>,
    /// Entities written into heap cells; they outlive every frame.
    heap_stored: FxHashSet<FunctionalEntity>,
}

impl EdgeCollector<'_> {
    fn mention(&mut self, entity: FunctionalEntity) {
        for context in &mut self.contexts[self.barrier..] {
            context.insert(entity);
        }
    }

    /// Visit `expr` inside a fresh context and return what it mentioned.
    fn collect(&mut self, expr: ExprId) -> Result<FxHashSet<FunctionalEntity>, AnalysisError> {
        self.contexts.push(FxHashSet::default());
        let result = self.visit(expr);
        let mentioned = self.contexts.pop().unwrap_or_default();
        result.map(|()| mentioned)
    }

    /// Visit `expr` without letting it contribute to any open context.
    fn isolated(&mut self, expr: ExprId) -> Result<(), AnalysisError> {
        let saved = self.barrier;
        self.barrier = self.contexts.len();
        let result = self.visit(expr);
        self.barrier = saved;
        result
    }

    fn add_assignment(
        &mut self,
        lhs: impl IntoIterator<Item = FunctionalEntity>,
        rhs: FxHashSet<FunctionalEntity>,
    ) {
        let mut lhs: SmallVec<[FunctionalEntity; 2]> = lhs.into_iter().collect();
        if lhs.is_empty() || rhs.is_empty() {
            return;
        }
        let mut rhs: SmallVec<[FunctionalEntity; 4]> = rhs.into_iter().collect();
        lhs.sort_unstable();
        rhs.sort_unstable();
        self.assignments.push(AssignmentEdge { lhs, rhs });
    }

    fn tracked_entity(&self, var: VarId) -> Option<FunctionalEntity> {
        self.tracked
            .contains(&var)
            .then_some(FunctionalEntity::Variable(var))
    }

    fn expr_type_escapes(&self, expr: ExprId) -> Result<bool, AnalysisError> {
        let ty = self
            .input
            .types
            .expr_type(expr)
            .ok_or(AnalysisError::MissingType(expr))?;
        Ok(self.input.pool.can_escape(ty))
    }

    fn visit(&mut self, expr: ExprId) -> Result<(), AnalysisError> {
        let ast = self.input.ast;
        ensure_sufficient_stack(|| match ast.expr(expr) {
            ExprKind::Lambda { body, .. } => {
                self.mention(FunctionalEntity::Lambda(expr));
                self.visit_lambda_body(expr, *body)
            }
            ExprKind::FunctionDef { def, lambda } => {
                if let (Some(var), ExprKind::Lambda { body, .. }) =
                    (self.input.vars.definition(*def), ast.expr(*lambda))
                {
                    let mut rhs = FxHashSet::default();
                    rhs.insert(FunctionalEntity::Lambda(*lambda));
                    self.add_assignment(self.tracked_entity(var), rhs);
                    self.visit_lambda_body(*lambda, *body)
                } else {
                    self.visit(*lambda)
                }
            }
            ExprKind::VariableUse(_) => {
                let def = self
                    .input
                    .names
                    .get(expr)
                    .ok_or(AnalysisError::UnresolvedName(expr))?;
                let var = self
                    .input
                    .vars
                    .definition(def)
                    .ok_or(AnalysisError::MissingVariable(def))?;
                if let Some(entity) = self.tracked_entity(var) {
                    self.mention(entity);
                }
                Ok(())
            }
            ExprKind::VariableDecl { def, value } => {
                let var = self
                    .input
                    .vars
                    .definition(*def)
                    .ok_or(AnalysisError::MissingVariable(*def))?;
                match self.tracked_entity(var) {
                    Some(entity) => {
                        let rhs = self.collect(*value)?;
                        self.add_assignment([entity], rhs);
                        Ok(())
                    }
                    None => self.visit(*value),
                }
            }
            ExprKind::Assign { target, value } => {
                if self.expr_type_escapes(*target)? {
                    let rhs = self.collect(*value)?;
                    let lhs = self.collect(*target)?;
                    if self.is_heap_place(*target) {
                        self.heap_stored.extend(rhs.iter().copied());
                    }
                    self.add_assignment(lhs, rhs);
                    Ok(())
                } else {
                    self.visit(*target)?;
                    self.visit(*value)
                }
            }
            ExprKind::Return(value) => match self.lambdas.last().copied() {
                Some((lambda, true)) => self.visit_returned(lambda, *value),
                _ => self.visit(*value),
            },
            ExprKind::Allocation(value) => {
                if self.expr_type_escapes(*value)? {
                    let stored = self.collect(*value)?;
                    self.heap_stored.extend(stored);
                    Ok(())
                } else {
                    self.visit(*value)
                }
            }
            ExprKind::Call { callee, args } => {
                let named = self.named_callee(*callee);
                if self.expr_type_escapes(expr)? {
                    match named {
                        Some(lambda) => {
                            self.isolated(*callee)?;
                            self.mention(FunctionalEntity::CallResult(lambda));
                        }
                        // The result may be built from the callee's environment.
                        None => self.visit(*callee)?,
                    }
                } else {
                    self.isolated(*callee)?;
                }
                let params = self.named_params(named);
                for (idx, &arg) in args.iter().enumerate() {
                    let param = params
                        .get(idx)
                        .and_then(|&def| self.input.vars.definition(def))
                        .and_then(|var| self.tracked_entity(var));
                    match param {
                        Some(param) => {
                            let rhs = self.collect(arg)?;
                            self.add_assignment([param], rhs);
                        }
                        None => self.visit(arg)?,
                    }
                }
                Ok(())
            }
            kind => {
                for child in kind.children() {
                    self.visit(child)?;
                }
                Ok(())
            }
        })
    }

    fn visit_lambda_body(&mut self, lambda: ExprId, body: ExprId) -> Result<(), AnalysisError> {
        let ty = self
            .input
            .types
            .expr_type(lambda)
            .ok_or(AnalysisError::MissingType(lambda))?;
        let result_escapes = self
            .input
            .pool
            .function_result(ty)
            .is_some_and(|result| self.input.pool.can_escape(result));

        let saved = self.barrier;
        self.barrier = self.contexts.len();
        self.lambdas.push((lambda, result_escapes));

        let ast = self.input.ast;
        let result = match (result_escapes, ast.expr(body)) {
            (false, _) => self.visit(body),
            (true, ExprKind::Block(exprs)) => self.visit_block_returning(lambda, exprs),
            (true, _) => self.visit_returned(lambda, body),
        };

        self.lambdas.pop();
        self.barrier = saved;
        result
    }

    fn visit_block_returning(&mut self, lambda: ExprId, exprs: &[ExprId]) -> Result<(), AnalysisError> {
        let Some((&last, init)) = exprs.split_last() else {
            return Ok(());
        };
        for &expr in init {
            self.visit(expr)?;
        }
        self.visit_returned(lambda, last)
    }

    fn visit_returned(&mut self, lambda: ExprId, value: ExprId) -> Result<(), AnalysisError> {
        let returned = self.collect(value)?;
        if !returned.is_empty() {
            self.returns.entry(lambda).or_default().extend(returned);
        }
        Ok(())
    }

    /// Lambda of the named function `callee` refers to, if any.
    fn named_callee(&self, callee: ExprId) -> Option<ExprId> {
        match self.input.ast.expr(callee) {
            ExprKind::VariableUse(_) => self
                .input
                .names
                .get(callee)
                .and_then(|def| self.named.get(&def).copied()),
            _ => None,
        }
    }

    fn named_params(&self, lambda: Option<ExprId>) -> Vec<DefId> {
        match lambda.map(|lambda| self.input.ast.expr(lambda)) {
            Some(ExprKind::Lambda { params, .. }) => params.clone(),
            _ => Vec::new(),
        }
    }

    /// Whether assigning to `target` writes into a heap cell.
    fn is_heap_place(&self, target: ExprId) -> bool {
        match self.input.ast.expr(target) {
            ExprKind::Dereference(_) => true,
            ExprKind::FieldRef { object, .. } => self.is_heap_place(*object),
            _ => false,
        }
    }
}
