//! Variables-map construction.
//!
//! Gives every definition reachable from the root a [`Variable`] shaped by
//! its type, then maps every assignable expression to the variable it
//! denotes. Definitions are created in a first pass so that recursive
//! functions can refer to themselves.
//!
//! [`Variable`]: caco_ir::Variable

use caco_ir::{
    Ast, DefId, ExprId, ExprKind, ResolvedNames, TypeCheckResult, TypePool, VarId, VariableArena,
    VariablesMap,
};

use crate::stack::ensure_sufficient_stack;
use crate::AnalysisError;

/// Build the definition and lvalue tables for `ast`, allocating variables in
/// `vars`.
pub fn build_variables_map(
    ast: &Ast,
    names: &ResolvedNames,
    types: &TypeCheckResult,
    pool: &TypePool,
    vars: &mut VariableArena,
) -> Result<VariablesMap, AnalysisError> {
    let mut builder = MapBuilder {
        ast,
        names,
        types,
        pool,
        vars,
        map: VariablesMap::new(),
    };
    builder.declare(ast.root)?;
    builder.resolve_lvalues(ast.root)?;

    tracing::debug!(
        definitions = builder.map.definitions.len(),
        lvalues = builder.map.lvalues.len(),
        "variables map built"
    );
    Ok(builder.map)
}

struct MapBuilder<'a> {
    ast: &'a Ast,
    names: &'a ResolvedNames,
    types: &'a TypeCheckResult,
    pool: &'a TypePool,
    vars: &'a mut VariableArena,
    map: VariablesMap,
}

impl MapBuilder<'_> {
    fn typed_variable(&mut self, def: DefId) -> Result<VarId, AnalysisError> {
        let ty = self
            .types
            .def_type(def)
            .ok_or(AnalysisError::MissingDefinitionType(def))?;
        Ok(self.vars.from_type(self.pool, ty))
    }

    fn declare(&mut self, expr: ExprId) -> Result<(), AnalysisError> {
        let ast = self.ast;
        ensure_sufficient_stack(|| {
            match ast.expr(expr) {
                ExprKind::VariableDecl { def, .. } => {
                    let var = self.typed_variable(*def)?;
                    self.map.definitions.insert(*def, var);
                }
                ExprKind::FunctionDef { def, .. } => {
                    let var = self.vars.function();
                    self.map.definitions.insert(*def, var);
                }
                ExprKind::Lambda { params, .. } => {
                    for &param in params {
                        let var = self.typed_variable(param)?;
                        self.map.definitions.insert(param, var);
                    }
                }
                _ => {}
            }
            for child in ast.expr(expr).children() {
                self.declare(child)?;
            }
            Ok(())
        })
    }

    fn resolve_lvalues(&mut self, expr: ExprId) -> Result<(), AnalysisError> {
        let ast = self.ast;
        ensure_sufficient_stack(|| {
            for child in ast.expr(expr).children() {
                self.resolve_lvalues(child)?;
            }
            match ast.expr(expr) {
                ExprKind::VariableUse(_) => {
                    let def = self
                        .names
                        .get(expr)
                        .ok_or(AnalysisError::UnresolvedName(expr))?;
                    let var = self
                        .map
                        .definition(def)
                        .ok_or(AnalysisError::MissingVariable(def))?;
                    self.map.lvalues.insert(expr, var);
                }
                ExprKind::FieldRef { object, field } => {
                    // Projections out of temporaries (call results, literals)
                    // are not assignable.
                    if let Some(field_var) = self
                        .map
                        .lvalue(*object)
                        .and_then(|struct_var| self.vars.field(struct_var, *field))
                    {
                        self.map.lvalues.insert(expr, field_var);
                    }
                }
                ExprKind::Dereference(_) => {
                    self.map.lvalues.insert(expr, self.vars.heap());
                }
                _ => {}
            }
            Ok(())
        })
    }
}
