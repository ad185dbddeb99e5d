//! A resolved, typed compilation unit and a builder for it.
//!
//! [`Program`] bundles everything the front end hands to the backend.
//! [`ProgramBuilder`] constructs one directly: it records name resolution
//! and types as expressions are created, so callers never have to keep the
//! three tables in sync by hand.

use crate::{
    Ast, BinaryOp, DefId, DefKind, ExprArena, ExprId, ExprKind, Name, ResolvedNames,
    StringInterner, Type, TypeCheckResult, TypeId, TypePool, UnaryOp,
};

/// Front-end output for one compilation unit.
pub struct Program {
    pub ast: Ast,
    pub names: ResolvedNames,
    pub types: TypeCheckResult,
    pub pool: TypePool,
    pub interner: StringInterner,
}

/// Incremental constructor for a [`Program`].
///
/// Definitions are created before the expressions that use them, which
/// makes recursive functions straightforward: create the function's
/// definition, build a body that calls it, then bind the lambda.
pub struct ProgramBuilder {
    interner: StringInterner,
    pool: TypePool,
    arena: ExprArena,
    names: ResolvedNames,
    types: TypeCheckResult,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            interner: StringInterner::new(),
            pool: TypePool::new(),
            arena: ExprArena::new(),
            names: ResolvedNames::new(),
            types: TypeCheckResult::new(),
        }
    }

    pub fn name(&self, text: &str) -> Name {
        self.interner.intern(text)
    }

    pub fn pool(&self) -> &TypePool {
        &self.pool
    }

    // ── Types ───────────────────────────────────────────────────────

    pub fn function_type(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.pool.function(params, result)
    }

    pub fn struct_type(&mut self, fields: &[(&str, TypeId)]) -> TypeId {
        let fields = fields
            .iter()
            .map(|&(field, ty)| (self.interner.intern(field), ty))
            .collect();
        self.pool.structure(fields)
    }

    pub fn ref_type(&mut self, inner: TypeId) -> TypeId {
        self.pool.reference(inner)
    }

    // ── Definitions ─────────────────────────────────────────────────

    fn definition(&mut self, name: &str, kind: DefKind, ty: TypeId) -> DefId {
        let def = self.arena.alloc_def(self.interner.intern(name), kind);
        self.types.set_def(def, ty);
        def
    }

    /// A lambda parameter.
    pub fn param(&mut self, name: &str, ty: TypeId) -> DefId {
        self.definition(name, DefKind::Argument, ty)
    }

    /// A `let` binding; pair with [`declare`](Self::declare).
    pub fn variable(&mut self, name: &str, ty: TypeId) -> DefId {
        self.definition(name, DefKind::Variable, ty)
    }

    /// A named function taking `params`; pair with
    /// [`function`](Self::function).
    pub fn function_name(&mut self, name: &str, params: &[DefId], result: TypeId) -> DefId {
        let param_types = params.iter().map(|&p| self.def_type(p)).collect();
        let ty = self.pool.function(param_types, result);
        self.definition(name, DefKind::Function, ty)
    }

    fn def_type(&self, def: DefId) -> TypeId {
        self.types.def_type(def).unwrap_or(TypeId::UNIT)
    }

    fn type_of(&self, expr: ExprId) -> TypeId {
        self.types.expr_type(expr).unwrap_or(TypeId::UNIT)
    }

    fn typed(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        let id = self.arena.alloc(kind);
        self.types.set_expr(id, ty);
        id
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn empty(&mut self) -> ExprId {
        self.typed(ExprKind::Empty, TypeId::UNIT)
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.typed(ExprKind::Int(value), TypeId::INT)
    }

    pub fn boolean(&mut self, value: bool) -> ExprId {
        self.typed(ExprKind::Bool(value), TypeId::BOOL)
    }

    /// A use of `def`, resolved and typed.
    pub fn use_of(&mut self, def: DefId) -> ExprId {
        let name = self.arena.def(def).name;
        let id = self.typed(ExprKind::VariableUse(name), self.def_type(def));
        self.names.insert(id, def);
        id
    }

    pub fn field(&mut self, object: ExprId, field: &str) -> ExprId {
        let field = self.interner.intern(field);
        let ty = match self.pool.get(self.type_of(object)) {
            Type::Struct(fields) => fields
                .iter()
                .find(|&&(name, _)| name == field)
                .map_or(TypeId::UNIT, |&(_, ty)| ty),
            _ => TypeId::UNIT,
        };
        self.typed(ExprKind::FieldRef { object, field }, ty)
    }

    pub fn declare(&mut self, def: DefId, value: ExprId) -> ExprId {
        self.typed(ExprKind::VariableDecl { def, value }, TypeId::UNIT)
    }

    pub fn lambda(&mut self, params: Vec<DefId>, result: TypeId, body: ExprId) -> ExprId {
        let param_types = params.iter().map(|&p| self.def_type(p)).collect();
        let ty = self.pool.function(param_types, result);
        self.typed(ExprKind::Lambda { params, body }, ty)
    }

    /// Bind `lambda` to the function definition `def`.
    pub fn function(&mut self, def: DefId, lambda: ExprId) -> ExprId {
        self.typed(ExprKind::FunctionDef { def, lambda }, TypeId::UNIT)
    }

    pub fn call(&mut self, callee: ExprId, args: Vec<ExprId>) -> ExprId {
        let result = self
            .pool
            .function_result(self.type_of(callee))
            .unwrap_or(TypeId::UNIT);
        self.typed(ExprKind::Call { callee, args }, result)
    }

    /// A block typed as its last expression.
    pub fn block(&mut self, exprs: Vec<ExprId>) -> ExprId {
        let ty = exprs.last().map_or(TypeId::UNIT, |&last| self.type_of(last));
        self.typed(ExprKind::Block(exprs), ty)
    }

    pub fn assign(&mut self, target: ExprId, value: ExprId) -> ExprId {
        let ty = self.type_of(target);
        self.typed(ExprKind::Assign { target, value }, ty)
    }

    pub fn compound_assign(&mut self, op: BinaryOp, target: ExprId, value: ExprId) -> ExprId {
        let ty = self.type_of(target);
        self.typed(ExprKind::CompoundAssign { op, target, value }, ty)
    }

    pub fn ret(&mut self, value: ExprId) -> ExprId {
        self.typed(ExprKind::Return(value), TypeId::UNIT)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let ty = match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                TypeId::INT
            }
            _ => TypeId::BOOL,
        };
        self.typed(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        let ty = match op {
            UnaryOp::Neg => TypeId::INT,
            UnaryOp::Not => TypeId::BOOL,
        };
        self.typed(ExprKind::Unary { op, operand }, ty)
    }

    pub fn if_else(&mut self, cond: ExprId, then_branch: ExprId, else_branch: Option<ExprId>) -> ExprId {
        let ty = match else_branch {
            Some(_) => self.type_of(then_branch),
            None => TypeId::UNIT,
        };
        self.typed(
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            },
            ty,
        )
    }

    pub fn while_loop(&mut self, cond: ExprId, body: ExprId) -> ExprId {
        self.typed(ExprKind::While { cond, body }, TypeId::UNIT)
    }

    pub fn structure(&mut self, fields: Vec<(&str, ExprId)>) -> ExprId {
        let typed_fields: Vec<(Name, TypeId)> = fields
            .iter()
            .map(|&(field, expr)| (self.interner.intern(field), self.type_of(expr)))
            .collect();
        let ty = self.pool.structure(typed_fields);
        let fields = fields
            .into_iter()
            .map(|(field, expr)| (self.interner.intern(field), expr))
            .collect();
        self.typed(ExprKind::Struct(fields), ty)
    }

    pub fn allocation(&mut self, value: ExprId) -> ExprId {
        let ty = self.pool.reference(self.type_of(value));
        self.typed(ExprKind::Allocation(value), ty)
    }

    pub fn dereference(&mut self, reference: ExprId) -> ExprId {
        let ty = match self.pool.get(self.type_of(reference)) {
            Type::Ref(inner) => *inner,
            _ => TypeId::UNIT,
        };
        self.typed(ExprKind::Dereference(reference), ty)
    }

    /// Finish with `root` as the unit's top-level expression.
    pub fn finish(self, root: ExprId) -> Program {
        Program {
            ast: Ast::new(self.arena, root),
            names: self.names,
            types: self.types,
            pool: self.pool,
            interner: self.interner,
        }
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
