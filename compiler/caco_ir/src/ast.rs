//! Flat, arena-allocated AST.
//!
//! The backend never parses: it receives an [`Ast`] from the front end,
//! together with a [`ResolvedNames`](crate::ResolvedNames) table and a
//! [`TypeCheckResult`](crate::TypeCheckResult). Children are referenced by
//! [`ExprId`], definitions by [`DefId`].

use std::fmt;

use crate::Name;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Index of an expression in an [`ExprArena`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    /// Create a new expression ID from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

/// Index of a [`Definition`] in an [`ExprArena`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DefId(u32);

impl DefId {
    /// Create a new definition ID from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefId({})", self.0)
    }
}

// ── Operators ───────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    And,
    Or,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

// ── Definitions ─────────────────────────────────────────────────────

/// What introduced a name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DefKind {
    /// `let x = ...`
    Variable,
    /// A formal parameter of a lambda.
    Argument,
    /// `let f = [params] -> T => body`: a name bound to a lambda.
    Function,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Definition {
    pub name: Name,
    pub kind: DefKind,
}

// ── Expressions ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Empty,
    Int(i64),
    Bool(bool),
    Block(Vec<ExprId>),
    /// A read (or, under `Assign`, a write) of a named definition.
    VariableUse(Name),
    /// Struct field projection: `object.field`.
    FieldRef {
        object: ExprId,
        field: Name,
    },
    VariableDecl {
        def: DefId,
        value: ExprId,
    },
    /// Named function. `lambda` always points at an [`ExprKind::Lambda`].
    FunctionDef {
        def: DefId,
        lambda: ExprId,
    },
    Lambda {
        params: Vec<DefId>,
        body: ExprId,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    },
    While {
        cond: ExprId,
        body: ExprId,
    },
    Return(ExprId),
    Assign {
        target: ExprId,
        value: ExprId,
    },
    /// `target op= value`; reads and writes `target`.
    CompoundAssign {
        op: BinaryOp,
        target: ExprId,
        value: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Struct(Vec<(Name, ExprId)>),
    /// Heap allocation of a value, producing a reference.
    Allocation(ExprId),
    /// Read through a reference.
    Dereference(ExprId),
}

impl ExprKind {
    /// Direct child expressions, in evaluation order.
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Empty | ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::VariableUse(_) => {
                Vec::new()
            }
            ExprKind::Block(exprs) => exprs.clone(),
            ExprKind::FieldRef { object, .. } => vec![*object],
            ExprKind::VariableDecl { value, .. } => vec![*value],
            ExprKind::FunctionDef { lambda, .. } => vec![*lambda],
            ExprKind::Lambda { body, .. } => vec![*body],
            ExprKind::Call { callee, args } => {
                let mut children = Vec::with_capacity(args.len() + 1);
                children.push(*callee);
                children.extend(args.iter().copied());
                children
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![*cond, *then_branch];
                children.extend(*else_branch);
                children
            }
            ExprKind::While { cond, body } => vec![*cond, *body],
            ExprKind::Return(value)
            | ExprKind::Allocation(value)
            | ExprKind::Dereference(value) => vec![*value],
            ExprKind::Assign { target, value } | ExprKind::CompoundAssign { target, value, .. } => {
                vec![*target, *value]
            }
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Unary { operand, .. } => vec![*operand],
            ExprKind::Struct(fields) => fields.iter().map(|&(_, expr)| expr).collect(),
        }
    }
}

// ── Arena ───────────────────────────────────────────────────────────

/// Storage for expressions and definitions of one compilation unit.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    exprs: Vec<ExprKind>,
    defs: Vec<Definition>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an expression and return its ID.
    pub fn alloc(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId::new(u32::try_from(self.exprs.len()).unwrap_or(u32::MAX));
        self.exprs.push(kind);
        id
    }

    /// Allocate a definition and return its ID.
    pub fn alloc_def(&mut self, name: Name, kind: DefKind) -> DefId {
        let id = DefId::new(u32::try_from(self.defs.len()).unwrap_or(u32::MAX));
        self.defs.push(Definition { name, kind });
        id
    }

    /// Get an expression by ID.
    ///
    /// # Panics
    /// Panics if `id` was not allocated by this arena.
    #[inline]
    pub fn get(&self, id: ExprId) -> &ExprKind {
        &self.exprs[id.index()]
    }

    /// Get a definition by ID.
    ///
    /// # Panics
    /// Panics if `id` was not allocated by this arena.
    #[inline]
    pub fn def(&self, id: DefId) -> &Definition {
        &self.defs[id.index()]
    }

    /// Replace an already allocated expression.
    ///
    /// Builders use this to patch bodies of recursive definitions.
    pub fn replace(&mut self, id: ExprId, kind: ExprKind) {
        if let Some(slot) = self.exprs.get_mut(id.index()) {
            *slot = kind;
        }
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn def_count(&self) -> usize {
        self.defs.len()
    }

    /// Iterate over all expression IDs in allocation order.
    pub fn expr_ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        (0..self.exprs.len()).map(|i| ExprId::new(u32::try_from(i).unwrap_or(u32::MAX)))
    }
}

/// A whole compilation unit: its arena plus the root expression.
#[derive(Clone, Debug)]
pub struct Ast {
    pub arena: ExprArena,
    pub root: ExprId,
}

impl Ast {
    pub fn new(arena: ExprArena, root: ExprId) -> Self {
        Self { arena, root }
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &ExprKind {
        self.arena.get(id)
    }
}
