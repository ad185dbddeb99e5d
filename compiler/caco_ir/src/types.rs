//! Type pool and type-checking result.
//!
//! The backend only asks structural questions of types: can a value of
//! this type escape its frame, how many primitive slots does it flatten to,
//! and does a primitive hold a reference. Everything else about typing is
//! settled upstream.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{DefId, ExprId, Name};

/// Index of an interned [`Type`] in a [`TypePool`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const UNIT: TypeId = TypeId(0);
    pub const INT: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Int,
    Bool,
    /// Reference to a heap-allocated value.
    Ref(TypeId),
    Struct(Vec<(Name, TypeId)>),
    Function { params: Vec<TypeId>, result: TypeId },
}

/// Interning storage for types.
///
/// Types are interned bottom-up, so a type can only refer to types interned
/// before it and the pool is acyclic.
#[derive(Clone, Debug)]
pub struct TypePool {
    types: Vec<Type>,
    interned: FxHashMap<Type, TypeId>,
}

impl TypePool {
    pub fn new() -> Self {
        let mut pool = Self {
            types: Vec::new(),
            interned: FxHashMap::default(),
        };
        pool.intern(Type::Unit);
        pool.intern(Type::Int);
        pool.intern(Type::Bool);
        pool
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = TypeId(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.types.push(ty.clone());
        self.interned.insert(ty, id);
        id
    }

    pub fn reference(&mut self, inner: TypeId) -> TypeId {
        self.intern(Type::Ref(inner))
    }

    pub fn structure(&mut self, fields: Vec<(Name, TypeId)>) -> TypeId {
        self.intern(Type::Struct(fields))
    }

    pub fn function(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.intern(Type::Function { params, result })
    }

    /// # Panics
    /// Panics if `id` was not produced by this pool.
    #[inline]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    /// A type can escape if values of it may carry a function (and thus a
    /// captured frame) out of the scope that created them.
    pub fn can_escape(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Function { .. } => true,
            Type::Struct(fields) => fields.iter().any(|&(_, field)| self.can_escape(field)),
            Type::Unit | Type::Int | Type::Bool | Type::Ref(_) => false,
        }
    }

    /// Number of primitive slots a value of this type flattens to.
    pub fn flat_size(&self, id: TypeId) -> usize {
        match self.get(id) {
            Type::Unit | Type::Int | Type::Bool | Type::Ref(_) => 1,
            Type::Function { .. } => 2,
            Type::Struct(fields) => fields.iter().map(|&(_, field)| self.flat_size(field)).sum(),
        }
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Function { .. })
    }

    /// Result type of a function type, `None` for other types.
    pub fn function_result(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Function { result, .. } => Some(*result),
            _ => None,
        }
    }

    /// Parameter types of a function type, `None` for other types.
    pub fn function_params(&self, id: TypeId) -> Option<&[TypeId]> {
        match self.get(id) {
            Type::Function { params, .. } => Some(params),
            _ => None,
        }
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

/// Types assigned by the type checker.
#[derive(Clone, Debug, Default)]
pub struct TypeCheckResult {
    expr_types: FxHashMap<ExprId, TypeId>,
    def_types: FxHashMap<DefId, TypeId>,
}

impl TypeCheckResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_expr(&mut self, expr: ExprId, ty: TypeId) {
        self.expr_types.insert(expr, ty);
    }

    pub fn set_def(&mut self, def: DefId, ty: TypeId) {
        self.def_types.insert(def, ty);
    }

    #[inline]
    pub fn expr_type(&self, expr: ExprId) -> Option<TypeId> {
        self.expr_types.get(&expr).copied()
    }

    #[inline]
    pub fn def_type(&self, def: DefId) -> Option<TypeId> {
        self.def_types.get(&def).copied()
    }
}
