//! Variables: the units the backend allocates storage for.
//!
//! Every declaration, argument and auxiliary need (static links, closure
//! links, heap-cell pointers) gets a [`Variable`] in a [`VariableArena`].
//! Composite variables own their sub-variables; flattening to primitives is
//! a derived view. Variables are never removed.
//!
//! Debug names come from the arena, so two compilation runs never share a
//! naming counter.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{DefId, ExprId, Name, Type, TypeId, TypePool};

/// Index of a [`Variable`] in a [`VariableArena`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarId({})", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Variable {
    /// A single machine word.
    Primitive { holds_reference: bool },
    /// Named fields, in declaration order.
    Struct { fields: Vec<(Name, VarId)> },
    /// A function value: code pointer plus link (static link or closure
    /// environment).
    Function { code: VarId, link: VarId },
    /// Sentinel for storage reached through a reference. Never allocated.
    Heap,
}

/// Arena of variables for one compilation run.
#[derive(Clone, Debug)]
pub struct VariableArena {
    vars: Vec<Variable>,
    labels: Vec<Option<&'static str>>,
}

impl VariableArena {
    /// The `Heap` sentinel always occupies slot 0.
    const HEAP: VarId = VarId(0);

    pub fn new() -> Self {
        Self {
            vars: vec![Variable::Heap],
            labels: vec![Some("heap")],
        }
    }

    fn push(&mut self, var: Variable, label: Option<&'static str>) -> VarId {
        let id = VarId(u32::try_from(self.vars.len()).unwrap_or(u32::MAX));
        self.vars.push(var);
        self.labels.push(label);
        id
    }

    /// The arena's `Heap` sentinel.
    #[inline]
    pub fn heap(&self) -> VarId {
        Self::HEAP
    }

    pub fn primitive(&mut self, holds_reference: bool) -> VarId {
        self.push(Variable::Primitive { holds_reference }, None)
    }

    /// A primitive with a debug label (`sl`, `cl`, `ptr`, ...).
    pub fn labeled_primitive(&mut self, label: &'static str, holds_reference: bool) -> VarId {
        self.push(Variable::Primitive { holds_reference }, Some(label))
    }

    pub fn structure(&mut self, fields: Vec<(Name, VarId)>) -> VarId {
        self.push(Variable::Struct { fields }, None)
    }

    /// A function variable with fresh code and link primitives.
    pub fn function(&mut self) -> VarId {
        let code = self.labeled_primitive("code", false);
        let link = self.labeled_primitive("link", true);
        self.push(Variable::Function { code, link }, None)
    }

    /// Create a variable shaped like `ty`.
    pub fn from_type(&mut self, pool: &TypePool, ty: TypeId) -> VarId {
        match pool.get(ty) {
            Type::Unit | Type::Int | Type::Bool => self.primitive(false),
            Type::Ref(_) => self.primitive(true),
            Type::Function { .. } => self.function(),
            Type::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|&(name, field_ty)| (name, self.from_type(pool, field_ty)))
                    .collect();
                self.structure(fields)
            }
        }
    }

    /// # Panics
    /// Panics if `id` was not produced by this arena.
    #[inline]
    pub fn get(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn is_primitive(&self, id: VarId) -> bool {
        matches!(self.get(id), Variable::Primitive { .. })
    }

    /// `true` only for primitives marked as holding a reference.
    pub fn holds_reference(&self, id: VarId) -> bool {
        matches!(
            self.get(id),
            Variable::Primitive {
                holds_reference: true
            }
        )
    }

    /// Flatten to primitives in declaration order. `Heap` flattens to nothing.
    pub fn primitives(&self, id: VarId) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_primitives(id, &mut out);
        out
    }

    fn collect_primitives(&self, id: VarId, out: &mut Vec<VarId>) {
        match self.get(id) {
            Variable::Primitive { .. } => out.push(id),
            Variable::Struct { fields } => {
                for &(_, field) in fields {
                    self.collect_primitives(field, out);
                }
            }
            Variable::Function { code, link } => {
                out.push(*code);
                out.push(*link);
            }
            Variable::Heap => {}
        }
    }

    /// `id` followed by every variable nested inside it.
    pub fn with_nested(&self, id: VarId) -> Vec<VarId> {
        let mut out = vec![id];
        let mut idx = 0;
        while idx < out.len() {
            match self.get(out[idx]) {
                Variable::Struct { fields } => out.extend(fields.iter().map(|&(_, f)| f)),
                Variable::Function { code, link } => out.extend([*code, *link]),
                Variable::Primitive { .. } | Variable::Heap => {}
            }
            idx += 1;
        }
        out
    }

    /// Sub-variable for `field` of a struct variable.
    pub fn field(&self, id: VarId, field: Name) -> Option<VarId> {
        match self.get(id) {
            Variable::Struct { fields } => fields
                .iter()
                .find(|&&(name, _)| name == field)
                .map(|&(_, var)| var),
            _ => None,
        }
    }

    /// Run-local debug name, e.g. `v12` or `sl7`.
    pub fn display_name(&self, id: VarId) -> String {
        match self.labels.get(id.index()).copied().flatten() {
            Some(label) => format!("{label}{}", id.raw()),
            None => format!("v{}", id.raw()),
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Always `false`: the `Heap` sentinel is always present.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for VariableArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity table from definitions and assignable expressions to variables.
#[derive(Clone, Debug, Default)]
pub struct VariablesMap {
    /// Variable introduced by each definition.
    pub definitions: FxHashMap<DefId, VarId>,
    /// Variable denoted by each assignable expression (`VariableUse`,
    /// `FieldRef`, `Dereference`).
    pub lvalues: FxHashMap<ExprId, VarId>,
}

impl VariablesMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn definition(&self, def: DefId) -> Option<VarId> {
        self.definitions.get(&def).copied()
    }

    #[inline]
    pub fn lvalue(&self, expr: ExprId) -> Option<VarId> {
        self.lvalues.get(&expr).copied()
    }
}
