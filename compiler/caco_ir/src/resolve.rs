//! Name-resolution result consumed by the backend.

use rustc_hash::FxHashMap;

use crate::{DefId, ExprId};

/// Maps every identifier use (`ExprKind::VariableUse`) to its definition.
#[derive(Clone, Debug, Default)]
pub struct ResolvedNames {
    uses: FxHashMap<ExprId, DefId>,
}

impl ResolvedNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, use_site: ExprId, def: DefId) {
        self.uses.insert(use_site, def);
    }

    #[inline]
    pub fn get(&self, use_site: ExprId) -> Option<DefId> {
        self.uses.get(&use_site).copied()
    }

    pub fn len(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }
}
