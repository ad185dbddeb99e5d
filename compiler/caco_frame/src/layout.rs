//! Value layouts: how a (possibly composite) value maps onto IR nodes.
//!
//! A layout mirrors a type. Call sites and prologues only ever see the
//! flattened form, one node per primitive, in declaration order.

use caco_ir::{CfgNode, Name, Type, TypeId, TypePool, VirtualRegisters};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    Simple(CfgNode),
    Struct(Vec<(Name, Layout)>),
    /// A function value: code address and link (static link or closure
    /// environment).
    Function { code: CfgNode, link: CfgNode },
}

impl Layout {
    /// Primitive nodes in declaration order.
    pub fn flatten(&self) -> Vec<CfgNode> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<CfgNode>) {
        match self {
            Layout::Simple(node) => out.push(node.clone()),
            Layout::Struct(fields) => {
                for (_, field) in fields {
                    field.flatten_into(out);
                }
            }
            Layout::Function { code, link } => {
                out.push(code.clone());
                out.push(link.clone());
            }
        }
    }

    /// Number of primitives.
    pub fn size(&self) -> usize {
        match self {
            Layout::Simple(_) => 1,
            Layout::Struct(fields) => fields.iter().map(|(_, field)| field.size()).sum(),
            Layout::Function { .. } => 2,
        }
    }

    /// A layout of fresh virtual registers shaped like `ty`.
    pub fn of_virtual_registers(pool: &TypePool, ty: TypeId, regs: &mut VirtualRegisters) -> Self {
        match pool.get(ty) {
            Type::Unit | Type::Int | Type::Bool => {
                Layout::Simple(CfgNode::virtual_register(regs.fresh(false)))
            }
            Type::Ref(_) => Layout::Simple(CfgNode::virtual_register(regs.fresh(true))),
            Type::Function { .. } => Layout::Function {
                code: CfgNode::virtual_register(regs.fresh(false)),
                link: CfgNode::virtual_register(regs.fresh(true)),
            },
            Type::Struct(fields) => Layout::Struct(
                fields
                    .iter()
                    .map(|&(name, field)| (name, Layout::of_virtual_registers(pool, field, regs)))
                    .collect(),
            ),
        }
    }
}

impl From<CfgNode> for Layout {
    fn from(node: CfgNode) -> Self {
        Layout::Simple(node)
    }
}
