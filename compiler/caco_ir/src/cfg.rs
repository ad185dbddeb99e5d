//! Tree-shaped IR nodes handed to CFG lowering and instruction selection.
//!
//! Nodes are plain trees: an address is a node, a memory access wraps an
//! address node, an assignment pairs an [`LValue`] with a value node.
//! Virtual registers are left unresolved for register allocation.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Size of a machine word (and of every stack slot) in bytes.
pub const WORD_SIZE: i64 = 8;

// ── Registers ───────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HardwareRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rsp,
    Rbp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl HardwareRegister {
    pub const fn as_str(self) -> &'static str {
        match self {
            HardwareRegister::Rax => "rax",
            HardwareRegister::Rbx => "rbx",
            HardwareRegister::Rcx => "rcx",
            HardwareRegister::Rdx => "rdx",
            HardwareRegister::Rsi => "rsi",
            HardwareRegister::Rdi => "rdi",
            HardwareRegister::Rsp => "rsp",
            HardwareRegister::Rbp => "rbp",
            HardwareRegister::R8 => "r8",
            HardwareRegister::R9 => "r9",
            HardwareRegister::R10 => "r10",
            HardwareRegister::R11 => "r11",
            HardwareRegister::R12 => "r12",
            HardwareRegister::R13 => "r13",
            HardwareRegister::R14 => "r14",
            HardwareRegister::R15 => "r15",
        }
    }
}

impl fmt::Display for HardwareRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A register to be assigned by register allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualRegister {
    id: u32,
    holds_reference: bool,
}

impl VirtualRegister {
    #[inline]
    pub const fn id(self) -> u32 {
        self.id
    }

    #[inline]
    pub const fn holds_reference(self) -> bool {
        self.holds_reference
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    Virtual(VirtualRegister),
    Fixed(HardwareRegister),
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Virtual(reg) => write!(f, "%{}", reg.id),
            Register::Fixed(reg) => write!(f, "{reg}"),
        }
    }
}

/// Source of fresh virtual registers for one compilation run.
#[derive(Debug, Default)]
pub struct VirtualRegisters {
    next: u32,
}

impl VirtualRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, holds_reference: bool) -> VirtualRegister {
        let id = self.next;
        self.next += 1;
        VirtualRegister {
            id,
            holds_reference,
        }
    }

    /// Number of registers handed out so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}

// ── Constants ───────────────────────────────────────────────────────

/// A frame's stack size, readable before the frame is final.
///
/// Clones share the same cell: a node built early observes later growth
/// (for example spill slots added by register allocation).
#[derive(Clone, Default)]
pub struct StackSpace(Rc<Cell<i64>>);

impl StackSpace {
    pub fn new(initial: i64) -> Self {
        Self(Rc::new(Cell::new(initial)))
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0.get()
    }

    /// Raise the size to at least `bytes`.
    pub fn extend_to(&self, bytes: i64) {
        if bytes > self.0.get() {
            self.0.set(bytes);
        }
    }
}

impl fmt::Debug for StackSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StackSpace({})", self.get())
    }
}

#[derive(Clone, Debug)]
pub enum Constant {
    Known(i64),
    /// Evaluated when read.
    Lazy(StackSpace),
}

impl Constant {
    pub fn value(&self) -> i64 {
        match self {
            Constant::Known(value) => *value,
            Constant::Lazy(space) => space.get(),
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for Constant {}

// ── Nodes ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CfgNode {
    RegisterUse {
        register: Register,
        holds_reference: bool,
    },
    MemoryAccess {
        address: Box<CfgNode>,
        holds_reference: bool,
    },
    Constant(Constant),
    /// Address of a code or data symbol.
    Label(String),
    Add(Box<CfgNode>, Box<CfgNode>),
    Sub(Box<CfgNode>, Box<CfgNode>),
    Mod(Box<CfgNode>, Box<CfgNode>),
    Assign {
        dst: LValue,
        value: Box<CfgNode>,
    },
    Push(Box<CfgNode>),
    Pop(LValue),
    Call {
        target: Box<CfgNode>,
        arg_count: usize,
    },
}

impl CfgNode {
    pub fn hardware(register: HardwareRegister) -> Self {
        CfgNode::RegisterUse {
            register: Register::Fixed(register),
            holds_reference: false,
        }
    }

    pub fn virtual_register(register: VirtualRegister) -> Self {
        CfgNode::RegisterUse {
            register: Register::Virtual(register),
            holds_reference: register.holds_reference(),
        }
    }

    pub fn known(value: i64) -> Self {
        CfgNode::Constant(Constant::Known(value))
    }

    pub fn lazy(space: StackSpace) -> Self {
        CfgNode::Constant(Constant::Lazy(space))
    }

    pub fn label(name: impl Into<String>) -> Self {
        CfgNode::Label(name.into())
    }

    pub fn add(lhs: CfgNode, rhs: CfgNode) -> Self {
        CfgNode::Add(Box::new(lhs), Box::new(rhs))
    }

    pub fn sub(lhs: CfgNode, rhs: CfgNode) -> Self {
        CfgNode::Sub(Box::new(lhs), Box::new(rhs))
    }

    pub fn modulo(lhs: CfgNode, rhs: CfgNode) -> Self {
        CfgNode::Mod(Box::new(lhs), Box::new(rhs))
    }

    pub fn assign(dst: LValue, value: CfgNode) -> Self {
        CfgNode::Assign {
            dst,
            value: Box::new(value),
        }
    }

    pub fn push(value: CfgNode) -> Self {
        CfgNode::Push(Box::new(value))
    }

    pub fn pop(dst: LValue) -> Self {
        CfgNode::Pop(dst)
    }

    pub fn call(target: CfgNode, arg_count: usize) -> Self {
        CfgNode::Call {
            target: Box::new(target),
            arg_count,
        }
    }

    /// Whether the value this node produces is a reference.
    pub fn holds_reference(&self) -> bool {
        match self {
            CfgNode::RegisterUse {
                holds_reference, ..
            }
            | CfgNode::MemoryAccess {
                holds_reference, ..
            } => *holds_reference,
            _ => false,
        }
    }

    /// View this node as an lvalue, if it is one.
    pub fn as_lvalue(&self) -> Option<LValue> {
        match self {
            CfgNode::RegisterUse { .. } | CfgNode::MemoryAccess { .. } => {
                Some(LValue(Box::new(self.clone())))
            }
            _ => None,
        }
    }
}

impl fmt::Display for CfgNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfgNode::RegisterUse { register, .. } => write!(f, "{register}"),
            CfgNode::MemoryAccess { address, .. } => write!(f, "[{address}]"),
            CfgNode::Constant(constant) => write!(f, "{}", constant.value()),
            CfgNode::Label(name) => write!(f, "${name}"),
            CfgNode::Add(lhs, rhs) => write!(f, "({lhs} + {rhs})"),
            CfgNode::Sub(lhs, rhs) => write!(f, "({lhs} - {rhs})"),
            CfgNode::Mod(lhs, rhs) => write!(f, "({lhs} % {rhs})"),
            CfgNode::Assign { dst, value } => write!(f, "{dst} = {value}"),
            CfgNode::Push(value) => write!(f, "push {value}"),
            CfgNode::Pop(dst) => write!(f, "pop {dst}"),
            CfgNode::Call { target, arg_count } => write!(f, "call {target}/{arg_count}"),
        }
    }
}

/// A node that denotes a storage location: a register or a memory access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LValue(Box<CfgNode>);

impl LValue {
    pub fn register(register: Register, holds_reference: bool) -> Self {
        LValue(Box::new(CfgNode::RegisterUse {
            register,
            holds_reference,
        }))
    }

    pub fn hardware(register: HardwareRegister) -> Self {
        LValue(Box::new(CfgNode::hardware(register)))
    }

    pub fn virtual_register(register: VirtualRegister) -> Self {
        LValue(Box::new(CfgNode::virtual_register(register)))
    }

    pub fn memory(address: CfgNode, holds_reference: bool) -> Self {
        LValue(Box::new(CfgNode::MemoryAccess {
            address: Box::new(address),
            holds_reference,
        }))
    }

    #[inline]
    pub fn as_node(&self) -> &CfgNode {
        &self.0
    }

    #[inline]
    pub fn into_node(self) -> CfgNode {
        *self.0
    }

    pub fn holds_reference(&self) -> bool {
        self.0.holds_reference()
    }
}

impl From<LValue> for CfgNode {
    fn from(lvalue: LValue) -> Self {
        *lvalue.0
    }
}

impl fmt::Display for LValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
