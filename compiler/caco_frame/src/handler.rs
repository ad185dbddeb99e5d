//! Callable handlers: the frame of every lambda, and access to variables
//! from inside it.
//!
//! Handlers live in an arena ([`CallableHandlers`]) indexed by
//! [`HandlerId`] and are built in non-decreasing static depth, so every
//! ancestor a handler refers to has a smaller id.
//!
//! # Frame access
//!
//! - A **static function** keeps a static link to its parent's frame at
//!   `OnStack(0)`. Reaching a frame `k` levels up reads that slot `k` times,
//!   starting from `rbp`. The chain stops at the nearest enclosing closure,
//!   whose own captured variables are then read through its environment.
//! - A **closure** keeps a link to its environment at `OnStack(0)` instead.
//!   Captured variables sit in that record at `index * WORD_SIZE`, in
//!   ascending variable order. A closure never reaches another frame.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use caco_analysis::{
    AnalysisError, AnalyzedFunction, ClosureClassification, EscapeAnalysis, FunctionAnalysis,
    LambdaKind,
};
use caco_ir::{
    Ast, CfgNode, DefId, ExprId, ExprKind, HardwareRegister, LValue, Register, StackSpace,
    StringInterner, TypeCheckResult, TypeId, TypePool, VarId, Variable, VariableArena,
    VariablesMap, VirtualRegister, VirtualRegisters, WORD_SIZE,
};

use crate::{CallConvention, FrameAllocator, FrameError, Layout, VariableAllocation};

/// Index of a [`CallableHandler`] in [`CallableHandlers`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HandlerId(u32);

impl HandlerId {
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

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

/// A variable read through a closure's environment record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CapturedVariable {
    pub var: VarId,
    /// Byte offset inside the environment record.
    pub offset: i64,
    /// The record holds a pointer to the variable's heap cell rather than
    /// the value itself.
    pub indirect: bool,
    pub holds_reference: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    StaticFunction {
        /// Lexical ancestors reachable through the static link, nearest
        /// first. Ends at the nearest enclosing closure, if any.
        ancestors: Vec<HandlerId>,
    },
    Closure {
        /// Captured variables in ascending variable order.
        captured: Vec<CapturedVariable>,
    },
}

/// Frame layout and access rules of one lambda.
#[derive(Debug)]
pub struct CallableHandler {
    id: HandlerId,
    lambda: ExprId,
    name: Option<DefId>,
    label: String,
    static_depth: u32,
    kind: HandlerKind,
    frame: FrameAllocator,
    /// Static link or closure link, always at `OnStack(0)`.
    link: VarId,
    params: Vec<VarId>,
    /// Flattened parameters in argument order (link excluded).
    flat_params: Vec<VarId>,
    /// Heap-indirected primitive and the stack slot variable pointing at
    /// its cell, in ascending variable order.
    heap_pointers: Vec<(VarId, VarId)>,
    result_layout: Layout,
    preserved: SmallVec<[(HardwareRegister, VirtualRegister); 5]>,
}

impl CallableHandler {
    #[inline]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    #[inline]
    pub fn lambda(&self) -> ExprId {
        self.lambda
    }

    /// Definition binding the lambda to a name, for named functions.
    pub fn name(&self) -> Option<DefId> {
        self.name
    }

    /// Code label of the lambda's body.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn static_depth(&self) -> u32 {
        self.static_depth
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    pub fn is_closure(&self) -> bool {
        matches!(self.kind, HandlerKind::Closure { .. })
    }

    pub fn is_static(&self) -> bool {
        matches!(self.kind, HandlerKind::StaticFunction { .. })
    }

    /// Static link or closure link variable.
    pub fn link(&self) -> VarId {
        self.link
    }

    /// Handlers reachable through the static link, nearest first. Empty for
    /// closures.
    pub fn ancestors(&self) -> &[HandlerId] {
        match &self.kind {
            HandlerKind::StaticFunction { ancestors } => ancestors,
            HandlerKind::Closure { .. } => &[],
        }
    }

    /// Immediate lexical parent, for static functions.
    pub fn parent(&self) -> Option<HandlerId> {
        self.ancestors().first().copied()
    }

    pub fn params(&self) -> &[VarId] {
        &self.params
    }

    /// Declared parameter count.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Flattened parameters followed by the link.
    pub fn flattened_arguments(&self) -> Vec<VarId> {
        let mut args = self.flat_params.clone();
        args.push(self.link);
        args
    }

    /// Number of words the convention passes in, link included.
    pub fn argument_count(&self) -> usize {
        self.flat_params.len() + 1
    }

    pub fn frame(&self) -> &FrameAllocator {
        &self.frame
    }

    pub fn get_variable_allocation(&self, var: VarId) -> Result<&VariableAllocation, FrameError> {
        self.frame
            .get_variable_allocation(var)
            .ok_or_else(|| FrameError::VariableAccess {
                function: self.label.clone(),
                variable: var,
            })
    }

    pub fn has_variable_allocation(&self, var: VarId) -> bool {
        self.frame.has_variable_allocation(var)
    }

    pub fn register_variable_allocation(
        &mut self,
        arena: &VariableArena,
        var: VarId,
        allocation: VariableAllocation,
    ) {
        self.frame.register_variable_allocation(arena, var, allocation);
    }

    pub fn allocate_frame_variable(&mut self, arena: &VariableArena, var: VarId) -> LValue {
        self.frame.allocate_frame_variable(arena, var)
    }

    /// The frame's size in bytes, evaluated when read.
    pub fn stack_space(&self) -> StackSpace {
        self.frame.stack_space()
    }

    /// Stack offsets holding references.
    pub fn reference_accesses(&self) -> &[i64] {
        self.frame.reference_offsets()
    }

    /// Virtual registers the body leaves its result in.
    pub fn result_layout(&self) -> &Layout {
        &self.result_layout
    }

    pub fn result_size(&self) -> usize {
        self.result_layout.size()
    }

    /// Captured variables and their environment offsets. Empty for static
    /// functions.
    pub fn captured_offsets(&self) -> Vec<(VarId, i64)> {
        match &self.kind {
            HandlerKind::Closure { captured } => {
                captured.iter().map(|c| (c.var, c.offset)).collect()
            }
            HandlerKind::StaticFunction { .. } => Vec::new(),
        }
    }

    fn captured(&self, var: VarId) -> Option<&CapturedVariable> {
        match &self.kind {
            HandlerKind::Closure { captured } => captured.iter().find(|c| c.var == var),
            HandlerKind::StaticFunction { .. } => None,
        }
    }

    /// Stack variable holding the heap cell address of `var`.
    pub fn heap_pointer(&self, var: VarId) -> Option<VarId> {
        self.heap_pointers
            .iter()
            .find(|&&(heap_var, _)| heap_var == var)
            .map(|&(_, pointer)| pointer)
    }

    pub fn heap_pointers(&self) -> &[(VarId, VarId)] {
        &self.heap_pointers
    }

    pub(crate) fn preserved_registers(&self) -> &[(HardwareRegister, VirtualRegister)] {
        &self.preserved
    }

    /// Access to a variable of this frame, given this frame's base.
    ///
    /// Register allocations are only visible from the frame itself.
    fn access_in_frame(
        &self,
        var: VarId,
        frame_pointer: &CfgNode,
        own_frame: bool,
    ) -> Option<LValue> {
        let allocation = self.frame.get_variable_allocation(var)?;
        if allocation.is_in_register() && !own_frame {
            return None;
        }
        self.frame.access(var, frame_pointer)
    }

    /// Access to a captured variable through the environment link of the
    /// frame based at `frame_pointer`.
    fn access_captured(&self, var: VarId, frame_pointer: &CfgNode) -> Option<LValue> {
        let captured = self.captured(var)?;
        let link = self.frame.get_variable_allocation(self.link)?;
        let slot = VariableAllocation::via_pointer(link.clone(), captured.offset);
        if captured.indirect {
            let cell = slot.wrap(frame_pointer, true);
            Some(LValue::memory(
                CfgNode::add(cell.into_node(), CfgNode::known(0)),
                captured.holds_reference,
            ))
        } else {
            Some(slot.wrap(frame_pointer, captured.holds_reference))
        }
    }
}

fn rbp() -> CfgNode {
    CfgNode::hardware(HardwareRegister::Rbp)
}

/// `depth` reads of the static link, starting at the current frame.
fn traverse_static_link(depth: usize) -> CfgNode {
    (0..depth).fold(rbp(), |frame, _| CfgNode::MemoryAccess {
        address: Box::new(frame),
        holds_reference: false,
    })
}

/// Options that shape generated frames and call sites.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameOptions {
    /// Emit the dynamic 16-byte alignment sequence around calls the
    /// handlers generate themselves.
    pub align_calls: bool,
    /// Runtime routine returning a fresh heap cell; takes the cell size.
    pub heap_cell_allocator: String,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            align_calls: true,
            heap_cell_allocator: "alloc_cell".to_owned(),
        }
    }
}

/// Every handler of a compilation unit.
pub struct CallableHandlers {
    handlers: Vec<CallableHandler>,
    by_lambda: FxHashMap<ExprId, HandlerId>,
    convention: Box<dyn CallConvention>,
    options: FrameOptions,
}

impl CallableHandlers {
    /// # Panics
    /// Panics if `id` was not produced by this arena.
    #[inline]
    pub fn get(&self, id: HandlerId) -> &CallableHandler {
        &self.handlers[id.index()]
    }

    /// # Panics
    /// Panics if `id` was not produced by this arena.
    #[inline]
    pub fn get_mut(&mut self, id: HandlerId) -> &mut CallableHandler {
        &mut self.handlers[id.index()]
    }

    pub fn lookup(&self, lambda: ExprId) -> Option<HandlerId> {
        self.by_lambda.get(&lambda).copied()
    }

    pub fn handler_for(&self, lambda: ExprId) -> Result<&CallableHandler, FrameError> {
        self.lookup(lambda)
            .map(|id| self.get(id))
            .ok_or(FrameError::MissingHandler(lambda))
    }

    /// Handlers in construction order.
    pub fn iter(&self) -> impl Iterator<Item = &CallableHandler> + '_ {
        self.handlers.iter()
    }

    pub fn static_functions(&self) -> impl Iterator<Item = &CallableHandler> + '_ {
        self.handlers.iter().filter(|h| h.is_static())
    }

    pub fn closures(&self) -> impl Iterator<Item = &CallableHandler> + '_ {
        self.handlers.iter().filter(|h| h.is_closure())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn convention(&self) -> &dyn CallConvention {
        self.convention.as_ref()
    }

    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    /// Base of `target`'s frame, as seen from inside `from`.
    pub fn generate_access_to_frame_pointer(
        &self,
        from: HandlerId,
        target: HandlerId,
    ) -> Result<CfgNode, FrameError> {
        if from == target {
            return Ok(rbp());
        }
        let handler = self.get(from);
        handler
            .ancestors()
            .iter()
            .position(|&ancestor| ancestor == target)
            .map(|position| traverse_static_link(position + 1))
            .ok_or_else(|| FrameError::FramePointerAccess {
                function: handler.label.clone(),
                target: self.get(target).label.clone(),
            })
    }

    /// Lvalue for a primitive variable, as seen from inside `from`.
    pub fn generate_variable_access(&self, from: HandlerId, var: VarId) -> Result<LValue, FrameError> {
        let handler = self.get(from);
        let here = rbp();
        if let Some(access) = handler
            .access_in_frame(var, &here, true)
            .or_else(|| handler.access_captured(var, &here))
        {
            return Ok(access);
        }

        for (position, &ancestor) in handler.ancestors().iter().enumerate() {
            let ancestor = self.get(ancestor);
            let frame_pointer = traverse_static_link(position + 1);
            if ancestor.has_variable_allocation(var) {
                if let Some(access) = ancestor.access_in_frame(var, &frame_pointer, false) {
                    return Ok(access);
                }
                break;
            }
            if let Some(access) = ancestor.access_captured(var, &frame_pointer) {
                return Ok(access);
            }
        }

        Err(FrameError::VariableAccess {
            function: handler.label.clone(),
            variable: var,
        })
    }

    /// Layout of a (possibly composite) variable, as seen from inside `from`.
    pub fn variable_layout(
        &self,
        from: HandlerId,
        arena: &VariableArena,
        var: VarId,
    ) -> Result<Layout, FrameError> {
        match arena.get(var) {
            Variable::Primitive { .. } | Variable::Heap => {
                Ok(Layout::Simple(self.generate_variable_access(from, var)?.into_node()))
            }
            Variable::Struct { fields } => fields
                .iter()
                .map(|&(name, field)| Ok((name, self.variable_layout(from, arena, field)?)))
                .collect::<Result<Vec<_>, FrameError>>()
                .map(Layout::Struct),
            Variable::Function { code, link } => Ok(Layout::Function {
                code: self.generate_variable_access(from, *code)?.into_node(),
                link: self.generate_variable_access(from, *link)?.into_node(),
            }),
        }
    }

    /// The link argument `caller` passes when calling the static function
    /// `callee`: its own frame if it is the callee's parent, otherwise the
    /// parent's frame reached through the caller's static link chain.
    pub fn static_link_for_call(&self, caller: HandlerId, callee: HandlerId) -> Result<CfgNode, FrameError> {
        match self.get(callee).parent() {
            Some(parent) if parent != caller => {
                self.generate_access_to_frame_pointer(caller, parent)
            }
            _ => Ok(rbp()),
        }
    }
}

/// Everything handler construction reads from earlier passes.
#[derive(Copy, Clone)]
pub struct HandlerInput<'a> {
    pub ast: &'a Ast,
    pub types: &'a TypeCheckResult,
    pub pool: &'a TypePool,
    pub interner: &'a StringInterner,
    pub vars: &'a VariablesMap,
    pub functions: &'a FunctionAnalysis,
    pub escapes: &'a EscapeAnalysis,
    pub classification: &'a ClosureClassification,
}

/// Build the handler of every analyzed lambda, ancestors first.
pub fn generate_handlers(
    input: HandlerInput<'_>,
    arena: &mut VariableArena,
    regs: &mut VirtualRegisters,
    convention: Box<dyn CallConvention>,
    options: FrameOptions,
) -> Result<CallableHandlers, FrameError> {
    let mut handlers = CallableHandlers {
        handlers: Vec::with_capacity(input.functions.len()),
        by_lambda: FxHashMap::default(),
        convention,
        options,
    };
    let mut labels = FxHashSet::default();

    for lambda in input.functions.lambdas_by_depth() {
        let function = input.functions.function(lambda)?;
        let kind = input
            .classification
            .kind(lambda)
            .ok_or(AnalysisError::UnknownLambda(lambda))?;
        let id = next_handler_id(handlers.handlers.len())?;

        let kind = match kind {
            LambdaKind::StaticFunction => HandlerKind::StaticFunction {
                ancestors: static_ancestors(input.functions, &handlers, lambda)?,
            },
            LambdaKind::Closure => HandlerKind::Closure {
                captured: captured_variables(function, input.escapes, arena),
            },
        };

        let label = function_label(input, function, &mut labels);
        let handler = build_handler(input, arena, regs, handlers.convention(), id, function, kind, label)?;
        tracing::debug!(
            handler = id.raw(),
            label = %handler.label,
            closure = handler.is_closure(),
            depth = handler.static_depth,
            stack_space = handler.stack_space().get(),
            "built callable handler"
        );
        handlers.by_lambda.insert(lambda, id);
        handlers.handlers.push(handler);
    }

    tracing::debug!(
        handlers = handlers.len(),
        closures = handlers.closures().count(),
        "callable handlers generated"
    );
    Ok(handlers)
}

/// Ancestor handlers reachable through a static link, nearest first.
fn static_ancestors(
    functions: &FunctionAnalysis,
    handlers: &CallableHandlers,
    lambda: ExprId,
) -> Result<Vec<HandlerId>, FrameError> {
    let mut ancestors = Vec::new();
    for ancestor in functions.ancestors(lambda) {
        let id = handlers
            .lookup(ancestor)
            .ok_or(FrameError::ConstructionOrder { lambda, ancestor })?;
        ancestors.push(id);
        if handlers.get(id).is_closure() {
            break;
        }
    }
    Ok(ancestors)
}

fn captured_variables(
    function: &AnalyzedFunction,
    escapes: &EscapeAnalysis,
    arena: &VariableArena,
) -> Vec<CapturedVariable> {
    function
        .outer_variables()
        .into_iter()
        .filter(|&var| arena.is_primitive(var))
        .zip((0..).map(|index: i64| index * WORD_SIZE))
        .map(|(var, offset)| CapturedVariable {
            var,
            offset,
            indirect: escapes.escapes(var),
            holds_reference: arena.holds_reference(var),
        })
        .collect()
}

fn function_label(
    input: HandlerInput<'_>,
    function: &AnalyzedFunction,
    taken: &mut FxHashSet<String>,
) -> String {
    let base = match function.name {
        Some(def) => input.interner.lookup(input.ast.arena.def(def).name).to_string(),
        None => format!("lambda_{}", function.lambda.raw()),
    };
    let label = if taken.contains(&base) {
        format!("{base}_{}", function.lambda.raw())
    } else {
        base
    };
    taken.insert(label.clone());
    label
}

/// Id of the handler pushed after `built` others.
fn next_handler_id(built: usize) -> Result<HandlerId, FrameError> {
    u32::try_from(built)
        .map(HandlerId::new)
        .map_err(|_| FrameError::TooManyHandlers { count: built })
}

#[expect(
    clippy::too_many_arguments,
    reason = "construction reads every earlier pass plus the handler's identity"
)]
fn build_handler(
    input: HandlerInput<'_>,
    arena: &mut VariableArena,
    regs: &mut VirtualRegisters,
    convention: &dyn CallConvention,
    id: HandlerId,
    function: &AnalyzedFunction,
    kind: HandlerKind,
    label: String,
) -> Result<CallableHandler, FrameError> {
    let lambda = function.lambda;
    let params = match input.ast.expr(lambda) {
        ExprKind::Lambda { params, .. } => params
            .iter()
            .map(|&def| {
                input
                    .vars
                    .definition(def)
                    .ok_or(AnalysisError::MissingVariable(def))
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(AnalysisError::UnknownLambda(lambda).into()),
    };
    let flat_params = params.iter().flat_map(|&param| arena.primitives(param)).collect();

    let is_closure = matches!(kind, HandlerKind::Closure { .. });
    let link = if is_closure {
        arena.labeled_primitive("cl", true)
    } else {
        arena.labeled_primitive("sl", false)
    };

    let mut frame = FrameAllocator::new();
    // The link comes first so its offset never depends on other variables.
    frame.register_variable_allocation(arena, link, VariableAllocation::OnStack(0));

    let mut heap_pointers = Vec::new();
    for var in function.declared_variables() {
        if !arena.is_primitive(var) {
            continue;
        }
        if input.escapes.escapes(var) {
            let pointer = arena.labeled_primitive("ptr", true);
            frame.allocate_frame_variable(arena, pointer);
            if let Some(pointer_allocation) = frame.get_variable_allocation(pointer).cloned() {
                frame.register_variable_allocation(
                    arena,
                    var,
                    VariableAllocation::via_pointer(pointer_allocation, 0),
                );
            }
            heap_pointers.push((var, pointer));
        } else if function.variables_used_in_nested.contains(&var) {
            frame.allocate_frame_variable(arena, var);
        } else {
            let register = regs.fresh(arena.holds_reference(var));
            frame.register_variable_allocation(
                arena,
                var,
                VariableAllocation::InRegister(Register::Virtual(register)),
            );
        }
    }

    let lambda_type = input
        .types
        .expr_type(lambda)
        .ok_or(AnalysisError::MissingType(lambda))?;
    let result_type = input.pool.function_result(lambda_type).unwrap_or(TypeId::UNIT);
    let result_layout = Layout::of_virtual_registers(input.pool, result_type, regs);

    let preserved = convention
        .preserved_registers()
        .iter()
        .map(|&register| (register, regs.fresh(false)))
        .collect();

    Ok(CallableHandler {
        id,
        lambda,
        name: function.name,
        label,
        static_depth: function.static_depth,
        kind,
        frame,
        link,
        params,
        flat_params,
        heap_pointers,
        result_layout,
        preserved,
    })
}
