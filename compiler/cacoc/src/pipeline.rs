//! The closure conversion pipeline.
//!
//! `convert_closures` runs every analysis in order and builds the handler
//! arena. The returned [`ClosureConversion`] is what body lowering talks to:
//! variable accesses, prologues, epilogues and call sites, keyed by the
//! expressions and definitions lowering already has at hand.

use caco_analysis::{
    analyze_escapes, analyze_functions, build_call_graph, build_variables_map, classify_closures,
    CallGraph, ClosureClassification, EscapeAnalysis, EscapeInput, FunctionAnalysis,
};
use caco_frame::{
    generate_call, generate_call_from, generate_handlers, CallableHandler, CallableHandlers,
    Callee, HandlerId, HandlerInput, Layout,
};
use caco_ir::{CfgNode, DefId, ExprId, LValue, Program, VarId, VariableArena, VariablesMap, VirtualRegisters};

use crate::{BackendConfig, CompileError};

/// Everything closure conversion learned about one program.
pub struct ClosureConversion {
    arena: VariableArena,
    vars: VariablesMap,
    call_graph: CallGraph,
    functions: FunctionAnalysis,
    escapes: EscapeAnalysis,
    classification: ClosureClassification,
    handlers: CallableHandlers,
    regs: VirtualRegisters,
}

/// Analyze `program` and build a handler for every lambda in it.
#[tracing::instrument(level = "debug", skip_all)]
pub fn convert_closures(
    program: &Program,
    config: &BackendConfig,
) -> Result<ClosureConversion, CompileError> {
    let mut arena = VariableArena::new();
    let vars = build_variables_map(
        &program.ast,
        &program.names,
        &program.types,
        &program.pool,
        &mut arena,
    )?;
    let call_graph = build_call_graph(&program.ast, &program.names);
    let functions = analyze_functions(&program.ast, &vars, &arena, &call_graph)?;
    let escapes = analyze_escapes(EscapeInput {
        ast: &program.ast,
        names: &program.names,
        types: &program.types,
        pool: &program.pool,
        vars: &vars,
        arena: &arena,
        functions: &functions,
    })?;
    let classification = classify_closures(&functions, &escapes, &vars);

    let mut regs = VirtualRegisters::new();
    let handlers = generate_handlers(
        HandlerInput {
            ast: &program.ast,
            types: &program.types,
            pool: &program.pool,
            interner: &program.interner,
            vars: &vars,
            functions: &functions,
            escapes: &escapes,
            classification: &classification,
        },
        &mut arena,
        &mut regs,
        config.call_convention.convention(),
        config.frame_options(),
    )?;

    tracing::debug!(
        lambdas = functions.len(),
        variables = arena.len(),
        escaping = escapes.escaping_variables().len(),
        closures = handlers.closures().count(),
        escape_iterations = escapes.iterations(),
        "closure conversion finished"
    );

    Ok(ClosureConversion {
        arena,
        vars,
        call_graph,
        functions,
        escapes,
        classification,
        handlers,
        regs,
    })
}

impl ClosureConversion {
    pub fn arena(&self) -> &VariableArena {
        &self.arena
    }

    pub fn variables(&self) -> &VariablesMap {
        &self.vars
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    pub fn functions(&self) -> &FunctionAnalysis {
        &self.functions
    }

    pub fn escapes(&self) -> &EscapeAnalysis {
        &self.escapes
    }

    pub fn classification(&self) -> &ClosureClassification {
        &self.classification
    }

    pub fn handlers(&self) -> &CallableHandlers {
        &self.handlers
    }

    /// Virtual registers handed out so far; lowering continues from here.
    pub fn registers_mut(&mut self) -> &mut VirtualRegisters {
        &mut self.regs
    }

    pub fn variable(&self, def: DefId) -> Result<VarId, CompileError> {
        self.vars
            .definition(def)
            .ok_or(CompileError::UnknownDefinition(def))
    }

    fn handler_id(&self, lambda: ExprId) -> Result<HandlerId, CompileError> {
        self.handlers
            .lookup(lambda)
            .ok_or(CompileError::UnknownLambda(lambda))
    }

    pub fn handler(&self, lambda: ExprId) -> Result<&CallableHandler, CompileError> {
        Ok(self.handlers.handler_for(lambda)?)
    }

    /// Lvalue for the variable defined by `def`, as seen from inside `lambda`.
    pub fn variable_access(&self, lambda: ExprId, def: DefId) -> Result<LValue, CompileError> {
        let from = self.handler_id(lambda)?;
        let var = self.variable(def)?;
        Ok(self.handlers.generate_variable_access(from, var)?)
    }

    /// Base pointer of `target`'s frame, as seen from inside `lambda`.
    pub fn frame_pointer(&self, lambda: ExprId, target: ExprId) -> Result<CfgNode, CompileError> {
        let from = self.handler_id(lambda)?;
        let target = self.handler_id(target)?;
        Ok(self.handlers.generate_access_to_frame_pointer(from, target)?)
    }

    /// A fresh stack slot in `lambda`'s frame for a spilled register.
    ///
    /// Prologues already generated observe the larger frame.
    pub fn spill_slot(&mut self, lambda: ExprId, holds_reference: bool) -> Result<LValue, CompileError> {
        let id = self.handler_id(lambda)?;
        let var = self.arena.labeled_primitive("spill", holds_reference);
        Ok(self.handlers.get_mut(id).allocate_frame_variable(&self.arena, var))
    }

    pub fn prologue(&mut self, lambda: ExprId) -> Result<Vec<CfgNode>, CompileError> {
        let id = self.handler_id(lambda)?;
        Ok(self.handlers.generate_prologue(id, &mut self.regs)?)
    }

    pub fn epilogue(&self, lambda: ExprId) -> Result<Vec<CfgNode>, CompileError> {
        let id = self.handler_id(lambda)?;
        Ok(self.handlers.generate_epilogue(id))
    }

    /// Direct call from inside `caller` to the static function `callee`.
    pub fn call(
        &mut self,
        caller: ExprId,
        callee: ExprId,
        arguments: &[Layout],
        result: Option<&Layout>,
    ) -> Result<Vec<CfgNode>, CompileError> {
        let caller = self.handler_id(caller)?;
        let callee = self.handler_id(callee)?;
        Ok(generate_call_from(
            &self.handlers,
            caller,
            callee,
            arguments,
            result,
            &mut self.regs,
        )?)
    }

    /// Call through a function value: its code address and link are read
    /// from `value`, which must be a [`Layout::Function`].
    pub fn call_value(
        &mut self,
        name: &str,
        value: &Layout,
        arity: usize,
        arguments: &[Layout],
        result: Option<&Layout>,
    ) -> Result<Vec<CfgNode>, CompileError> {
        let result_size = result.map_or(1, Layout::size);
        let callee = Callee::function_value(name, value, arity, result_size)
            .ok_or_else(|| CompileError::NotAFunctionValue(name.to_owned()))?;
        Ok(generate_call(
            self.handlers.convention(),
            &callee,
            arguments,
            result,
            self.handlers.options().align_calls,
            &mut self.regs,
        )?)
    }
}
