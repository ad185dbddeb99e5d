//! Shared test utilities for the analysis passes.

use caco_ir::{DefId, ExprId, Program, ProgramBuilder, TypeId, VarId, VariableArena, VariablesMap};

use crate::{
    analyze_escapes, analyze_functions, build_call_graph, build_variables_map, classify_closures,
    CallGraph, ClosureClassification, EscapeAnalysis, EscapeInput, FunctionAnalysis,
};

/// Every analysis result for one program.
pub(crate) struct Analyzed {
    pub arena: VariableArena,
    pub vars: VariablesMap,
    pub call_graph: CallGraph,
    pub functions: FunctionAnalysis,
    pub escapes: EscapeAnalysis,
    pub classification: ClosureClassification,
}

impl Analyzed {
    /// Variable of a definition created through the builder.
    pub fn var(&self, def: DefId) -> VarId {
        self.vars.definition(def).expect("definition has a variable")
    }

    pub fn depth(&self, lambda: ExprId) -> u32 {
        self.functions
            .get(lambda)
            .expect("lambda was analyzed")
            .static_depth
    }
}

/// Run the whole analysis pipeline.
pub(crate) fn analyze(program: &Program) -> Analyzed {
    let mut arena = VariableArena::new();
    let vars = build_variables_map(
        &program.ast,
        &program.names,
        &program.types,
        &program.pool,
        &mut arena,
    )
    .expect("variables map");
    let call_graph = build_call_graph(&program.ast, &program.names);
    let functions =
        analyze_functions(&program.ast, &vars, &arena, &call_graph).expect("static structure");
    let escapes = analyze_escapes(EscapeInput {
        ast: &program.ast,
        names: &program.names,
        types: &program.types,
        pool: &program.pool,
        vars: &vars,
        arena: &arena,
        functions: &functions,
    })
    .expect("escape analysis");
    let classification = classify_closures(&functions, &escapes, &vars);
    Analyzed {
        arena,
        vars,
        call_graph,
        functions,
        escapes,
        classification,
    }
}

/// Named function `name` with an already built body.
///
/// Returns the function's definition, its lambda and the binding expression.
pub(crate) fn define(
    b: &mut ProgramBuilder,
    name: &str,
    params: Vec<DefId>,
    result: TypeId,
    body: ExprId,
) -> (DefId, ExprId, ExprId) {
    let def = b.function_name(name, &params, result);
    let lambda = b.lambda(params, result, body);
    let binding = b.function(def, lambda);
    (def, lambda, binding)
}
