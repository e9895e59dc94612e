//! Middle and back end of a compiler for the Tiger language.
//!
//! An AST is type checked and lowered to IR by [`middle::semant`], then
//! [`backend::mips32::codegen`] turns the IR into MIPS32 instructions over
//! temps, and [`backend::flow`] builds the control flow graph and liveness
//! sets a register allocator needs.

pub mod backend;
pub mod diagnostics;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

use crate::{
    backend::{
        flow::{FlowGraph, liveness::Liveness},
        mips32::{Program, codegen::CodeGenerator},
    },
    diagnostics::Diagnostics,
    error::InternalError,
    frontend::ast::Expression,
    middle::{ir::Ir, semant::Semant},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Record the IR listing as a diagnostics message
    pub dump_ir: bool,
    /// Record every basic block with its edges and live sets
    pub dump_flow: bool,
}

#[derive(Debug)]
pub struct Compilation {
    pub ir: Ir,
    pub program: Program,
    pub flow_graph: FlowGraph,
    pub liveness: Liveness,
}

/// Runs every phase on `expression`. Returns `Ok(None)` when the program has
/// semantic errors, which are left in `diagnostics`.
pub fn compile(
    expression: &Expression,
    options: &CompileOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Compilation>, InternalError> {
    let _span = tracing::debug_span!("compile").entered();

    let ir = Semant::new(diagnostics).translate(expression);
    if diagnostics.has_error() {
        tracing::debug!(
            errors = diagnostics.errors().len(),
            "semantic analysis failed"
        );
        return Ok(None);
    }

    if options.dump_ir {
        diagnostics.message(ir.to_string());
    }

    let program = CodeGenerator::new(&ir).generate()?;
    let flow_graph = FlowGraph::build(&program.instructions, &program.frames)?;
    let liveness = Liveness::analyze(&flow_graph);

    if options.dump_flow {
        diagnostics.message(flow_graph.describe(Some(&liveness)));
    }

    Ok(Some(Compilation {
        ir,
        program,
        flow_graph,
        liveness,
    }))
}
