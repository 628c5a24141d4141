//! Compiler for Compiscript, a small dynamically flavoured scripting
//! language, down to MIPS assembly.
//!
//! The pipeline is linear: a lexical pre-pass, the chumsky grammar, the
//! semantic checker (which builds the symbol table), quadruple IR lowering,
//! then code generation with register and address descriptors.

pub mod analysis;
pub mod backend;
pub mod error;
pub mod frontend;
pub mod ir;

use crate::error::{CompileError, ErrorKind, InternalError};

/// Result of one compilation. User errors are collected here; only
/// compiler bugs come back as `Err`.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub had_errors: bool,
    pub errors: Vec<CompileError>,
    pub ir: Option<String>,
    pub assembly: Option<String>,
}

impl CompileOutput {
    fn failed(errors: Vec<CompileError>) -> Self {
        Self {
            had_errors: true,
            errors,
            ..Self::default()
        }
    }
}

pub fn compile(source: &str) -> Result<CompileOutput, InternalError> {
    let cleaned = match frontend::lexer::scan(source) {
        Ok(cleaned) => cleaned,
        Err(errors) => return Ok(CompileOutput::failed(errors)),
    };

    let program = match frontend::parser::parse(&cleaned) {
        Ok(program) => program,
        Err(errors) => return Ok(CompileOutput::failed(errors)),
    };
    log::debug!("parsed {} top-level statement(s)", program.statements.len());

    let mut analysis = match analysis::semantic::check(&program) {
        Ok(analysis) => analysis,
        Err(diagnostics) => {
            let errors = diagnostics
                .into_iter()
                .map(|d| CompileError::new(ErrorKind::Semantic, d.error.to_string(), source, d.span))
                .collect();
            return Ok(CompileOutput::failed(errors));
        }
    };

    let code = ir::lower::lower(&program, &mut analysis)?;
    log::debug!("lowered to {} instruction(s)", code.len());
    let listing = code.render(&analysis.table).map_err(backend::CodegenError::from)?;
    let assembly = backend::generate(&code, &analysis.table)?;

    Ok(CompileOutput {
        had_errors: false,
        errors: Vec::new(),
        ir: Some(listing),
        assembly: Some(assembly),
    })
}

/// Only runs the front end and the semantic checker.
pub fn check(source: &str) -> Vec<CompileError> {
    let cleaned = match frontend::lexer::scan(source) {
        Ok(cleaned) => cleaned,
        Err(errors) => return errors,
    };
    let program = match frontend::parser::parse(&cleaned) {
        Ok(program) => program,
        Err(errors) => return errors,
    };
    match analysis::semantic::check(&program) {
        Ok(_) => Vec::new(),
        Err(diagnostics) => diagnostics
            .into_iter()
            .map(|d| CompileError::new(ErrorKind::Semantic, d.error.to_string(), source, d.span))
            .collect(),
    }
}
