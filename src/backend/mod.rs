pub mod descriptors;
pub mod generator;
pub mod memory;
pub mod templates;

use crate::analysis::symbols::SymbolTable;
use crate::ir::InstrList;

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("no register left to allocate")]
    NoRegister,

    #[error("'{0}' was never given a memory slot")]
    Unplaced(String),

    #[error("malformed {0} instruction")]
    Malformed(&'static str),

    #[error("{0} outside of a function")]
    OutsideFunction(&'static str),

    #[error(transparent)]
    Format(#[from] std::fmt::Error),
}

/// Emits a complete MIPS program for the lowered instruction list.
pub fn generate(code: &InstrList, table: &SymbolTable) -> Result<String, CodegenError> {
    generator::Generator::new(table).generate(code)
}
