use std::fmt;

use crate::backend::CodegenError;
use crate::frontend::ast::Span;
use crate::ir::lower::LowerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Semantic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Lexical => write!(f, "lexical"),
            ErrorKind::Syntax => write!(f, "syntax"),
            ErrorKind::Semantic => write!(f, "semantic"),
        }
    }
}

/// A user-facing error collected while compiling. Compilation keeps going
/// after one of these so that a single run reports as many as possible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error at {line}:{column}: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, source: &str, span: Span) -> Self {
        let (line, column) = line_column(source, span.start);
        Self {
            kind,
            message: message.into(),
            line,
            column,
        }
    }
}

/// Programmer bugs detected after analysis succeeded. These abort compilation.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("internal error during IR generation: {0}")]
    Lower(#[from] LowerError),

    #[error("internal error during code generation: {0}")]
    Codegen(#[from] CodegenError),
}

// 1-based line and column of a byte offset
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}
