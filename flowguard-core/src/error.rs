#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use flowguard_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum TransformError {
    /// Detected from source shape alone; aborts the whole unit.
    #[error("contract error: {message}")]
    #[diagnostic(code(flowguard::contract))]
    Contract {
        message: String,
        #[label]
        span: Span,
    },

    #[error("internal error: {message}")]
    #[diagnostic(code(flowguard::internal))]
    Internal {
        message: String,
        #[label]
        span: Span,
    },
}

impl TransformError {
    pub fn is_contract(&self) -> bool {
        matches!(self, TransformError::Contract { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            TransformError::Contract { message, .. } | TransformError::Internal { message, .. } => {
                message
            }
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TransformError::Contract { span, .. } | TransformError::Internal { span, .. } => *span,
        }
    }
}
