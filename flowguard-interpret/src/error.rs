#![allow(unused_assignments)]

use flowguard_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, PartialEq)]
#[allow(unused_assignments)]
pub enum RuntimeError {
    /// A thrown value reached the top of the program.
    #[error("uncaught {name}: {message}")]
    #[diagnostic(code(flowguard::runtime::uncaught))]
    Uncaught { name: String, message: String },

    #[error("unsupported: {message}")]
    #[diagnostic(code(flowguard::runtime::unsupported))]
    Unsupported {
        message: String,
        #[label]
        span: Span,
    },
}

impl RuntimeError {
    /// True for a `TypeError` escaping the program, which is how a failed guard surfaces.
    pub fn is_type_error(&self) -> bool {
        matches!(self, RuntimeError::Uncaught { name, .. } if name == "TypeError")
    }
}
