#![forbid(unsafe_code)]

mod error;
mod fmt;
mod parser;

use flowguard_lex::Lexer;
use miette::IntoDiagnostic;

pub use error::ParseError;
pub use fmt::{emit_program, format_expr, format_number, format_program, format_type};
pub use parser::Parser;

pub fn parse_source(src: &str) -> miette::Result<flowguard_ast::Program> {
    let tokens = Lexer::new(src).lex().into_diagnostic()?;
    let mut parser = Parser::new(&tokens);
    parser.parse_program().into_diagnostic()
}

pub fn parse_expr(src: &str) -> miette::Result<flowguard_ast::Expr> {
    let tokens = Lexer::new(src).lex().into_diagnostic()?;
    let mut parser = Parser::new(&tokens);
    parser.parse_expr_eof().into_diagnostic()
}

pub fn parse_type(src: &str) -> miette::Result<flowguard_ast::TypeAnnotation> {
    let tokens = Lexer::new(src).lex().into_diagnostic()?;
    let mut parser = Parser::new(&tokens);
    parser.parse_type_eof().into_diagnostic()
}
