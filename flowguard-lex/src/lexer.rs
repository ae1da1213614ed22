#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use flowguard_ast::{span_between, Span};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(flowguard::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
enum RawToken {
    #[token("function")]
    KwFunction,
    #[token("return")]
    KwReturn,
    #[token("var")]
    KwVar,
    #[token("let")]
    KwLet,
    #[token("const")]
    KwConst,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("for")]
    KwFor,
    #[token("while")]
    KwWhile,
    #[token("in")]
    KwIn,
    #[token("instanceof")]
    KwInstanceof,
    #[token("typeof")]
    KwTypeof,
    #[token("void")]
    KwVoid,
    #[token("new")]
    KwNew,
    #[token("null")]
    KwNull,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,
    #[token("this")]
    KwThis,
    #[token("class")]
    KwClass,
    #[token("throw")]
    KwThrow,
    #[token("break")]
    KwBreak,
    #[token("continue")]
    KwContinue,

    #[token("=>")]
    FatArrow,
    #[token("...")]
    Ellipsis,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,

    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NeqEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("=")]
    Eq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("|")]
    Pipe,
    #[token("&")]
    Amp,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[regex(r"0[xX][0-9a-fA-F]+", |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok().map(|n| n as f64))]
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(Option<f64>),

    // Supported escapes: \n, \t, \r, \0, \', \", \\ and \uXXXX.
    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, parse_string)]
    String(Option<String>),

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    let inner = &s[1..s.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let esc = chars.next()?;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '\\' => out.push('\\'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let cp = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(cp)?);
            }
            _ => return None,
        }
    }

    Some(out)
}

/// Scans the body of a regex literal after its opening `/`. Returns the
/// pattern, the flags and the number of bytes consumed.
fn scan_regex(rest: &str) -> Option<(String, String, usize)> {
    let mut in_class = false;
    let mut escaped = false;
    let mut end = None;
    for (i, ch) in rest.char_indices() {
        if ch == '\n' {
            return None;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }
    let end = end?;
    let pattern = rest[..end].to_string();
    let flags: String = rest[end + 1..]
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let consumed = end + 1 + flags.len();
    Some((pattern, flags, consumed))
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut lex = RawToken::lexer(self.src);
        let mut prev_end = 0usize;

        while let Some(raw) = lex.next() {
            let start = lex.span().start;

            let kind = match raw {
                Ok(RawToken::KwFunction) => TokenKind::KwFunction,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,
                Ok(RawToken::KwVar) => TokenKind::KwVar,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwConst) => TokenKind::KwConst,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwFor) => TokenKind::KwFor,
                Ok(RawToken::KwWhile) => TokenKind::KwWhile,
                Ok(RawToken::KwIn) => TokenKind::KwIn,
                Ok(RawToken::KwInstanceof) => TokenKind::KwInstanceof,
                Ok(RawToken::KwTypeof) => TokenKind::KwTypeof,
                Ok(RawToken::KwVoid) => TokenKind::KwVoid,
                Ok(RawToken::KwNew) => TokenKind::KwNew,
                Ok(RawToken::KwNull) => TokenKind::KwNull,
                Ok(RawToken::KwTrue) => TokenKind::KwTrue,
                Ok(RawToken::KwFalse) => TokenKind::KwFalse,
                Ok(RawToken::KwThis) => TokenKind::KwThis,
                Ok(RawToken::KwClass) => TokenKind::KwClass,
                Ok(RawToken::KwThrow) => TokenKind::KwThrow,
                Ok(RawToken::KwBreak) => TokenKind::KwBreak,
                Ok(RawToken::KwContinue) => TokenKind::KwContinue,

                Ok(RawToken::FatArrow) => TokenKind::FatArrow,
                Ok(RawToken::Ellipsis) => TokenKind::Ellipsis,
                Ok(RawToken::Dot) => TokenKind::Dot,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::Question) => TokenKind::Question,

                Ok(RawToken::EqEqEq) => TokenKind::EqEqEq,
                Ok(RawToken::NeqEq) => TokenKind::NeqEq,
                Ok(RawToken::EqEq) => TokenKind::EqEq,
                Ok(RawToken::Neq) => TokenKind::Neq,
                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Ge) => TokenKind::Ge,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Gt) => TokenKind::Gt,

                Ok(RawToken::PlusPlus) => TokenKind::PlusPlus,
                Ok(RawToken::MinusMinus) => TokenKind::MinusMinus,
                Ok(RawToken::PlusEq) => TokenKind::PlusEq,
                Ok(RawToken::MinusEq) => TokenKind::MinusEq,
                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::Percent) => TokenKind::Percent,
                Ok(RawToken::Slash) => {
                    let operand_ended = tokens.last().is_some_and(|t| t.kind.ends_operand());
                    if operand_ended {
                        TokenKind::Slash
                    } else {
                        let Some((pattern, flags, consumed)) = scan_regex(lex.remainder()) else {
                            return Err(LexError {
                                message: "unterminated regular expression literal".to_string(),
                                span: span_between(start, lex.span().end),
                            });
                        };
                        lex.bump(consumed);
                        TokenKind::Regex { pattern, flags }
                    }
                }

                Ok(RawToken::AndAnd) => TokenKind::AndAnd,
                Ok(RawToken::OrOr) => TokenKind::OrOr,
                Ok(RawToken::Bang) => TokenKind::Bang,
                Ok(RawToken::Pipe) => TokenKind::Pipe,
                Ok(RawToken::Amp) => TokenKind::Amp,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,

                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),
                Ok(RawToken::Number(Some(n))) => TokenKind::Number(n),
                Ok(RawToken::Number(None)) => {
                    return Err(LexError {
                        message: "invalid number literal".to_string(),
                        span: span_between(start, lex.span().end),
                    });
                }
                Ok(RawToken::String(Some(s))) => TokenKind::String(s),
                Ok(RawToken::String(None)) => {
                    return Err(LexError {
                        message: "invalid string literal".to_string(),
                        span: span_between(start, lex.span().end),
                    });
                }

                Err(_) => {
                    return Err(LexError {
                        message: "unexpected token".to_string(),
                        span: span_between(start, lex.span().end),
                    });
                }
            };

            let end = lex.span().end;
            let newline_before = self.src[prev_end..start].contains('\n');
            tokens.push(Token {
                kind,
                span: span_between(start, end),
                newline_before,
            });
            prev_end = end;
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(self.src.len(), self.src.len()),
            newline_before: self.src[prev_end..].contains('\n'),
        });

        Ok(tokens)
    }
}
