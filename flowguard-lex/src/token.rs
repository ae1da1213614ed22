#![forbid(unsafe_code)]

use flowguard_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwFunction,
    KwReturn,
    KwVar,
    KwLet,
    KwConst,
    KwIf,
    KwElse,
    KwFor,
    KwWhile,
    KwIn,
    KwInstanceof,
    KwTypeof,
    KwVoid,
    KwNew,
    KwNull,
    KwTrue,
    KwFalse,
    KwThis,
    KwClass,
    KwThrow,
    KwBreak,
    KwContinue,

    // Operators / punctuation
    FatArrow,
    Ellipsis,
    Dot,
    Comma,
    Semi,
    Colon,
    Question,

    Eq,
    EqEq,
    EqEqEq,
    Neq,
    NeqEq,
    Lt,
    Gt,
    Le,
    Ge,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,

    AndAnd,
    OrOr,
    Bang,
    Pipe,
    Amp,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,

    // Literals / identifiers
    Ident(String),
    Number(f64),
    String(String),
    Regex { pattern: String, flags: String },
}

impl TokenKind {
    /// Whether a `/` following this token starts a division rather than a regex.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Regex { .. }
                | TokenKind::KwThis
                | TokenKind::KwNull
                | TokenKind::KwTrue
                | TokenKind::KwFalse
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
        )
    }
}

impl TokenKind {
    /// Source text of keyword tokens, which may also appear as property names.
    pub fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            TokenKind::KwFunction => "function",
            TokenKind::KwReturn => "return",
            TokenKind::KwVar => "var",
            TokenKind::KwLet => "let",
            TokenKind::KwConst => "const",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwFor => "for",
            TokenKind::KwWhile => "while",
            TokenKind::KwIn => "in",
            TokenKind::KwInstanceof => "instanceof",
            TokenKind::KwTypeof => "typeof",
            TokenKind::KwVoid => "void",
            TokenKind::KwNew => "new",
            TokenKind::KwNull => "null",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwThis => "this",
            TokenKind::KwClass => "class",
            TokenKind::KwThrow => "throw",
            TokenKind::KwBreak => "break",
            TokenKind::KwContinue => "continue",
            _ => return None,
        })
    }
}
