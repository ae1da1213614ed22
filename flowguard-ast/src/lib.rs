#![forbid(unsafe_code)]

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

pub fn join(a: Span, b: Span) -> Span {
    let a0: usize = a.offset();
    let b0: usize = b.offset();
    let a1 = a0 + a.len();
    let b1 = b0 + b.len();
    span_between(a0.min(b0), a1.max(b1))
}

pub type Ident = Spanned<String>;

pub fn ident(span: Span, name: impl Into<String>) -> Ident {
    Spanned::new(span, name.into())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Function(Function),
    Class(ClassDecl),
    TypeAlias(TypeAlias),
    VarDecl(VarDecl),
    Return(ReturnStmt),
    If(IfStmt),
    For(ForStmt),
    ForIn(ForInStmt),
    While(WhileStmt),
    Block(Block),
    Throw(ThrowStmt),
    Break(Span),
    Continue(Span),
    Expr(Expr),
    Empty(Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Function(x) => x.span,
            Stmt::Class(x) => x.span,
            Stmt::TypeAlias(x) => x.span,
            Stmt::VarDecl(x) => x.span,
            Stmt::Return(x) => x.span,
            Stmt::If(x) => x.span,
            Stmt::For(x) => x.span,
            Stmt::ForIn(x) => x.span,
            Stmt::While(x) => x.span,
            Stmt::Block(x) => x.span,
            Stmt::Throw(x) => x.span,
            Stmt::Break(s) | Stmt::Continue(s) | Stmt::Empty(s) => *s,
            Stmt::Expr(e) => e.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

/// A function declaration, function expression, arrow function or class method.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub span: Span,
    pub name: Option<Ident>,
    pub type_params: Vec<Ident>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeAnnotation>,
    pub body: FunctionBody,
    pub is_arrow: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FunctionBody {
    Block(Block),
    /// Concise arrow body: `(x) => x + 1`.
    Expr(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    /// `a?: T`
    pub optional: bool,
    /// `...rest`
    pub rest: bool,
    pub ty: Option<TypeAnnotation>,
    pub default: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub span: Span,
    pub name: Ident,
    pub properties: Vec<ClassProperty>,
    pub methods: Vec<ClassMethod>,
}

/// `x: T = value;` in a class body.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassProperty {
    pub span: Span,
    pub key: Ident,
    pub is_static: bool,
    pub ty: Option<TypeAnnotation>,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassMethod {
    pub span: Span,
    pub key: Ident,
    pub is_static: bool,
    pub function: Function,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAlias {
    pub span: Span,
    pub name: Ident,
    pub params: Vec<Ident>,
    pub target: TypeAnnotation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn keyword(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub span: Span,
    pub kind: VarKind,
    pub decls: Vec<Declarator>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declarator {
    pub span: Span,
    pub name: Ident,
    pub ty: Option<TypeAnnotation>,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub arg: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ForInit {
    Decl(VarDecl),
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub span: Span,
    pub init: Option<ForInit>,
    pub test: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Stmt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForInKind {
    In,
    Of,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ForBinding {
    Decl(VarDecl),
    Target(Ident),
}

/// `for (left in right)` and `for (left of right)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ForInStmt {
    pub span: Span,
    pub kind: ForInKind,
    pub left: ForBinding,
    pub right: Expr,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThrowStmt {
    pub span: Span,
    pub arg: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(Ident),
    This,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Regex {
        pattern: String,
        flags: String,
    },
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Function(Box<Function>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: Ident,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub span: Span,
    pub key: Spanned<String>,
    pub value: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,

    InstanceOf,
    In,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::LooseEq => "==",
            BinOp::LooseNe => "!=",
            BinOp::StrictEq => "===",
            BinOp::StrictNe => "!==",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::InstanceOf => "instanceof",
            BinOp::In => "in",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

/// Builders used by code that synthesizes new nodes. Every synthesized node
/// borrows the span of the source construct it was derived from.
impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    pub fn ident(span: Span, name: impl Into<String>) -> Self {
        Self::new(span, ExprKind::Ident(ident(span, name)))
    }

    pub fn string(span: Span, value: impl Into<String>) -> Self {
        Self::new(span, ExprKind::String(value.into()))
    }

    pub fn number(span: Span, value: f64) -> Self {
        Self::new(span, ExprKind::Number(value))
    }

    pub fn null(span: Span) -> Self {
        Self::new(span, ExprKind::Null)
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Self::new(
            expr.span,
            ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
        )
    }

    pub fn not(expr: Expr) -> Self {
        Self::unary(UnaryOp::Not, expr)
    }

    pub fn type_of(expr: Expr) -> Self {
        Self::unary(UnaryOp::TypeOf, expr)
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Self {
        Self::new(
            join(left.span, right.span),
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        )
    }

    pub fn logical(left: Expr, op: LogicalOp, right: Expr) -> Self {
        Self::new(
            join(left.span, right.span),
            ExprKind::Logical {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        )
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::logical(left, LogicalOp::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::logical(left, LogicalOp::Or, right)
    }

    pub fn conditional(test: Expr, consequent: Expr, alternate: Expr) -> Self {
        Self::new(
            test.span,
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        )
    }

    pub fn member(object: Expr, property: impl Into<String>) -> Self {
        let span = object.span;
        Self::new(
            span,
            ExprKind::Member {
                object: Box::new(object),
                property: ident(span, property),
            },
        )
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Self::new(
            object.span,
            ExprKind::Index {
                object: Box::new(object),
                index: Box::new(index),
            },
        )
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(
            callee.span,
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
        )
    }

    pub fn new_instance(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(
            callee.span,
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
        )
    }

    /// Dotted path `a.b.c` as nested member accesses.
    pub fn path(span: Span, segments: &[String]) -> Self {
        let mut iter = segments.iter();
        let first = iter.next().map(String::as_str).unwrap_or("undefined");
        let mut expr = Self::ident(span, first);
        for seg in iter {
            expr = Self::member(expr, seg.clone());
        }
        expr
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(id) => Some(id.node.as_str()),
            _ => None,
        }
    }

    /// `undefined`, `null` and `void <expr>` all evaluate to a nully value.
    pub fn is_nully(&self) -> bool {
        match &self.kind {
            ExprKind::Null => true,
            ExprKind::Ident(id) => id.node == "undefined",
            ExprKind::Unary {
                op: UnaryOp::Void, ..
            } => true,
            _ => false,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Null
                | ExprKind::Bool(_)
                | ExprKind::Number(_)
                | ExprKind::String(_)
                | ExprKind::Regex { .. }
        )
    }
}

impl Stmt {
    pub fn if_throw(test: Expr, error: Expr) -> Self {
        let span = test.span;
        Stmt::If(IfStmt {
            span,
            cond: test,
            then_branch: Box::new(Stmt::Throw(ThrowStmt { span, arg: error })),
            else_branch: None,
        })
    }

    pub fn into_block(self) -> Block {
        match self {
            Stmt::Block(b) => b,
            other => Block {
                span: other.span(),
                stmts: vec![other],
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAnnotation {
    pub span: Span,
    pub kind: TypeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    String,
    Number,
    Boolean,
    Symbol,
    Void,
    Null,
    Any,
    Mixed,
    /// `?T`
    Nullable(Box<TypeAnnotation>),
    Union(Vec<TypeAnnotation>),
    Intersection(Vec<TypeAnnotation>),
    /// `(T)`
    Parenthesized(Box<TypeAnnotation>),
    /// `Name`, `A.B`, `Name<Args>`
    Generic {
        name: Vec<Ident>,
        args: Vec<TypeAnnotation>,
    },
    Object(Vec<ObjectTypeProperty>),
    Tuple(Vec<TypeAnnotation>),
    /// `T[]`
    Array(Box<TypeAnnotation>),
    Function {
        params: Vec<FunctionTypeParam>,
        ret: Box<TypeAnnotation>,
    },
    /// `typeof x`
    Typeof(Ident),
}

impl TypeKind {
    /// Name of the annotation node kind, as reported in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeKind::String => "StringTypeAnnotation",
            TypeKind::Number => "NumberTypeAnnotation",
            TypeKind::Boolean => "BooleanTypeAnnotation",
            TypeKind::Symbol => "SymbolTypeAnnotation",
            TypeKind::Void => "VoidTypeAnnotation",
            TypeKind::Null => "NullLiteralTypeAnnotation",
            TypeKind::Any => "AnyTypeAnnotation",
            TypeKind::Mixed => "MixedTypeAnnotation",
            TypeKind::Nullable(_) => "NullableTypeAnnotation",
            TypeKind::Union(_) => "UnionTypeAnnotation",
            TypeKind::Intersection(_) => "IntersectionTypeAnnotation",
            TypeKind::Parenthesized(_) => "ParenthesizedTypeAnnotation",
            TypeKind::Generic { .. } => "GenericTypeAnnotation",
            TypeKind::Object(_) => "ObjectTypeAnnotation",
            TypeKind::Tuple(_) => "TupleTypeAnnotation",
            TypeKind::Array(_) => "ArrayTypeAnnotation",
            TypeKind::Function { .. } => "FunctionTypeAnnotation",
            TypeKind::Typeof(_) => "TypeofTypeAnnotation",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectTypeProperty {
    pub span: Span,
    pub key: Spanned<String>,
    pub optional: bool,
    pub value: TypeAnnotation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionTypeParam {
    pub name: Option<Ident>,
    pub optional: bool,
    pub ty: TypeAnnotation,
}
