#![forbid(unsafe_code)]

use std::mem;

use flowguard_ast::{
    join, span_between, AssignOp, BinOp, Block, ClassDecl, ClassMethod, ClassProperty, Declarator, Expr, ExprKind,
    ForBinding, ForInKind, ForInStmt, ForInit, ForStmt, Function, FunctionBody, FunctionTypeParam,
    Ident, IfStmt, LogicalOp, ObjectTypeProperty, Param, Program, Property, ReturnStmt, Span,
    Spanned, Stmt, ThrowStmt, TypeAlias, TypeAnnotation, TypeKind, UnaryOp, UpdateOp, VarDecl,
    VarKind, WhileStmt,
};
use flowguard_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    /// Cleared while parsing a `for (...)` head so `in` is not read as an operator.
    allow_in: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            idx: 0,
            allow_in: true,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        while !self.at(TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Program { stmts })
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.at(TokenKind::Eof) {
            return Err(ParseError {
                message: "expected end of input".to_string(),
                span: self.peek_span(),
            });
        }
        Ok(expr)
    }

    pub fn parse_type_eof(&mut self) -> Result<TypeAnnotation, ParseError> {
        let ty = self.parse_type()?;
        if !self.at(TokenKind::Eof) {
            return Err(ParseError {
                message: "expected end of input".to_string(),
                span: self.peek_span(),
            });
        }
        Ok(ty)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::KwFunction => {
                let start = self.next().span;
                let f = self.parse_function_rest(start, true)?;
                Ok(Stmt::Function(f))
            }
            TokenKind::KwClass => Ok(Stmt::Class(self.parse_class()?)),
            TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst => {
                let decl = self.parse_var_decl()?;
                self.expect_semi()?;
                Ok(Stmt::VarDecl(decl))
            }
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwIf => Ok(Stmt::If(self.parse_if()?)),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwWhile => {
                let start = self.next().span;
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.parse_stmt()?;
                Ok(Stmt::While(WhileStmt {
                    span: join(start, body.span()),
                    cond,
                    body: Box::new(body),
                }))
            }
            TokenKind::KwThrow => {
                let start = self.next().span;
                if self.peek().newline_before {
                    return Err(ParseError {
                        message: "illegal newline after throw".to_string(),
                        span: start,
                    });
                }
                let arg = self.parse_expr()?;
                let span = join(start, arg.span);
                self.expect_semi()?;
                Ok(Stmt::Throw(ThrowStmt { span, arg }))
            }
            TokenKind::KwBreak => {
                let span = self.next().span;
                self.expect_semi()?;
                Ok(Stmt::Break(span))
            }
            TokenKind::KwContinue => {
                let span = self.next().span;
                self.expect_semi()?;
                Ok(Stmt::Continue(span))
            }
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semi => Ok(Stmt::Empty(self.next().span)),
            TokenKind::Ident(name) if name == "type" && self.is_type_alias_start() => {
                Ok(Stmt::TypeAlias(self.parse_type_alias()?))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect_semi()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn is_type_alias_start(&self) -> bool {
        matches!(self.peek_kind_n(1), Some(TokenKind::Ident(_)))
            && matches!(self.peek_kind_n(2), Some(TokenKind::Eq | TokenKind::Lt))
            && !self.peek_n(1).is_some_and(|t| t.newline_before)
    }

    fn parse_type_alias(&mut self) -> Result<TypeAlias, ParseError> {
        let start = self.next().span;
        let name = self.expect_ident()?;
        let params = self.parse_type_params()?;
        self.expect(TokenKind::Eq)?;
        let target = self.parse_type()?;
        let span = join(start, target.span);
        self.expect_semi()?;
        Ok(TypeAlias {
            span,
            name,
            params,
            target,
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let lb = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            if self.at(TokenKind::RBrace) {
                let rb = self.next();
                return Ok(Block {
                    span: join(lb.span, rb.span),
                    stmts,
                });
            }
            if self.at(TokenKind::Eof) {
                return Err(ParseError {
                    message: "unterminated block; expected '}'".to_string(),
                    span: lb.span,
                });
            }
            stmts.push(self.parse_stmt()?);
        }
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let tok = self.next();
        let kind = match tok.kind {
            TokenKind::KwVar => VarKind::Var,
            TokenKind::KwLet => VarKind::Let,
            _ => VarKind::Const,
        };
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let init = if self.eat(TokenKind::Eq) {
                Some(self.parse_assign()?)
            } else {
                None
            };
            let end = init
                .as_ref()
                .map(|e| e.span)
                .or(ty.as_ref().map(|t| t.span))
                .unwrap_or(name.span);
            decls.push(Declarator {
                span: join(name.span, end),
                name,
                ty,
                init,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let last = decls.last().map(|d| d.span).unwrap_or(tok.span);
        Ok(VarDecl {
            span: join(tok.span, last),
            kind,
            decls,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let start = self.next().span;
        let ends_here = self.at(TokenKind::Semi)
            || self.at(TokenKind::RBrace)
            || self.at(TokenKind::Eof)
            || self.peek().newline_before;
        let arg = if ends_here { None } else { Some(self.parse_expr()?) };
        let span = arg.as_ref().map(|a| join(start, a.span)).unwrap_or(start);
        self.expect_semi()?;
        Ok(Stmt::Return(ReturnStmt { span, arg }))
    }

    fn parse_if(&mut self) -> Result<IfStmt, ParseError> {
        let start = self.next().span;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.parse_stmt()?;
        let else_branch = if self.eat(TokenKind::KwElse) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        let end = else_branch
            .as_ref()
            .map(|s| s.span())
            .unwrap_or(then_branch.span());
        Ok(IfStmt {
            span: join(start, end),
            cond,
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let start = self.next().span;
        self.expect(TokenKind::LParen)?;

        let saved_in = mem::replace(&mut self.allow_in, false);
        let head = self.parse_for_head();
        self.allow_in = saved_in;
        let init = head?;

        if let Some((kind, left)) = self.for_in_kind(&init)? {
            let right = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_stmt()?;
            return Ok(Stmt::ForIn(ForInStmt {
                span: join(start, body.span()),
                kind,
                left,
                right,
                body: Box::new(body),
            }));
        }

        self.expect(TokenKind::Semi)?;
        let test = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi)?;
        let update = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::For(ForStmt {
            span: join(start, body.span()),
            init,
            test,
            update,
            body: Box::new(body),
        }))
    }

    fn parse_for_head(&mut self) -> Result<Option<ForInit>, ParseError> {
        match self.peek_kind() {
            TokenKind::Semi => Ok(None),
            TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst => {
                Ok(Some(ForInit::Decl(self.parse_var_decl()?)))
            }
            _ => Ok(Some(ForInit::Expr(self.parse_expr()?))),
        }
    }

    /// After the head of a `for`, decides whether this is a `for-in`/`for-of`
    /// loop and consumes the `in`/`of` keyword if so.
    fn for_in_kind(
        &mut self,
        init: &Option<ForInit>,
    ) -> Result<Option<(ForInKind, ForBinding)>, ParseError> {
        let kind = match self.peek_kind() {
            TokenKind::KwIn => ForInKind::In,
            TokenKind::Ident(s) if s == "of" => ForInKind::Of,
            _ => return Ok(None),
        };
        let left = match init {
            Some(ForInit::Decl(decl)) if decl.decls.len() == 1 && decl.decls[0].init.is_none() => {
                ForBinding::Decl(decl.clone())
            }
            Some(ForInit::Expr(Expr {
                kind: ExprKind::Ident(id),
                ..
            })) => ForBinding::Target(id.clone()),
            _ => {
                return Err(ParseError {
                    message: "invalid left-hand side in for-in/for-of loop".to_string(),
                    span: self.peek_span(),
                });
            }
        };
        self.next();
        Ok(Some((kind, left)))
    }

    fn parse_class(&mut self) -> Result<ClassDecl, ParseError> {
        let start = self.next().span;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;
        let mut properties = Vec::new();
        let mut methods = Vec::new();
        loop {
            if self.eat(TokenKind::Semi) {
                continue;
            }
            if self.at(TokenKind::RBrace) {
                break;
            }
            let is_static = matches!(self.peek_kind(), TokenKind::Ident(s) if s == "static")
                && !matches!(
                    self.peek_kind_n(1),
                    Some(
                        TokenKind::LParen
                            | TokenKind::Colon
                            | TokenKind::Eq
                            | TokenKind::Semi
                            | TokenKind::RBrace
                    )
                );
            if is_static {
                self.next();
            }
            let key = self.expect_property_name()?;
            if !self.at(TokenKind::LParen) && !self.at(TokenKind::Lt) {
                properties.push(self.parse_class_property(key, is_static)?);
                continue;
            }
            let mut function = self.parse_function_signature_and_body(key.span, false)?;
            function.name = Some(key.clone());
            methods.push(ClassMethod {
                span: join(key.span, function.span),
                key,
                is_static,
                function,
            });
        }
        let rb = self.expect(TokenKind::RBrace)?;
        Ok(ClassDecl {
            span: join(start, rb.span),
            name,
            properties,
            methods,
        })
    }

    fn parse_class_property(
        &mut self,
        key: Ident,
        is_static: bool,
    ) -> Result<ClassProperty, ParseError> {
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let value = if self.eat(TokenKind::Eq) {
            Some(self.parse_assign()?)
        } else {
            None
        };
        self.expect_semi()?;
        let end = value
            .as_ref()
            .map(|e| e.span)
            .or(ty.as_ref().map(|t| t.span))
            .unwrap_or(key.span);
        Ok(ClassProperty {
            span: join(key.span, end),
            key,
            is_static,
            ty,
            value,
        })
    }

    /// Parses the remainder of a `function` after its keyword.
    fn parse_function_rest(&mut self, start: Span, require_name: bool) -> Result<Function, ParseError> {
        let name = if matches!(self.peek_kind(), TokenKind::Ident(_)) {
            Some(self.expect_ident()?)
        } else if require_name {
            return Err(ParseError {
                message: "function declarations require a name".to_string(),
                span: self.peek_span(),
            });
        } else {
            None
        };
        let mut f = self.parse_function_signature_and_body(start, true)?;
        f.name = name;
        Ok(f)
    }

    fn parse_function_signature_and_body(
        &mut self,
        start: Span,
        allow_type_params: bool,
    ) -> Result<Function, ParseError> {
        let type_params = if allow_type_params || self.at(TokenKind::Lt) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;
        let return_type = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Function {
            span: join(start, body.span),
            name: None,
            type_params,
            params,
            return_type,
            body: FunctionBody::Block(body),
            is_arrow: false,
        })
    }

    fn parse_type_params(&mut self) -> Result<Vec<Ident>, ParseError> {
        let mut params = Vec::new();
        if !self.eat(TokenKind::Lt) {
            return Ok(params);
        }
        loop {
            params.push(self.expect_ident()?);
            // Bounds are accepted but carry no runtime meaning.
            if self.eat(TokenKind::Colon) {
                self.parse_type()?;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(params)
    }

    /// Parameter list between parentheses; the caller consumes `(` and `)`.
    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) {
            let rest_tok = if self.at(TokenKind::Ellipsis) {
                Some(self.next())
            } else {
                None
            };
            let name = self.expect_ident()?;
            let optional = self.eat(TokenKind::Question);
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.eat(TokenKind::Eq) {
                Some(self.parse_assign()?)
            } else {
                None
            };
            let start = rest_tok.as_ref().map(|t| t.span).unwrap_or(name.span);
            let end = default
                .as_ref()
                .map(|e| e.span)
                .or(ty.as_ref().map(|t| t.span))
                .unwrap_or(name.span);
            params.push(Param {
                span: join(start, end),
                name,
                optional,
                rest: rest_tok.is_some(),
                ty,
                default,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    // ----- expressions -----

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr, ParseError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let target = self.parse_conditional()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            _ => return Ok(target),
        };
        if !matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            return Err(ParseError {
                message: "invalid assignment target".to_string(),
                span: target.span,
            });
        }
        self.next();
        let value = self.parse_assign()?;
        Ok(Expr {
            span: join(target.span, value.span),
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
        })
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let start = self.peek_span();

        // `x => ...`
        if let TokenKind::Ident(_) = self.peek_kind() {
            if matches!(self.peek_kind_n(1), Some(TokenKind::FatArrow)) {
                let name = self.expect_ident()?;
                self.next();
                let param = Param {
                    span: name.span,
                    name,
                    optional: false,
                    rest: false,
                    ty: None,
                    default: None,
                };
                return self.parse_arrow_body(start, vec![param], None).map(Some);
            }
            return Ok(None);
        }

        if !self.at(TokenKind::LParen) {
            return Ok(None);
        }

        // `(params): T => ...` needs backtracking: the head may turn out to be
        // a parenthesized expression.
        let saved = self.idx;
        match self.parse_arrow_head() {
            Ok((params, return_type)) => self.parse_arrow_body(start, params, return_type).map(Some),
            Err(_) => {
                self.idx = saved;
                Ok(None)
            }
        }
    }

    fn parse_arrow_head(&mut self) -> Result<(Vec<Param>, Option<TypeAnnotation>), ParseError> {
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;
        let return_type = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::FatArrow)?;
        Ok((params, return_type))
    }

    fn parse_arrow_body(
        &mut self,
        start: Span,
        params: Vec<Param>,
        return_type: Option<TypeAnnotation>,
    ) -> Result<Expr, ParseError> {
        let body = if self.at(TokenKind::LBrace) {
            FunctionBody::Block(self.parse_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assign()?))
        };
        let end = match &body {
            FunctionBody::Block(b) => b.span,
            FunctionBody::Expr(e) => e.span,
        };
        let span = join(start, end);
        Ok(Expr {
            span,
            kind: ExprKind::Function(Box::new(Function {
                span,
                name: None,
                type_params: Vec::new(),
                params,
                return_type,
                body,
                is_arrow: true,
            })),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_or()?;
        if !self.eat(TokenKind::Question) {
            return Ok(test);
        }
        let saved_in = mem::replace(&mut self.allow_in, true);
        let consequent = self.parse_assign();
        self.allow_in = saved_in;
        let consequent = consequent?;
        self.expect(TokenKind::Colon)?;
        let alternate = self.parse_assign()?;
        Ok(Expr {
            span: join(test.span, alternate.span),
            kind: ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::OrOr) {
            let right = self.parse_and()?;
            left = Expr::logical(left, LogicalOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.eat(TokenKind::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::logical(left, LogicalOp::And, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::LooseEq,
                TokenKind::Neq => BinOp::LooseNe,
                TokenKind::EqEqEq => BinOp::StrictEq,
                TokenKind::NeqEq => BinOp::StrictNe,
                _ => break,
            };
            self.next();
            let right = self.parse_relational()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::KwInstanceof => BinOp::InstanceOf,
                TokenKind::KwIn if self.allow_in => BinOp::In,
                _ => break,
            };
            self.next();
            let right = self.parse_additive()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.next();
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::KwTypeof => Some(UnaryOp::TypeOf),
            TokenKind::KwVoid => Some(UnaryOp::Void),
            _ => None,
        };
        if let Some(op) = op {
            let t = self.next();
            let expr = self.parse_unary()?;
            return Ok(Expr {
                span: join(t.span, expr.span),
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
            });
        }

        let update = match self.peek_kind() {
            TokenKind::PlusPlus => Some(UpdateOp::Inc),
            TokenKind::MinusMinus => Some(UpdateOp::Dec),
            _ => None,
        };
        if let Some(op) = update {
            let t = self.next();
            let target = self.parse_unary()?;
            self.check_update_target(&target)?;
            return Ok(Expr {
                span: join(t.span, target.span),
                kind: ExprKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                },
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_call_member()?;
        let op = match self.peek_kind() {
            TokenKind::PlusPlus if !self.peek().newline_before => UpdateOp::Inc,
            TokenKind::MinusMinus if !self.peek().newline_before => UpdateOp::Dec,
            _ => return Ok(expr),
        };
        let t = self.next();
        self.check_update_target(&expr)?;
        Ok(Expr {
            span: join(expr.span, t.span),
            kind: ExprKind::Update {
                op,
                prefix: false,
                target: Box::new(expr),
            },
        })
    }

    fn check_update_target(&self, target: &Expr) -> Result<(), ParseError> {
        if matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            Ok(())
        } else {
            Err(ParseError {
                message: "invalid update target".to_string(),
                span: target.span,
            })
        }
    }

    fn parse_call_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.at(TokenKind::KwNew) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat(TokenKind::Dot) {
                let property = self.expect_property_name()?;
                expr = Expr {
                    span: join(expr.span, property.span),
                    kind: ExprKind::Member {
                        object: Box::new(expr),
                        property,
                    },
                };
                continue;
            }
            if self.at(TokenKind::LBracket) {
                self.next();
                let saved_in = mem::replace(&mut self.allow_in, true);
                let index = self.parse_expr();
                self.allow_in = saved_in;
                let index = index?;
                let rb = self.expect(TokenKind::RBracket)?;
                expr = Expr {
                    span: join(expr.span, rb.span),
                    kind: ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                };
                continue;
            }
            if self.at(TokenKind::LParen) {
                self.next();
                let (args, rp) = self.parse_args()?;
                expr = Expr {
                    span: join(expr.span, rp),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(TokenKind::KwNew)?.span;
        let mut callee = if self.at(TokenKind::KwNew) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        while self.eat(TokenKind::Dot) {
            let property = self.expect_property_name()?;
            callee = Expr {
                span: join(callee.span, property.span),
                kind: ExprKind::Member {
                    object: Box::new(callee),
                    property,
                },
            };
        }
        let (args, end) = if self.eat(TokenKind::LParen) {
            self.parse_args()?
        } else {
            (Vec::new(), callee.span)
        };
        Ok(Expr {
            span: join(start, end),
            kind: ExprKind::New {
                callee: Box::new(callee),
                args,
            },
        })
    }

    /// Arguments after an opening `(`; consumes the closing `)` and returns its span.
    fn parse_args(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        let saved_in = mem::replace(&mut self.allow_in, true);
        let result = self.parse_args_inner();
        self.allow_in = saved_in;
        result
    }

    fn parse_args_inner(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            args.push(self.parse_assign()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let rp = self.expect(TokenKind::RParen)?;
        Ok((args, rp.span))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.next();
        let span = tok.span;
        let kind = match tok.kind {
            TokenKind::Ident(name) => ExprKind::Ident(Spanned::new(span, name)),
            TokenKind::KwThis => ExprKind::This,
            TokenKind::KwNull => ExprKind::Null,
            TokenKind::KwTrue => ExprKind::Bool(true),
            TokenKind::KwFalse => ExprKind::Bool(false),
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::Regex { pattern, flags } => ExprKind::Regex { pattern, flags },
            TokenKind::LParen => {
                let saved_in = mem::replace(&mut self.allow_in, true);
                let inner = self.parse_expr();
                self.allow_in = saved_in;
                let inner = inner?;
                let rp = self.expect(TokenKind::RParen)?;
                return Ok(Expr {
                    span: join(span, rp.span),
                    kind: inner.kind,
                });
            }
            TokenKind::LBracket => {
                let mut elems = Vec::new();
                while !self.at(TokenKind::RBracket) {
                    elems.push(self.parse_assign()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let rb = self.expect(TokenKind::RBracket)?;
                return Ok(Expr {
                    span: join(span, rb.span),
                    kind: ExprKind::Array(elems),
                });
            }
            TokenKind::LBrace => return self.parse_object_lit(span),
            TokenKind::KwFunction => {
                let f = self.parse_function_rest(span, false)?;
                ExprKind::Function(Box::new(f))
            }
            other => {
                return Err(ParseError {
                    message: format!("unexpected token {other:?}"),
                    span,
                });
            }
        };
        let span = match &kind {
            ExprKind::Function(f) => f.span,
            _ => span,
        };
        Ok(Expr { span, kind })
    }

    fn parse_object_lit(&mut self, start: Span) -> Result<Expr, ParseError> {
        let mut props = Vec::new();
        loop {
            if self.at(TokenKind::RBrace) {
                break;
            }
            let key = self.expect_object_key()?;
            let value = if self.eat(TokenKind::Colon) {
                self.parse_assign()?
            } else {
                // Shorthand `{ a }`.
                Expr::ident(key.span, key.node.clone())
            };
            props.push(Property {
                span: join(key.span, value.span),
                key,
                value,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let rb = self.expect(TokenKind::RBrace)?;
        Ok(Expr {
            span: join(start, rb.span),
            kind: ExprKind::Object(props),
        })
    }

    // ----- type annotations -----

    pub fn parse_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        let leading = self.eat(TokenKind::Pipe);
        let first = self.parse_intersection_type()?;
        if !self.at(TokenKind::Pipe) && !leading {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(TokenKind::Pipe) {
            members.push(self.parse_intersection_type()?);
        }
        if members.len() == 1 {
            return Ok(members.remove(0));
        }
        let span = join(members[0].span, members[members.len() - 1].span);
        Ok(TypeAnnotation {
            span,
            kind: TypeKind::Union(members),
        })
    }

    fn parse_intersection_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        let first = self.parse_prefix_type()?;
        if !self.at(TokenKind::Amp) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(TokenKind::Amp) {
            members.push(self.parse_prefix_type()?);
        }
        let span = join(members[0].span, members[members.len() - 1].span);
        Ok(TypeAnnotation {
            span,
            kind: TypeKind::Intersection(members),
        })
    }

    fn parse_prefix_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        if self.at(TokenKind::Question) {
            let q = self.next();
            let inner = self.parse_prefix_type()?;
            return Ok(TypeAnnotation {
                span: join(q.span, inner.span),
                kind: TypeKind::Nullable(Box::new(inner)),
            });
        }
        let mut ty = self.parse_primary_type()?;
        while self.at(TokenKind::LBracket)
            && matches!(self.peek_kind_n(1), Some(TokenKind::RBracket))
            && !self.peek().newline_before
        {
            self.next();
            let rb = self.next();
            ty = TypeAnnotation {
                span: join(ty.span, rb.span),
                kind: TypeKind::Array(Box::new(ty)),
            };
        }
        Ok(ty)
    }

    fn parse_primary_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        let span = self.peek_span();
        match self.peek_kind().clone() {
            TokenKind::KwNull => {
                self.next();
                Ok(TypeAnnotation {
                    span,
                    kind: TypeKind::Null,
                })
            }
            TokenKind::KwVoid => {
                self.next();
                Ok(TypeAnnotation {
                    span,
                    kind: TypeKind::Void,
                })
            }
            TokenKind::KwTypeof => {
                self.next();
                let target = self.expect_ident()?;
                Ok(TypeAnnotation {
                    span: join(span, target.span),
                    kind: TypeKind::Typeof(target),
                })
            }
            TokenKind::Ident(name) => {
                let primitive = match name.as_str() {
                    "string" => Some(TypeKind::String),
                    "number" => Some(TypeKind::Number),
                    "boolean" => Some(TypeKind::Boolean),
                    "symbol" => Some(TypeKind::Symbol),
                    "any" => Some(TypeKind::Any),
                    "mixed" => Some(TypeKind::Mixed),
                    _ => None,
                };
                if let Some(kind) = primitive {
                    self.next();
                    return Ok(TypeAnnotation { span, kind });
                }
                self.parse_generic_type()
            }
            TokenKind::LBrace => self.parse_object_type(),
            TokenKind::LBracket => {
                self.next();
                let mut elems = Vec::new();
                while !self.at(TokenKind::RBracket) {
                    elems.push(self.parse_type()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let rb = self.expect(TokenKind::RBracket)?;
                Ok(TypeAnnotation {
                    span: join(span, rb.span),
                    kind: TypeKind::Tuple(elems),
                })
            }
            TokenKind::LParen => {
                let saved = self.idx;
                match self.parse_function_type() {
                    Ok(ty) => Ok(ty),
                    Err(_) => {
                        self.idx = saved;
                        self.next();
                        let inner = self.parse_type()?;
                        let rp = self.expect(TokenKind::RParen)?;
                        Ok(TypeAnnotation {
                            span: join(span, rp.span),
                            kind: TypeKind::Parenthesized(Box::new(inner)),
                        })
                    }
                }
            }
            other => Err(ParseError {
                message: format!("unsupported type syntax {other:?}"),
                span,
            }),
        }
    }

    fn parse_generic_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        let first = self.expect_ident()?;
        let start = first.span;
        let mut name = vec![first];
        while self.eat(TokenKind::Dot) {
            name.push(self.expect_ident()?);
        }
        let mut end = name[name.len() - 1].span;
        let mut args = Vec::new();
        if self.eat(TokenKind::Lt) {
            loop {
                args.push(self.parse_type()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            end = self.expect(TokenKind::Gt)?.span;
        }
        Ok(TypeAnnotation {
            span: join(start, end),
            kind: TypeKind::Generic { name, args },
        })
    }

    fn parse_object_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        let lb = self.expect(TokenKind::LBrace)?;
        let mut props = Vec::new();
        loop {
            if self.at(TokenKind::RBrace) {
                break;
            }
            let key = self.expect_object_key()?;
            let optional = self.eat(TokenKind::Question);
            self.expect(TokenKind::Colon)?;
            let value = self.parse_type()?;
            props.push(ObjectTypeProperty {
                span: join(key.span, value.span),
                key,
                optional,
                value,
            });
            if !self.eat(TokenKind::Comma) && !self.eat(TokenKind::Semi) {
                break;
            }
        }
        let rb = self.expect(TokenKind::RBrace)?;
        Ok(TypeAnnotation {
            span: join(lb.span, rb.span),
            kind: TypeKind::Object(props),
        })
    }

    fn parse_function_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        let lp = self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) {
            let named = matches!(self.peek_kind(), TokenKind::Ident(_))
                && matches!(
                    self.peek_kind_n(1),
                    Some(TokenKind::Colon | TokenKind::Question)
                );
            let (name, optional) = if named {
                let name = self.expect_ident()?;
                let optional = self.eat(TokenKind::Question);
                self.expect(TokenKind::Colon)?;
                (Some(name), optional)
            } else {
                (None, false)
            };
            let ty = self.parse_type()?;
            params.push(FunctionTypeParam { name, optional, ty });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::FatArrow)?;
        let ret = self.parse_type()?;
        Ok(TypeAnnotation {
            span: join(lp.span, ret.span),
            kind: TypeKind::Function {
                params,
                ret: Box::new(ret),
            },
        })
    }

    // ----- token helpers -----

    fn expect_semi(&mut self) -> Result<(), ParseError> {
        if self.eat(TokenKind::Semi) {
            return Ok(());
        }
        if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) || self.peek().newline_before {
            return Ok(());
        }
        Err(ParseError {
            message: "expected ';'".to_string(),
            span: self.peek_span(),
        })
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident {
                span: tok.span,
                node: name,
            }),
            _ => Err(ParseError {
                message: "expected identifier".to_string(),
                span: tok.span,
            }),
        }
    }

    fn expect_property_name(&mut self) -> Result<Ident, ParseError> {
        let tok = self.next();
        if let Some(text) = tok.kind.keyword_text() {
            return Ok(Spanned::new(tok.span, text.to_string()));
        }
        match tok.kind {
            TokenKind::Ident(name) => Ok(Spanned::new(tok.span, name)),
            _ => Err(ParseError {
                message: "expected property name".to_string(),
                span: tok.span,
            }),
        }
    }

    fn expect_object_key(&mut self) -> Result<Spanned<String>, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::String(s) => {
                let tok = self.next();
                Ok(Spanned::new(tok.span, s))
            }
            TokenKind::Number(n) => {
                let tok = self.next();
                Ok(Spanned::new(tok.span, crate::fmt::format_number(n)))
            }
            _ => self.expect_property_name(),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        if self.at(expected.clone()) {
            return Ok(self.next());
        }
        Err(ParseError {
            message: format!("expected {expected:?}"),
            span: self.peek_span(),
        })
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        mem::discriminant(self.peek_kind()) == mem::discriminant(&kind)
    }

    /// Returns the current token and advances; the trailing `Eof` is sticky.
    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if !matches!(tok.kind, TokenKind::Eof) {
            self.idx += 1;
        }
        tok
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.idx.min(last)]
    }

    fn peek_n(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.idx + n)
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_n(&self, n: usize) -> Option<&TokenKind> {
        self.peek_n(n).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.idx)
            .map(|t| t.span)
            .unwrap_or_else(|| span_between(0, 0))
    }
}
