#![forbid(unsafe_code)]

use std::collections::HashMap;

use flowguard_ast::{
    Block, ClassDecl, ClassMethod, ClassProperty, Declarator, Expr, ExprKind, ForBinding, ForInStmt, ForInit,
    ForStmt, Function, FunctionBody, IfStmt, Param, Program, Property, ReturnStmt, Span, Stmt,
    ThrowStmt, TypeAlias, TypeAnnotation, VarDecl, VarKind, WhileStmt,
};
use tracing::{debug, trace};

use crate::error::TransformError;
use crate::guard::{build_guard, Site, SiteKind};
use crate::scope::{NameAllocator, Scopes};
use crate::types::{describe_tags, is_unguardable, permits_nully, Annotations, TypeTag};
use crate::verifier::{Verdict, Verifier};
use crate::visit::{walk_program, Visit};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub functions: usize,
    pub guards_inserted: usize,
    pub statically_verified: usize,
}

#[derive(Clone, Debug)]
pub struct TransformOutput {
    pub program: Program,
    pub stats: TransformStats,
}

/// Rewrites every annotated binding site of the unit. A contract error anywhere
/// fails the whole unit.
pub fn transform_program(program: &Program) -> Result<TransformOutput, TransformError> {
    let mut transformer = Transformer::new(program);
    let stmts = transformer.stmt_list(&program.stmts)?;
    Ok(TransformOutput {
        program: Program { stmts },
        stats: transformer.stats,
    })
}

/// Guard state of one function; never shared with nested functions.
#[derive(Debug)]
struct FnCtx {
    name: Option<String>,
    generics: Vec<String>,
    /// `None` when returns are unconstrained.
    return_tags: Option<Vec<TypeTag>>,
    returns: usize,
}

struct AliasCollector<'a> {
    aliases: &'a mut HashMap<String, TypeAlias>,
}

impl Visit for AliasCollector<'_> {
    fn stmt(&mut self, stmt: &Stmt) {
        if let Stmt::TypeAlias(alias) = stmt {
            self.aliases.insert(alias.name.node.clone(), alias.clone());
        }
    }
}

/// Where a variable declaration sits; loop heads move guards into the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeclPosition {
    Statement,
    LoopHead,
}

struct Transformer {
    aliases: HashMap<String, TypeAlias>,
    names: NameAllocator,
    scopes: Scopes,
    fns: Vec<FnCtx>,
    stats: TransformStats,
}

impl Transformer {
    fn new(program: &Program) -> Self {
        let mut aliases = HashMap::new();
        walk_program(
            &mut AliasCollector {
                aliases: &mut aliases,
            },
            program,
        );
        Self {
            aliases,
            names: NameAllocator::for_program(program),
            scopes: Scopes::for_program(program),
            fns: vec![FnCtx {
                name: None,
                generics: Vec::new(),
                return_tags: None,
                returns: 0,
            }],
            stats: TransformStats::default(),
        }
    }

    fn ctx(&self) -> &FnCtx {
        &self.fns[self.fns.len() - 1]
    }

    fn ctx_mut(&mut self) -> &mut FnCtx {
        let last = self.fns.len() - 1;
        &mut self.fns[last]
    }

    fn extract(&self, ty: &TypeAnnotation) -> Result<Vec<TypeTag>, TransformError> {
        Annotations::new(&self.aliases, &self.ctx().generics).extract(ty)
    }

    fn verify(&self, expr: &Expr, tags: &[TypeTag]) -> Verdict {
        let verdict = Verifier::new(&self.scopes).resolve(expr, tags);
        trace!(?verdict, depth = self.scopes.depth(), "verified expression");
        verdict
    }

    fn guard(&mut self, subject: &Expr, tags: &[TypeTag], site: Site<'_>) -> Option<Stmt> {
        let guard = build_guard(subject, tags, site, &self.names)?;
        self.stats.guards_inserted += 1;
        debug!(site = %site.describe(), expected = %describe_tags(tags), "inserted guard");
        Some(guard)
    }

    fn statically_verified(&mut self, what: &str) {
        self.stats.statically_verified += 1;
        debug!(site = what, "statically verified");
    }

    // ----- functions -----

    fn function(&mut self, f: &Function) -> Result<Function, TransformError> {
        self.stats.functions += 1;
        let name = f.name.as_ref().map(|n| n.node.clone());
        debug!(function = name.as_deref().unwrap_or("<anonymous>"), "transforming function");

        let mut generics = self.ctx().generics.clone();
        for tp in &f.type_params {
            if !generics.contains(&tp.node) {
                generics.push(tp.node.clone());
            }
        }
        self.fns.push(FnCtx {
            name,
            generics,
            return_tags: None,
            returns: 0,
        });
        self.scopes.push_function(f);

        let result = self.function_inner(f);

        self.scopes.pop();
        let ctx = self.fns.pop();
        let function = result?;

        if let (Some(ctx), Some(ret)) = (ctx, &f.return_type) {
            if let Some(tags) = &ctx.return_tags {
                if ctx.returns == 0 && !permits_nully(tags) {
                    let message = match &ctx.name {
                        Some(n) => format!(
                            "Function \"{n}\" did not return a value, expected {}.",
                            describe_tags(tags)
                        ),
                        None => format!(
                            "Function did not return a value, expected {}.",
                            describe_tags(tags)
                        ),
                    };
                    return Err(TransformError::Contract {
                        message,
                        span: ret.span,
                    });
                }
            }
        }
        Ok(function)
    }

    fn function_inner(&mut self, f: &Function) -> Result<Function, TransformError> {
        let mut params = Vec::with_capacity(f.params.len());
        let mut guards = Vec::new();
        for p in &f.params {
            let (param, guard) = self.param(p)?;
            params.push(param);
            guards.extend(guard);
        }

        let return_tags = match &f.return_type {
            Some(ty) => {
                let tags = self.extract(ty)?;
                (!is_unguardable(&tags)).then_some(tags)
            }
            None => None,
        };
        let constrained = return_tags.is_some();
        self.ctx_mut().return_tags = return_tags;

        let body = match &f.body {
            FunctionBody::Expr(e) if guards.is_empty() && !constrained => {
                FunctionBody::Expr(Box::new(self.expr(e)?))
            }
            FunctionBody::Expr(e) => {
                // Concise bodies become `{ return <expr>; }` so guards have a place to go.
                let ret = Stmt::Return(ReturnStmt {
                    span: e.span,
                    arg: Some((**e).clone()),
                });
                FunctionBody::Block(Block {
                    span: e.span,
                    stmts: self.stmt(&ret)?,
                })
            }
            FunctionBody::Block(b) => FunctionBody::Block(Block {
                span: b.span,
                stmts: self.stmt_list(&b.stmts)?,
            }),
        };

        Ok(Function {
            span: f.span,
            name: f.name.clone(),
            type_params: f.type_params.clone(),
            params,
            return_type: f.return_type.clone(),
            body: prefix_body(body, guards, f.span)?,
            is_arrow: f.is_arrow,
        })
    }

    fn param(&mut self, p: &Param) -> Result<(Param, Option<Stmt>), TransformError> {
        let default = p.default.as_ref().map(|d| self.expr(d)).transpose()?;
        let param = Param {
            default: default.clone(),
            ..p.clone()
        };
        let Some(ty) = &p.ty else {
            return Ok((param, None));
        };

        let mut tags = self.extract(ty)?;
        if p.optional && !tags.contains(&TypeTag::Undefined) {
            tags.push(TypeTag::Undefined);
        }
        if is_unguardable(&tags) {
            return Ok((param, None));
        }

        if let Some(d) = &default {
            if let Verdict::Invalid(_) = self.verify(d, &tags) {
                return Err(TransformError::Contract {
                    message: format!(
                        "Invalid default value for argument \"{}\", expected {}.",
                        p.name.node,
                        describe_tags(&tags)
                    ),
                    span: d.span,
                });
            }
        }

        let kind = if p.rest {
            SiteKind::RestArgument
        } else if p.optional || p.default.is_some() {
            SiteKind::OptionalArgument
        } else {
            SiteKind::Argument
        };
        let subject = Expr::ident(p.name.span, p.name.node.clone());
        let site = Site {
            kind,
            name: Some(&p.name.node),
        };
        let guard = self.guard(&subject, &tags, site);
        Ok((param, guard))
    }

    // ----- statements -----

    fn stmt_list(&mut self, stmts: &[Stmt]) -> Result<Vec<Stmt>, TransformError> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            out.extend(self.stmt(stmt)?);
        }
        Ok(out)
    }

    fn block(&mut self, block: &Block) -> Result<Block, TransformError> {
        self.scopes.push_block(&block.stmts);
        let stmts = self.stmt_list(&block.stmts);
        self.scopes.pop();
        Ok(Block {
            span: block.span,
            stmts: stmts?,
        })
    }

    /// A statement in single-statement position; expansions are wrapped in a block.
    fn clause(&mut self, stmt: &Stmt) -> Result<Stmt, TransformError> {
        let mut stmts = self.stmt(stmt)?;
        if stmts.len() == 1 {
            if let Some(only) = stmts.pop() {
                return Ok(only);
            }
        }
        Ok(Stmt::Block(Block {
            span: stmt.span(),
            stmts,
        }))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<Vec<Stmt>, TransformError> {
        let out = match stmt {
            Stmt::Function(f) => Stmt::Function(self.function(f)?),
            Stmt::Class(c) => return self.class(c),
            Stmt::TypeAlias(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Empty(_) => {
                stmt.clone()
            }
            Stmt::VarDecl(d) => {
                let (decl, guards) = self.var_decl(d, DeclPosition::Statement)?;
                let mut out = vec![Stmt::VarDecl(decl)];
                out.extend(guards);
                return Ok(out);
            }
            Stmt::Return(r) => return self.return_stmt(r),
            Stmt::If(s) => Stmt::If(IfStmt {
                span: s.span,
                cond: self.expr(&s.cond)?,
                then_branch: Box::new(self.clause(&s.then_branch)?),
                else_branch: match &s.else_branch {
                    Some(alt) => Some(Box::new(self.clause(alt)?)),
                    None => None,
                },
            }),
            Stmt::For(s) => self.for_stmt(s)?,
            Stmt::ForIn(s) => self.for_in_stmt(s)?,
            Stmt::While(s) => Stmt::While(WhileStmt {
                span: s.span,
                cond: self.expr(&s.cond)?,
                body: Box::new(self.clause(&s.body)?),
            }),
            Stmt::Block(b) => Stmt::Block(self.block(b)?),
            Stmt::Throw(t) => Stmt::Throw(ThrowStmt {
                span: t.span,
                arg: self.expr(&t.arg)?,
            }),
            Stmt::Expr(e) => Stmt::Expr(self.expr(e)?),
        };
        Ok(vec![out])
    }

    /// Static property guards follow the class; instance property guards open
    /// the constructor, which is created when the class has none.
    fn class(&mut self, c: &ClassDecl) -> Result<Vec<Stmt>, TransformError> {
        let mut properties = Vec::with_capacity(c.properties.len());
        let mut field_guards = Vec::new();
        let mut static_guards = Vec::new();
        for p in &c.properties {
            let value = p.value.as_ref().map(|e| self.expr(e)).transpose()?;
            if let Some(ty) = &p.ty {
                let owner = if p.is_static {
                    Expr::ident(c.name.span, c.name.node.clone())
                } else {
                    Expr::new(p.key.span, ExprKind::This)
                };
                let guard = self.property_guard(p, ty, value.as_ref(), owner)?;
                if p.is_static {
                    static_guards.extend(guard);
                } else {
                    field_guards.extend(guard);
                }
            }
            properties.push(ClassProperty {
                value,
                ..p.clone()
            });
        }

        let mut methods = Vec::with_capacity(c.methods.len() + 1);
        for m in &c.methods {
            let mut function = self.function(&m.function)?;
            if is_constructor(m) {
                let guards = std::mem::take(&mut field_guards);
                function.body = prefix_body(function.body, guards, m.span)?;
            }
            methods.push(ClassMethod {
                span: m.span,
                key: m.key.clone(),
                is_static: m.is_static,
                function,
            });
        }
        if !field_guards.is_empty() {
            debug!(class = %c.name.node, "created constructor for property guards");
            methods.insert(0, synthesized_constructor(c.span, field_guards));
        }

        let mut out = vec![Stmt::Class(ClassDecl {
            span: c.span,
            name: c.name.clone(),
            properties,
            methods,
        })];
        out.extend(static_guards);
        Ok(out)
    }

    fn property_guard(
        &mut self,
        p: &ClassProperty,
        ty: &TypeAnnotation,
        value: Option<&Expr>,
        owner: Expr,
    ) -> Result<Option<Stmt>, TransformError> {
        let tags = self.extract(ty)?;
        if is_unguardable(&tags) {
            return Ok(None);
        }
        let name = &p.key.node;
        // Like uninitialized variables, properties without a value are left alone.
        let Some(value) = value else {
            return Ok(None);
        };
        match self.verify(value, &tags) {
            Verdict::Invalid(got) => {
                return Err(TransformError::Contract {
                    message: format!(
                        "Invalid value for property \"{name}\", expected {}, got {got}.",
                        describe_tags(&tags)
                    ),
                    span: value.span,
                });
            }
            Verdict::Valid => {
                self.statically_verified(name);
                return Ok(None);
            }
            Verdict::Unknown | Verdict::Constant(_) => {}
        }
        let subject = Expr::member(owner, name.clone());
        let site = Site {
            kind: SiteKind::Property,
            name: Some(name),
        };
        Ok(self.guard(&subject, &tags, site))
    }

    fn var_decl(
        &mut self,
        d: &VarDecl,
        position: DeclPosition,
    ) -> Result<(VarDecl, Vec<Stmt>), TransformError> {
        let mut decls = Vec::with_capacity(d.decls.len());
        let mut guards = Vec::new();
        for decl in &d.decls {
            let init = decl.init.as_ref().map(|e| self.expr(e)).transpose()?;
            if let Some(ty) = &decl.ty {
                guards.extend(self.declarator_guard(decl, ty, init.as_ref(), position)?);
            }
            decls.push(Declarator {
                span: decl.span,
                name: decl.name.clone(),
                ty: decl.ty.clone(),
                init,
            });
        }
        Ok((
            VarDecl {
                span: d.span,
                kind: d.kind,
                decls,
            },
            guards,
        ))
    }

    fn declarator_guard(
        &mut self,
        decl: &Declarator,
        ty: &TypeAnnotation,
        init: Option<&Expr>,
        position: DeclPosition,
    ) -> Result<Option<Stmt>, TransformError> {
        let tags = self.extract(ty)?;
        if is_unguardable(&tags) {
            return Ok(None);
        }
        let name = &decl.name.node;
        match init {
            Some(init) => match self.verify(init, &tags) {
                Verdict::Invalid(got) => {
                    return Err(TransformError::Contract {
                        message: format!(
                            "Invalid value for variable \"{name}\", expected {}, got {got}.",
                            describe_tags(&tags)
                        ),
                        span: init.span,
                    });
                }
                Verdict::Valid => {
                    self.statically_verified(name);
                    return Ok(None);
                }
                Verdict::Unknown | Verdict::Constant(_) => {}
            },
            // Uninitialized declarations are only checked where a loop assigns them.
            None if position == DeclPosition::Statement => return Ok(None),
            None => {}
        }
        let subject = Expr::ident(decl.name.span, name.clone());
        let site = Site {
            kind: SiteKind::Variable,
            name: Some(name),
        };
        Ok(self.guard(&subject, &tags, site))
    }

    fn for_stmt(&mut self, s: &ForStmt) -> Result<Stmt, TransformError> {
        let head_decl = match &s.init {
            Some(ForInit::Decl(d)) => Some(d),
            _ => None,
        };
        self.scopes.push_loop_head(head_decl);
        let result = self.for_stmt_inner(s);
        self.scopes.pop();
        result
    }

    fn for_stmt_inner(&mut self, s: &ForStmt) -> Result<Stmt, TransformError> {
        let (init, guards) = match &s.init {
            Some(ForInit::Decl(d)) => {
                let (decl, guards) = self.var_decl(d, DeclPosition::LoopHead)?;
                (Some(ForInit::Decl(decl)), guards)
            }
            Some(ForInit::Expr(e)) => (Some(ForInit::Expr(self.expr(e)?)), Vec::new()),
            None => (None, Vec::new()),
        };
        let test = s.test.as_ref().map(|e| self.expr(e)).transpose()?;
        let update = s.update.as_ref().map(|e| self.expr(e)).transpose()?;
        let body = self.clause(&s.body)?;
        Ok(Stmt::For(ForStmt {
            span: s.span,
            init,
            test,
            update,
            body: Box::new(prepend_guards(body, guards)),
        }))
    }

    fn for_in_stmt(&mut self, s: &ForInStmt) -> Result<Stmt, TransformError> {
        let head_decl = match &s.left {
            ForBinding::Decl(d) => Some(d),
            ForBinding::Target(_) => None,
        };
        self.scopes.push_loop_head(head_decl);
        let result = self.for_in_stmt_inner(s);
        self.scopes.pop();
        result
    }

    fn for_in_stmt_inner(&mut self, s: &ForInStmt) -> Result<Stmt, TransformError> {
        let (left, guards) = match &s.left {
            ForBinding::Decl(d) => {
                let (decl, guards) = self.var_decl(d, DeclPosition::LoopHead)?;
                (ForBinding::Decl(decl), guards)
            }
            ForBinding::Target(id) => (ForBinding::Target(id.clone()), Vec::new()),
        };
        let right = self.expr(&s.right)?;
        let body = self.clause(&s.body)?;
        Ok(Stmt::ForIn(ForInStmt {
            span: s.span,
            kind: s.kind,
            left,
            right,
            body: Box::new(prepend_guards(body, guards)),
        }))
    }

    fn return_stmt(&mut self, r: &ReturnStmt) -> Result<Vec<Stmt>, TransformError> {
        self.ctx_mut().returns += 1;
        let arg = r.arg.as_ref().map(|e| self.expr(e)).transpose()?;
        let Some(tags) = self.ctx().return_tags.clone() else {
            return Ok(vec![Stmt::Return(ReturnStmt { span: r.span, arg })]);
        };

        let value = arg
            .clone()
            .unwrap_or_else(|| Expr::ident(r.span, "undefined"));
        match self.verify(&value, &tags) {
            Verdict::Invalid(got) => {
                return Err(TransformError::Contract {
                    message: format!(
                        "Invalid return type, expected {}, got {got}.",
                        describe_tags(&tags)
                    ),
                    span: value.span,
                });
            }
            Verdict::Valid => {
                self.statically_verified("return");
                return Ok(vec![Stmt::Return(ReturnStmt { span: r.span, arg })]);
            }
            Verdict::Unknown | Verdict::Constant(_) => {}
        }

        let fn_name = self.ctx().name.clone();
        let site = Site {
            kind: SiteKind::Return,
            name: fn_name.as_deref(),
        };

        // Identifiers and literals are re-read directly; anything else is
        // evaluated once into a temporary.
        if value.as_ident().is_some() || value.is_literal() {
            let guard = self.guard(&value, &tags, site);
            let mut out: Vec<Stmt> = guard.into_iter().collect();
            out.push(Stmt::Return(ReturnStmt {
                span: r.span,
                arg: Some(value),
            }));
            return Ok(out);
        }

        let temp = self.names.fresh(&value);
        trace!(temp = %temp, "materialized return value");
        let subject = Expr::ident(value.span, temp.clone());
        let decl = Stmt::VarDecl(VarDecl {
            span: value.span,
            kind: VarKind::Const,
            decls: vec![Declarator {
                span: value.span,
                name: flowguard_ast::ident(value.span, temp),
                ty: None,
                init: Some(value),
            }],
        });
        let mut out = vec![decl];
        out.extend(self.guard(&subject, &tags, site));
        out.push(Stmt::Return(ReturnStmt {
            span: r.span,
            arg: Some(subject),
        }));
        Ok(out)
    }

    // ----- expressions -----

    fn exprs(&mut self, exprs: &[Expr]) -> Result<Vec<Expr>, TransformError> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&mut self, expr: &Expr) -> Result<Box<Expr>, TransformError> {
        Ok(Box::new(self.expr(expr)?))
    }

    /// Rebuilds the expression, transforming nested functions independently.
    fn expr(&mut self, expr: &Expr) -> Result<Expr, TransformError> {
        let kind = match &expr.kind {
            ExprKind::Ident(_)
            | ExprKind::This
            | ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Regex { .. } => return Ok(expr.clone()),
            ExprKind::Array(elems) => ExprKind::Array(self.exprs(elems)?),
            ExprKind::Object(props) => {
                let mut out = Vec::with_capacity(props.len());
                for p in props {
                    out.push(Property {
                        span: p.span,
                        key: p.key.clone(),
                        value: self.expr(&p.value)?,
                    });
                }
                ExprKind::Object(out)
            }
            ExprKind::Function(f) => ExprKind::Function(Box::new(self.function(f)?)),
            ExprKind::Unary { op, expr: inner } => ExprKind::Unary {
                op: *op,
                expr: self.boxed(inner)?,
            },
            ExprKind::Update { op, prefix, target } => ExprKind::Update {
                op: *op,
                prefix: *prefix,
                target: self.boxed(target)?,
            },
            ExprKind::Binary { left, op, right } => ExprKind::Binary {
                left: self.boxed(left)?,
                op: *op,
                right: self.boxed(right)?,
            },
            ExprKind::Logical { left, op, right } => ExprKind::Logical {
                left: self.boxed(left)?,
                op: *op,
                right: self.boxed(right)?,
            },
            ExprKind::Assign { op, target, value } => ExprKind::Assign {
                op: *op,
                target: self.boxed(target)?,
                value: self.boxed(value)?,
            },
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => ExprKind::Conditional {
                test: self.boxed(test)?,
                consequent: self.boxed(consequent)?,
                alternate: self.boxed(alternate)?,
            },
            ExprKind::Member { object, property } => ExprKind::Member {
                object: self.boxed(object)?,
                property: property.clone(),
            },
            ExprKind::Index { object, index } => ExprKind::Index {
                object: self.boxed(object)?,
                index: self.boxed(index)?,
            },
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: self.boxed(callee)?,
                args: self.exprs(args)?,
            },
            ExprKind::New { callee, args } => ExprKind::New {
                callee: self.boxed(callee)?,
                args: self.exprs(args)?,
            },
        };
        Ok(Expr {
            span: expr.span,
            kind,
        })
    }
}

/// Splices argument guards in front of the body, in parameter order.
fn prefix_body(
    body: FunctionBody,
    guards: Vec<Stmt>,
    span: Span,
) -> Result<FunctionBody, TransformError> {
    if guards.is_empty() {
        return Ok(body);
    }
    match body {
        FunctionBody::Block(mut b) => {
            b.stmts.splice(0..0, guards);
            Ok(FunctionBody::Block(b))
        }
        FunctionBody::Expr(_) => Err(TransformError::Internal {
            message: "cannot insert guards into an expression body".to_string(),
            span,
        }),
    }
}

fn is_constructor(m: &ClassMethod) -> bool {
    !m.is_static && m.key.node == "constructor"
}

fn synthesized_constructor(span: Span, guards: Vec<Stmt>) -> ClassMethod {
    let key = flowguard_ast::ident(span, "constructor");
    ClassMethod {
        span,
        key: key.clone(),
        is_static: false,
        function: Function {
            span,
            name: Some(key),
            type_params: Vec::new(),
            params: Vec::new(),
            return_type: None,
            body: FunctionBody::Block(Block {
                span,
                stmts: guards,
            }),
            is_arrow: false,
        },
    }
}

fn prepend_guards(body: Stmt, guards: Vec<Stmt>) -> Stmt {
    if guards.is_empty() {
        return body;
    }
    let mut block = body.into_block();
    block.stmts.splice(0..0, guards);
    Stmt::Block(block)
}
