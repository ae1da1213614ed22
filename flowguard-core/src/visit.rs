#![forbid(unsafe_code)]

use flowguard_ast::{
    Block, Expr, ExprKind, ForBinding, ForInit, Function, FunctionBody, Program, Stmt, VarDecl,
};

/// Read-only visitor over a whole unit, nested functions included.
pub(crate) trait Visit {
    fn stmt(&mut self, _stmt: &Stmt) {}
    fn expr(&mut self, _expr: &Expr) {}
    fn binding(&mut self, _name: &str) {}
}

pub(crate) fn walk_program(v: &mut impl Visit, program: &Program) {
    walk_stmts(v, &program.stmts);
}

pub(crate) fn walk_stmts(v: &mut impl Visit, stmts: &[Stmt]) {
    for stmt in stmts {
        walk_stmt(v, stmt);
    }
}

fn walk_block(v: &mut impl Visit, block: &Block) {
    walk_stmts(v, &block.stmts);
}

fn walk_var_decl(v: &mut impl Visit, decl: &VarDecl) {
    for d in &decl.decls {
        v.binding(&d.name.node);
        if let Some(init) = &d.init {
            walk_expr(v, init);
        }
    }
}

pub(crate) fn walk_function(v: &mut impl Visit, f: &Function) {
    if let Some(name) = &f.name {
        v.binding(&name.node);
    }
    for p in &f.params {
        v.binding(&p.name.node);
        if let Some(d) = &p.default {
            walk_expr(v, d);
        }
    }
    match &f.body {
        FunctionBody::Block(b) => walk_block(v, b),
        FunctionBody::Expr(e) => walk_expr(v, e),
    }
}

fn walk_stmt(v: &mut impl Visit, stmt: &Stmt) {
    v.stmt(stmt);
    match stmt {
        Stmt::Function(f) => walk_function(v, f),
        Stmt::Class(c) => {
            v.binding(&c.name.node);
            for value in c.properties.iter().filter_map(|p| p.value.as_ref()) {
                walk_expr(v, value);
            }
            for m in &c.methods {
                walk_function(v, &m.function);
            }
        }
        Stmt::TypeAlias(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Empty(_) => {}
        Stmt::VarDecl(d) => walk_var_decl(v, d),
        Stmt::Return(r) => {
            if let Some(arg) = &r.arg {
                walk_expr(v, arg);
            }
        }
        Stmt::If(s) => {
            walk_expr(v, &s.cond);
            walk_stmt(v, &s.then_branch);
            if let Some(alt) = &s.else_branch {
                walk_stmt(v, alt);
            }
        }
        Stmt::For(s) => {
            match &s.init {
                Some(ForInit::Decl(d)) => walk_var_decl(v, d),
                Some(ForInit::Expr(e)) => walk_expr(v, e),
                None => {}
            }
            if let Some(test) = &s.test {
                walk_expr(v, test);
            }
            if let Some(update) = &s.update {
                walk_expr(v, update);
            }
            walk_stmt(v, &s.body);
        }
        Stmt::ForIn(s) => {
            match &s.left {
                ForBinding::Decl(d) => walk_var_decl(v, d),
                ForBinding::Target(id) => v.binding(&id.node),
            }
            walk_expr(v, &s.right);
            walk_stmt(v, &s.body);
        }
        Stmt::While(s) => {
            walk_expr(v, &s.cond);
            walk_stmt(v, &s.body);
        }
        Stmt::Block(b) => walk_block(v, b),
        Stmt::Throw(t) => walk_expr(v, &t.arg),
        Stmt::Expr(e) => walk_expr(v, e),
    }
}

fn walk_expr(v: &mut impl Visit, expr: &Expr) {
    v.expr(expr);
    match &expr.kind {
        ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::Null
        | ExprKind::Bool(_)
        | ExprKind::Number(_)
        | ExprKind::String(_)
        | ExprKind::Regex { .. } => {}
        ExprKind::Array(elems) => {
            for e in elems {
                walk_expr(v, e);
            }
        }
        ExprKind::Object(props) => {
            for p in props {
                walk_expr(v, &p.value);
            }
        }
        ExprKind::Function(f) => walk_function(v, f),
        ExprKind::Unary { expr, .. } => walk_expr(v, expr),
        ExprKind::Update { target, .. } => walk_expr(v, target),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            walk_expr(v, left);
            walk_expr(v, right);
        }
        ExprKind::Assign { target, value, .. } => {
            walk_expr(v, target);
            walk_expr(v, value);
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            walk_expr(v, test);
            walk_expr(v, consequent);
            walk_expr(v, alternate);
        }
        ExprKind::Member { object, .. } => walk_expr(v, object),
        ExprKind::Index { object, index } => {
            walk_expr(v, object);
            walk_expr(v, index);
        }
        ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
            walk_expr(v, callee);
            for a in args {
                walk_expr(v, a);
            }
        }
    }
}
