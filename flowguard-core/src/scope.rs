#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use flowguard_ast::{Expr, ExprKind, ForBinding, ForInit, Function, FunctionBody, Program, Stmt, VarDecl, VarKind};

use crate::verifier::ConstantLookup;
use crate::visit::{walk_program, Visit};

#[derive(Clone, Debug)]
enum Binding {
    Constant(Option<Expr>),
    Mutable,
}

/// Function frames hold parameters, `var`s and function declarations; block
/// frames hold `let`, `const` and classes.
#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<String, Binding>,
}

impl Frame {
    fn declare_mutable(&mut self, name: &str) {
        self.bindings.insert(name.to_string(), Binding::Mutable);
    }

    fn declare_lexical(&mut self, decl: &VarDecl) {
        for d in &decl.decls {
            let binding = match decl.kind {
                VarKind::Const => Binding::Constant(d.init.clone()),
                VarKind::Let | VarKind::Var => Binding::Mutable,
            };
            self.bindings.insert(d.name.node.clone(), binding);
        }
    }

    /// Declarations made directly in a statement list.
    fn declare_statements(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::VarDecl(d) if d.kind != VarKind::Var => self.declare_lexical(d),
                Stmt::Function(f) => {
                    if let Some(name) = &f.name {
                        self.declare_mutable(&name.node);
                    }
                }
                Stmt::Class(c) => self.declare_mutable(&c.name.node),
                _ => {}
            }
        }
    }

    /// `var` declarations anywhere in the body, stopping at nested functions.
    fn hoist_vars(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.hoist_stmt(stmt);
        }
    }

    fn hoist_var_decl(&mut self, decl: &VarDecl) {
        if decl.kind == VarKind::Var {
            for d in &decl.decls {
                self.declare_mutable(&d.name.node);
            }
        }
    }

    fn hoist_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(d) => self.hoist_var_decl(d),
            Stmt::If(s) => {
                self.hoist_stmt(&s.then_branch);
                if let Some(alt) = &s.else_branch {
                    self.hoist_stmt(alt);
                }
            }
            Stmt::For(s) => {
                if let Some(ForInit::Decl(d)) = &s.init {
                    self.hoist_var_decl(d);
                }
                self.hoist_stmt(&s.body);
            }
            Stmt::ForIn(s) => {
                if let ForBinding::Decl(d) = &s.left {
                    self.hoist_var_decl(d);
                }
                self.hoist_stmt(&s.body);
            }
            Stmt::While(s) => self.hoist_stmt(&s.body),
            Stmt::Block(b) => self.hoist_vars(&b.stmts),
            _ => {}
        }
    }
}

/// Binding frames, innermost last.
#[derive(Debug)]
pub struct Scopes {
    frames: Vec<Frame>,
}

impl Scopes {
    pub fn for_program(program: &Program) -> Self {
        let mut frame = Frame::default();
        frame.hoist_vars(&program.stmts);
        frame.declare_statements(&program.stmts);
        Self {
            frames: vec![frame],
        }
    }

    pub fn push_function(&mut self, f: &Function) {
        let mut frame = Frame::default();
        for p in &f.params {
            frame.declare_mutable(&p.name.node);
        }
        if let FunctionBody::Block(b) = &f.body {
            frame.hoist_vars(&b.stmts);
            frame.declare_statements(&b.stmts);
        }
        self.frames.push(frame);
    }

    pub fn push_block(&mut self, stmts: &[Stmt]) {
        let mut frame = Frame::default();
        frame.declare_statements(stmts);
        self.frames.push(frame);
    }

    pub fn push_loop_head(&mut self, decl: Option<&VarDecl>) {
        let mut frame = Frame::default();
        if let Some(d) = decl.filter(|d| d.kind != VarKind::Var) {
            frame.declare_lexical(d);
        }
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        // The program frame stays.
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl ConstantLookup for Scopes {
    fn constant_init(&self, name: &str) -> Option<&Expr> {
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.bindings.get(name) {
                return match binding {
                    Binding::Constant(init) => init.as_ref(),
                    Binding::Mutable => None,
                };
            }
        }
        None
    }
}

/// Hands out temporary names that collide with nothing in the unit.
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

struct NameCollector<'a> {
    names: &'a mut HashSet<String>,
}

impl Visit for NameCollector<'_> {
    fn expr(&mut self, expr: &Expr) {
        if let ExprKind::Ident(id) = &expr.kind {
            self.names.insert(id.node.clone());
        }
    }

    fn binding(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }
}

impl NameAllocator {
    pub fn for_program(program: &Program) -> Self {
        let mut taken = HashSet::new();
        walk_program(&mut NameCollector { names: &mut taken }, program);
        Self { taken }
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// `compute()` becomes `_compute`, `a.b` becomes `_b`, anything else `_ref`.
    pub fn fresh(&mut self, hint: &Expr) -> String {
        let base = format!("_{}", hint_name(hint).unwrap_or("ref"));
        let name = self.unused(&base, |_| false);
        self.taken.insert(name.clone());
        name
    }

    /// First of `base`, `base2`, `base3`, ... that is neither in use nor
    /// rejected. Nothing is reserved.
    pub fn unused(&self, base: &str, reject: impl Fn(&str) -> bool) -> String {
        let mut name = base.to_string();
        let mut n = 2;
        while self.taken.contains(&name) || reject(&name) {
            name = format!("{base}{n}");
            n += 1;
        }
        name
    }
}

fn hint_name(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Ident(id) => Some(id.node.as_str()),
        ExprKind::Member { property, .. } => Some(property.node.as_str()),
        ExprKind::Call { callee, .. } | ExprKind::New { callee, .. } => hint_name(callee),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Program {
        flowguard_parse::parse_source(src).expect("parse")
    }

    fn init_of(scopes: &Scopes, name: &str) -> Option<String> {
        scopes
            .constant_init(name)
            .map(flowguard_parse::format_expr)
    }

    #[test]
    fn temporaries_skip_names_in_use() {
        let p = program("const _f = 1;\nlet x = f();\n");
        let mut names = NameAllocator::for_program(&p);
        assert!(names.is_taken("_f"));
        assert!(names.is_taken("x"));
        let call = flowguard_parse::parse_expr("f()").expect("parse");
        assert_eq!(names.fresh(&call), "_f2");
        assert_eq!(names.fresh(&call), "_f3");
        let member = flowguard_parse::parse_expr("a.b.c").expect("parse");
        assert_eq!(names.fresh(&member), "_c");
        let other = flowguard_parse::parse_expr("1 + 2").expect("parse");
        assert_eq!(names.fresh(&other), "_ref");
    }

    #[test]
    fn unused_names_are_not_reserved() {
        let p = program("class item {}\nlet item3 = 1;\n");
        let names = NameAllocator::for_program(&p);
        assert_eq!(names.unused("item", |_| false), "item2");
        assert_eq!(names.unused("item", |_| false), "item2");
        assert_eq!(names.unused("item", |n| n == "item2"), "item4");
        assert_eq!(names.unused("elem", |_| false), "elem");
    }

    #[test]
    fn inner_bindings_shadow_constants() {
        let p = program("const a = \"s\";\nconst b = a;\nlet m = 1;\n");
        let mut scopes = Scopes::for_program(&p);
        assert_eq!(init_of(&scopes, "a").as_deref(), Some("\"s\""));
        assert_eq!(init_of(&scopes, "b").as_deref(), Some("a"));
        assert_eq!(init_of(&scopes, "m"), None);

        let inner = program("let a = 2;\n");
        scopes.push_block(&inner.stmts);
        assert_eq!(init_of(&scopes, "a"), None);
        assert_eq!(scopes.depth(), 2);
        scopes.pop();
        assert_eq!(init_of(&scopes, "a").as_deref(), Some("\"s\""));
        scopes.pop();
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn hoisted_vars_hide_outer_constants() {
        let p = program("const a = 1;\nfunction f() { if (x) { var a = 2; } }\n");
        let mut scopes = Scopes::for_program(&p);
        let Stmt::Function(f) = &p.stmts[1] else {
            panic!("expected a function");
        };
        scopes.push_function(f);
        assert_eq!(init_of(&scopes, "a"), None);
        scopes.pop();
        assert_eq!(init_of(&scopes, "a").as_deref(), Some("1"));
    }
}
