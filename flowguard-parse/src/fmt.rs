#![forbid(unsafe_code)]

use flowguard_ast::{
    AssignOp, BinOp, Block, ClassDecl, Declarator, Expr, ExprKind, ForBinding, ForInKind, ForInit,
    Function, FunctionBody, IfStmt, LogicalOp, Param, Program, Stmt, TypeAnnotation, TypeKind,
    UnaryOp, UpdateOp, VarDecl,
};

const INDENT: &str = "    ";

/// Prints the program back to source, annotations included.
pub fn format_program(program: &Program) -> String {
    let mut p = Printer::new(true);
    p.program(program);
    p.out
}

/// Prints the program as plain script: type annotations, type parameters and
/// type aliases are erased.
pub fn emit_program(program: &Program) -> String {
    let mut p = Printer::new(false);
    p.program(program);
    p.out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut p = Printer::new(true);
    p.expr(expr, Prec::Lowest);
    p.out
}

pub fn format_type(ty: &TypeAnnotation) -> String {
    let mut p = Printer::new(true);
    p.ty(ty);
    p.out
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Conditional,
    Or,
    And,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
    Postfix,
    Call,
    Primary,
}

impl Prec {
    fn tighter(self) -> Prec {
        match self {
            Prec::Lowest => Prec::Conditional,
            Prec::Conditional => Prec::Or,
            Prec::Or => Prec::And,
            Prec::And => Prec::Equality,
            Prec::Equality => Prec::Relational,
            Prec::Relational => Prec::Additive,
            Prec::Additive => Prec::Multiplicative,
            Prec::Multiplicative => Prec::Unary,
            Prec::Unary => Prec::Postfix,
            Prec::Postfix => Prec::Call,
            Prec::Call | Prec::Primary => Prec::Primary,
        }
    }
}

fn bin_prec(op: BinOp) -> Prec {
    match op {
        BinOp::LooseEq | BinOp::LooseNe | BinOp::StrictEq | BinOp::StrictNe => Prec::Equality,
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::InstanceOf | BinOp::In => {
            Prec::Relational
        }
        BinOp::Add | BinOp::Sub => Prec::Additive,
        BinOp::Mul | BinOp::Div | BinOp::Rem => Prec::Multiplicative,
    }
}

fn expr_prec(expr: &Expr) -> Prec {
    match &expr.kind {
        ExprKind::Assign { .. } => Prec::Lowest,
        ExprKind::Function(f) if f.is_arrow => Prec::Lowest,
        ExprKind::Conditional { .. } => Prec::Conditional,
        ExprKind::Logical {
            op: LogicalOp::Or, ..
        } => Prec::Or,
        ExprKind::Logical {
            op: LogicalOp::And, ..
        } => Prec::And,
        ExprKind::Binary { op, .. } => bin_prec(*op),
        ExprKind::Unary { .. } | ExprKind::Update { prefix: true, .. } => Prec::Unary,
        ExprKind::Number(n) if *n < 0.0 => Prec::Unary,
        ExprKind::Update { prefix: false, .. } => Prec::Postfix,
        ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } | ExprKind::New { .. } => {
            Prec::Call
        }
        _ => Prec::Primary,
    }
}

/// The expression printed first when `expr` is written out.
fn leftmost(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Binary { left, .. } | ExprKind::Logical { left, .. } => leftmost(left),
        ExprKind::Assign { target, .. } => leftmost(target),
        ExprKind::Conditional { test, .. } => leftmost(test),
        ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => leftmost(object),
        ExprKind::Call { callee, .. } => leftmost(callee),
        ExprKind::Update {
            prefix: false,
            target,
            ..
        } => leftmost(target),
        _ => expr,
    }
}

/// Statement-position expressions may not start with `function` or `{`.
fn needs_stmt_parens(expr: &Expr) -> bool {
    match &leftmost(expr).kind {
        ExprKind::Object(_) => true,
        ExprKind::Function(f) => !f.is_arrow,
        _ => false,
    }
}

fn is_plain_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

struct Printer {
    out: String,
    indent: usize,
    annotations: bool,
}

impl Printer {
    fn new(annotations: bool) -> Self {
        Self {
            out: String::new(),
            indent: 0,
            annotations,
        }
    }

    fn program(&mut self, program: &Program) {
        for stmt in &program.stmts {
            self.stmt(stmt);
        }
    }

    fn line(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Function(f) => {
                self.line();
                self.function(f, "function ");
                self.out.push('\n');
            }
            Stmt::Class(c) => self.class(c),
            Stmt::TypeAlias(t) => {
                if !self.annotations {
                    return;
                }
                self.line();
                self.out.push_str("type ");
                self.out.push_str(&t.name.node);
                self.type_params(&t.params);
                self.out.push_str(" = ");
                self.ty(&t.target);
                self.out.push_str(";\n");
            }
            Stmt::VarDecl(d) => {
                self.line();
                self.var_decl(d);
                self.out.push_str(";\n");
            }
            Stmt::Return(r) => {
                self.line();
                self.out.push_str("return");
                if let Some(arg) = &r.arg {
                    self.out.push(' ');
                    self.expr(arg, Prec::Lowest);
                }
                self.out.push_str(";\n");
            }
            Stmt::If(s) => {
                self.line();
                self.if_stmt(s);
            }
            Stmt::For(s) => {
                self.line();
                self.out.push_str("for (");
                match &s.init {
                    Some(ForInit::Decl(d)) => self.var_decl(d),
                    Some(ForInit::Expr(e)) => self.expr(e, Prec::Lowest),
                    None => {}
                }
                self.out.push(';');
                if let Some(test) = &s.test {
                    self.out.push(' ');
                    self.expr(test, Prec::Lowest);
                }
                self.out.push(';');
                if let Some(update) = &s.update {
                    self.out.push(' ');
                    self.expr(update, Prec::Lowest);
                }
                self.out.push(')');
                self.body_clause(&s.body, true);
            }
            Stmt::ForIn(s) => {
                self.line();
                self.out.push_str("for (");
                match &s.left {
                    ForBinding::Decl(d) => self.var_decl(d),
                    ForBinding::Target(id) => self.out.push_str(&id.node),
                }
                self.out.push_str(match s.kind {
                    ForInKind::In => " in ",
                    ForInKind::Of => " of ",
                });
                self.expr(&s.right, Prec::Lowest);
                self.out.push(')');
                self.body_clause(&s.body, true);
            }
            Stmt::While(s) => {
                self.line();
                self.out.push_str("while (");
                self.expr(&s.cond, Prec::Lowest);
                self.out.push(')');
                self.body_clause(&s.body, true);
            }
            Stmt::Block(b) => {
                self.line();
                self.block(b);
                self.out.push('\n');
            }
            Stmt::Throw(t) => {
                self.line();
                self.out.push_str("throw ");
                self.expr(&t.arg, Prec::Lowest);
                self.out.push_str(";\n");
            }
            Stmt::Break(_) => {
                self.line();
                self.out.push_str("break;\n");
            }
            Stmt::Continue(_) => {
                self.line();
                self.out.push_str("continue;\n");
            }
            Stmt::Expr(e) => {
                self.line();
                if needs_stmt_parens(e) {
                    self.out.push('(');
                    self.expr(e, Prec::Lowest);
                    self.out.push(')');
                } else {
                    self.expr(e, Prec::Lowest);
                }
                self.out.push_str(";\n");
            }
            Stmt::Empty(_) => {
                self.line();
                self.out.push_str(";\n");
            }
        }
    }

    fn if_stmt(&mut self, s: &IfStmt) {
        self.out.push_str("if (");
        self.expr(&s.cond, Prec::Lowest);
        self.out.push(')');
        let Some(alt) = &s.else_branch else {
            self.body_clause(&s.then_branch, true);
            return;
        };
        let braced = self.body_clause(&s.then_branch, false);
        if braced {
            self.out.push_str(" else");
        } else {
            self.line();
            self.out.push_str("else");
        }
        if let Stmt::If(inner) = alt.as_ref() {
            self.out.push(' ');
            self.if_stmt(inner);
        } else {
            self.body_clause(alt, true);
        }
    }

    /// Prints the body of a compound statement. Returns whether it was a braced
    /// block, in which case the closing brace ends the output unless `close` is set.
    fn body_clause(&mut self, body: &Stmt, close: bool) -> bool {
        match body {
            Stmt::Block(b) => {
                self.out.push(' ');
                self.block(b);
                if close {
                    self.out.push('\n');
                }
                true
            }
            other => {
                self.out.push('\n');
                self.indent += 1;
                self.stmt(other);
                self.indent -= 1;
                false
            }
        }
    }

    fn block(&mut self, block: &Block) {
        self.out.push('{');
        self.out.push('\n');
        self.indent += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.line();
        self.out.push('}');
    }

    fn class(&mut self, c: &ClassDecl) {
        self.line();
        self.out.push_str("class ");
        self.out.push_str(&c.name.node);
        self.out.push_str(" {\n");
        self.indent += 1;
        for p in &c.properties {
            self.line();
            if p.is_static {
                self.out.push_str("static ");
            }
            self.out.push_str(&p.key.node);
            if let Some(ty) = p.ty.as_ref().filter(|_| self.annotations) {
                self.out.push_str(": ");
                self.ty(ty);
            }
            if let Some(value) = &p.value {
                self.out.push_str(" = ");
                self.expr(value, Prec::Lowest);
            }
            self.out.push_str(";\n");
        }
        for m in &c.methods {
            self.line();
            if m.is_static {
                self.out.push_str("static ");
            }
            self.function(&m.function, "");
            self.out.push('\n');
        }
        self.indent -= 1;
        self.line();
        self.out.push_str("}\n");
    }

    fn var_decl(&mut self, d: &VarDecl) {
        self.out.push_str(d.kind.keyword());
        self.out.push(' ');
        for (i, decl) in d.decls.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.declarator(decl);
        }
    }

    fn declarator(&mut self, d: &Declarator) {
        self.out.push_str(&d.name.node);
        if let Some(ty) = d.ty.as_ref().filter(|_| self.annotations) {
            self.out.push_str(": ");
            self.ty(ty);
        }
        if let Some(init) = &d.init {
            self.out.push_str(" = ");
            self.expr(init, Prec::Lowest);
        }
    }

    /// Declarations, expressions and methods share this; `keyword` is
    /// `"function "` or empty for methods.
    fn function(&mut self, f: &Function, keyword: &str) {
        if f.is_arrow {
            self.params(&f.params);
            self.return_type(f);
            self.out.push_str(" => ");
            match &f.body {
                FunctionBody::Block(b) => self.block(b),
                FunctionBody::Expr(e) => {
                    if needs_stmt_parens(e) {
                        self.out.push('(');
                        self.expr(e, Prec::Lowest);
                        self.out.push(')');
                    } else {
                        self.expr(e, Prec::Lowest);
                    }
                }
            }
            return;
        }

        self.out.push_str(keyword);
        if let Some(name) = &f.name {
            self.out.push_str(&name.node);
        }
        self.type_params(&f.type_params);
        self.params(&f.params);
        self.return_type(f);
        self.out.push(' ');
        match &f.body {
            FunctionBody::Block(b) => self.block(b),
            FunctionBody::Expr(e) => {
                self.out.push_str("{\n");
                self.indent += 1;
                self.line();
                self.out.push_str("return ");
                self.expr(e, Prec::Lowest);
                self.out.push_str(";\n");
                self.indent -= 1;
                self.line();
                self.out.push('}');
            }
        }
    }

    fn type_params(&mut self, params: &[flowguard_ast::Ident]) {
        if params.is_empty() || !self.annotations {
            return;
        }
        self.out.push('<');
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&p.node);
        }
        self.out.push('>');
    }

    fn params(&mut self, params: &[Param]) {
        self.out.push('(');
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            if p.rest {
                self.out.push_str("...");
            }
            self.out.push_str(&p.name.node);
            if self.annotations {
                if p.optional {
                    self.out.push('?');
                }
                if let Some(ty) = &p.ty {
                    self.out.push_str(": ");
                    self.ty(ty);
                }
            }
            if let Some(d) = &p.default {
                self.out.push_str(" = ");
                self.expr(d, Prec::Lowest);
            }
        }
        self.out.push(')');
    }

    fn return_type(&mut self, f: &Function) {
        if let Some(ty) = f.return_type.as_ref().filter(|_| self.annotations) {
            self.out.push_str(": ");
            self.ty(ty);
        }
    }

    fn expr(&mut self, expr: &Expr, parent: Prec) {
        let prec = expr_prec(expr);
        let parens = prec < parent;
        if parens {
            self.out.push('(');
        }
        self.expr_inner(expr, prec);
        if parens {
            self.out.push(')');
        }
    }

    fn expr_inner(&mut self, expr: &Expr, prec: Prec) {
        match &expr.kind {
            ExprKind::Ident(id) => self.out.push_str(&id.node),
            ExprKind::This => self.out.push_str("this"),
            ExprKind::Null => self.out.push_str("null"),
            ExprKind::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            ExprKind::Number(n) => self.out.push_str(&format_number(*n)),
            ExprKind::String(s) => self.string_lit(s),
            ExprKind::Regex { pattern, flags } => {
                self.out.push('/');
                self.out.push_str(pattern);
                self.out.push('/');
                self.out.push_str(flags);
            }
            ExprKind::Array(elems) => {
                self.out.push('[');
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(e, Prec::Lowest);
                }
                self.out.push(']');
            }
            ExprKind::Object(props) => {
                if props.is_empty() {
                    self.out.push_str("{}");
                    return;
                }
                self.out.push_str("{ ");
                for (i, p) in props.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.property_key(&p.key.node);
                    self.out.push_str(": ");
                    self.expr(&p.value, Prec::Lowest);
                }
                self.out.push_str(" }");
            }
            ExprKind::Function(f) => self.function(f, "function "),
            ExprKind::Unary { op, expr: inner } => {
                let sym = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::TypeOf => "typeof ",
                    UnaryOp::Void => "void ",
                };
                self.out.push_str(sym);
                let start = self.out.len();
                self.expr(inner, Prec::Unary);
                // `- -x` must not print as `--x`.
                let printed = &self.out[start..];
                if (sym == "-" && printed.starts_with('-')) || (sym == "+" && printed.starts_with('+')) {
                    self.out.insert(start, ' ');
                }
            }
            ExprKind::Update { op, prefix, target } => {
                let sym = match op {
                    UpdateOp::Inc => "++",
                    UpdateOp::Dec => "--",
                };
                if *prefix {
                    self.out.push_str(sym);
                    self.expr(target, Prec::Unary);
                } else {
                    self.expr(target, Prec::Call);
                    self.out.push_str(sym);
                }
            }
            ExprKind::Binary { left, op, right } => {
                self.expr(left, prec);
                self.out.push(' ');
                self.out.push_str(op.symbol());
                self.out.push(' ');
                self.expr(right, prec.tighter());
            }
            ExprKind::Logical { left, op, right } => {
                self.expr(left, prec);
                self.out.push_str(match op {
                    LogicalOp::And => " && ",
                    LogicalOp::Or => " || ",
                });
                self.expr(right, prec.tighter());
            }
            ExprKind::Assign { op, target, value } => {
                self.expr(target, Prec::Call);
                self.out.push_str(match op {
                    AssignOp::Assign => " = ",
                    AssignOp::AddAssign => " += ",
                    AssignOp::SubAssign => " -= ",
                });
                self.expr(value, Prec::Lowest);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, Prec::Or);
                self.out.push_str(" ? ");
                self.expr(consequent, Prec::Lowest);
                self.out.push_str(" : ");
                self.expr(alternate, Prec::Lowest);
            }
            ExprKind::Member { object, property } => {
                self.member_object(object);
                self.out.push('.');
                self.out.push_str(&property.node);
            }
            ExprKind::Index { object, index } => {
                self.member_object(object);
                self.out.push('[');
                self.expr(index, Prec::Lowest);
                self.out.push(']');
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee, Prec::Call);
                self.args(args);
            }
            ExprKind::New { callee, args } => {
                self.out.push_str("new ");
                if is_static_path(callee) {
                    self.expr(callee, Prec::Call);
                } else {
                    self.out.push('(');
                    self.expr(callee, Prec::Lowest);
                    self.out.push(')');
                }
                self.args(args);
            }
        }
    }

    fn member_object(&mut self, object: &Expr) {
        if matches!(object.kind, ExprKind::Number(_)) {
            self.out.push('(');
            self.expr(object, Prec::Lowest);
            self.out.push(')');
        } else {
            self.expr(object, Prec::Call);
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(a, Prec::Lowest);
        }
        self.out.push(')');
    }

    fn property_key(&mut self, key: &str) {
        if is_plain_ident(key) {
            self.out.push_str(key);
        } else {
            self.string_lit(key);
        }
    }

    fn string_lit(&mut self, s: &str) {
        self.out.push('"');
        for ch in s.chars() {
            match ch {
                '\n' => self.out.push_str("\\n"),
                '\t' => self.out.push_str("\\t"),
                '\r' => self.out.push_str("\\r"),
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                other if other.is_control() => {
                    let cp = other as u32;
                    self.out.push_str(&format!("\\u{cp:04x}"));
                }
                other => self.out.push(other),
            }
        }
        self.out.push('"');
    }

    fn ty(&mut self, ty: &TypeAnnotation) {
        match &ty.kind {
            TypeKind::String => self.out.push_str("string"),
            TypeKind::Number => self.out.push_str("number"),
            TypeKind::Boolean => self.out.push_str("boolean"),
            TypeKind::Symbol => self.out.push_str("symbol"),
            TypeKind::Void => self.out.push_str("void"),
            TypeKind::Null => self.out.push_str("null"),
            TypeKind::Any => self.out.push_str("any"),
            TypeKind::Mixed => self.out.push_str("mixed"),
            TypeKind::Nullable(inner) => {
                self.out.push('?');
                self.ty_grouped(inner);
            }
            TypeKind::Union(members) => self.ty_list(members, " | "),
            TypeKind::Intersection(members) => self.ty_list(members, " & "),
            TypeKind::Parenthesized(inner) => {
                self.out.push('(');
                self.ty(inner);
                self.out.push(')');
            }
            TypeKind::Generic { name, args } => {
                for (i, seg) in name.iter().enumerate() {
                    if i > 0 {
                        self.out.push('.');
                    }
                    self.out.push_str(&seg.node);
                }
                if !args.is_empty() {
                    self.out.push('<');
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        self.ty(a);
                    }
                    self.out.push('>');
                }
            }
            TypeKind::Object(props) => {
                if props.is_empty() {
                    self.out.push_str("{}");
                    return;
                }
                self.out.push_str("{ ");
                for (i, p) in props.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.property_key(&p.key.node);
                    if p.optional {
                        self.out.push('?');
                    }
                    self.out.push_str(": ");
                    self.ty(&p.value);
                }
                self.out.push_str(" }");
            }
            TypeKind::Tuple(elems) => {
                self.out.push('[');
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.ty(e);
                }
                self.out.push(']');
            }
            TypeKind::Array(elem) => {
                self.ty_grouped(elem);
                self.out.push_str("[]");
            }
            TypeKind::Function { params, ret } => {
                self.out.push('(');
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if let Some(name) = &p.name {
                        self.out.push_str(&name.node);
                        if p.optional {
                            self.out.push('?');
                        }
                        self.out.push_str(": ");
                    }
                    self.ty(&p.ty);
                }
                self.out.push_str(") => ");
                self.ty(ret);
            }
            TypeKind::Typeof(id) => {
                self.out.push_str("typeof ");
                self.out.push_str(&id.node);
            }
        }
    }

    fn ty_list(&mut self, members: &[TypeAnnotation], sep: &str) {
        for (i, m) in members.iter().enumerate() {
            if i > 0 {
                self.out.push_str(sep);
            }
            self.ty_grouped(m);
        }
    }

    /// Compound types nested in a tighter position get parentheses.
    fn ty_grouped(&mut self, ty: &TypeAnnotation) {
        let compound = matches!(
            ty.kind,
            TypeKind::Union(_) | TypeKind::Intersection(_) | TypeKind::Function { .. }
        );
        if compound {
            self.out.push('(');
            self.ty(ty);
            self.out.push(')');
        } else {
            self.ty(ty);
        }
    }
}

fn is_static_path(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Member { object, .. } => is_static_path(object),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_idempotent(src: &str) {
        let program = crate::parse_source(src).unwrap();
        let formatted1 = format_program(&program);
        let program2 = crate::parse_source(&formatted1).unwrap();
        let formatted2 = format_program(&program2);
        assert_eq!(formatted1, formatted2);
    }

    #[test]
    fn fmt_roundtrip_basic() {
        is_idempotent("function f(a: string, b?: number): string {\n  return a + b;\n}\nvar x = f(\"hi\\n\", 1);\n");
    }

    #[test]
    fn fmt_roundtrip_generic_type_alias_syntax() {
        is_idempotent("type Box<T> = Array<T>;\nconst x: Box<number> = [1, 2, 3];\n");
    }

    #[test]
    fn fmt_parenthesizes_by_precedence() {
        let e = crate::parse_expr("(a + b) * c - (d - e)").unwrap();
        assert_eq!(format_expr(&e), "(a + b) * c - (d - e)");
        let e = crate::parse_expr("!(a && b) || typeof c === \"string\"").unwrap();
        assert_eq!(format_expr(&e), "!(a && b) || typeof c === \"string\"");
        let e = crate::parse_expr("- -x").unwrap();
        assert_eq!(format_expr(&e), "- -x");
    }

    #[test]
    fn emit_strips_annotations() {
        let program = crate::parse_source(
            "type T = string;\nfunction f<U>(a?: T, ...rest: U[]): ?T { return a; }\nconst v: number = 1;\n",
        )
        .unwrap();
        assert_eq!(
            emit_program(&program),
            "function f(a, ...rest) {\n    return a;\n}\nconst v = 1;\n"
        );
    }

    #[test]
    fn class_properties_print_before_methods() {
        let src = "class A {\n    static count: number = 0;\n    x: ?string;\n    get(): number {\n        return 1;\n    }\n}\n";
        is_idempotent(src);
        let program = crate::parse_source(src).unwrap();
        assert_eq!(format_program(&program), src);
        assert_eq!(
            emit_program(&program),
            "class A {\n    static count = 0;\n    x;\n    get() {\n        return 1;\n    }\n}\n"
        );
    }
}
