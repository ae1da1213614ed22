use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use flowguard_ast::{
    AssignOp, BinOp, Block, ClassDecl, ClassProperty, Expr, ExprKind, ForBinding, ForInKind,
    ForInStmt, ForInit, ForStmt, Function, FunctionBody, LogicalOp, Program, Span, Stmt, UnaryOp,
    UpdateOp, VarDecl, VarKind,
};

use crate::error::RuntimeError;
use crate::value::{
    array_index, lookup, new_object, number_to_string, Callable, ClassCtor, Closure, NativeFn,
    ObjRef, ObjectKind, Value,
};

const MAX_CALL_DEPTH: usize = 64;

/// Why evaluation stopped early: a thrown program value, or an evaluator failure.
pub enum Throw {
    Value(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Throw {
    fn from(err: RuntimeError) -> Self {
        Throw::Error(err)
    }
}

type Eval<T> = Result<T, Throw>;

enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub type EnvRef = Rc<RefCell<Env>>;

/// One lexical environment. Function environments carry `this`; arrows and
/// blocks inherit it from their parent.
#[derive(Default)]
pub struct Env {
    vars: HashMap<String, Value>,
    parent: Option<EnvRef>,
    this: Option<Value>,
}

fn child_env(parent: &EnvRef) -> EnvRef {
    Rc::new(RefCell::new(Env {
        vars: HashMap::new(),
        parent: Some(parent.clone()),
        this: None,
    }))
}

fn declare(env: &EnvRef, name: &str, value: Value) {
    env.borrow_mut().vars.insert(name.to_string(), value);
}

fn get_var(env: &EnvRef, name: &str) -> Option<Value> {
    let mut current = Some(env.clone());
    while let Some(e) = current {
        let e = e.borrow();
        if let Some(v) = e.vars.get(name) {
            return Some(v.clone());
        }
        current = e.parent.clone();
    }
    None
}

/// Writes to the nearest existing binding; false when the name is unbound.
fn set_var(env: &EnvRef, name: &str, value: Value) -> bool {
    let mut current = Some(env.clone());
    while let Some(e) = current {
        let mut e = e.borrow_mut();
        if let Some(slot) = e.vars.get_mut(name) {
            *slot = value;
            return true;
        }
        current = e.parent.clone();
    }
    false
}

fn this_value(env: &EnvRef) -> Value {
    let mut current = Some(env.clone());
    while let Some(e) = current {
        let e = e.borrow();
        if let Some(this) = &e.this {
            return this.clone();
        }
        current = e.parent.clone();
    }
    Value::Undefined
}

/// Prototypes of the builtin constructors.
struct Realm {
    object_proto: ObjRef,
    function_proto: ObjRef,
    array_proto: ObjRef,
    regexp_proto: ObjRef,
    type_error_proto: ObjRef,
    reference_error_proto: ObjRef,
}

#[derive(Clone, Debug)]
pub struct ExecOutcome {
    /// Completion value of the last top-level expression statement.
    pub value: Value,
    /// Everything written through `console.log`.
    pub stdout: String,
}

pub struct Interpreter {
    global: EnvRef,
    realm: Realm,
    stdout: String,
    depth: usize,
    call_span: Span,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let object_proto = new_object(ObjectKind::Plain, None);
        let function_proto = new_object(
            ObjectKind::Function(Callable::Native(native_noop)),
            Some(object_proto.clone()),
        );
        let plain = |proto: &ObjRef| new_object(ObjectKind::Plain, Some(proto.clone()));
        let array_proto = plain(&object_proto);
        let regexp_proto = plain(&object_proto);
        let error_proto = plain(&object_proto);
        let type_error_proto = plain(&error_proto);
        let reference_error_proto = plain(&error_proto);

        let realm = Realm {
            object_proto,
            function_proto,
            array_proto,
            regexp_proto,
            type_error_proto,
            reference_error_proto,
        };
        let global = Rc::new(RefCell::new(Env {
            this: Some(Value::Undefined),
            ..Env::default()
        }));
        let interp = Self {
            global,
            realm,
            stdout: String::new(),
            depth: 0,
            call_span: flowguard_ast::span(0, 0),
        };
        interp.install_globals(error_proto);
        interp
    }

    fn install_globals(&self, error_proto: ObjRef) {
        let r = &self.realm;
        let ctors: [(&str, NativeFn, ObjRef); 7] = [
            ("Object", native_object, r.object_proto.clone()),
            ("Function", native_function, r.function_proto.clone()),
            ("Array", native_array, r.array_proto.clone()),
            ("RegExp", native_regexp, r.regexp_proto.clone()),
            ("Error", native_error, error_proto.clone()),
            ("TypeError", native_error, r.type_error_proto.clone()),
            ("ReferenceError", native_error, r.reference_error_proto.clone()),
        ];
        for (name, f, proto) in ctors {
            let ctor = self.native(name, f);
            ctor.borrow_mut()
                .set_own("prototype", Value::Object(proto.clone()));
            proto
                .borrow_mut()
                .set_own("constructor", Value::Object(ctor.clone()));
            if name.ends_with("Error") {
                let mut p = proto.borrow_mut();
                p.set_own("name", Value::str(name));
                p.set_own("message", Value::str(""));
            }
            declare(&self.global, name, Value::Object(ctor));
        }

        let array_methods: [(&str, NativeFn); 4] = [
            ("push", native_array_push),
            ("some", native_array_some),
            ("every", native_array_every),
            ("join", native_array_join),
        ];
        for (name, f) in array_methods {
            let method = self.native(name, f);
            self.realm
                .array_proto
                .borrow_mut()
                .set_own(name, Value::Object(method));
        }
        let is_array = self.native("isArray", native_is_array);
        if let Some(Value::Object(array)) = get_var(&self.global, "Array") {
            array
                .borrow_mut()
                .set_own("isArray", Value::Object(is_array));
        }

        let console = new_object(ObjectKind::Plain, Some(self.realm.object_proto.clone()));
        let log = self.native("log", native_console_log);
        console.borrow_mut().set_own("log", Value::Object(log));
        declare(&self.global, "console", Value::Object(console));

        declare(&self.global, "undefined", Value::Undefined);
        declare(&self.global, "NaN", Value::Number(f64::NAN));
        declare(&self.global, "Infinity", Value::Number(f64::INFINITY));
    }

    fn native(&self, name: &str, f: NativeFn) -> ObjRef {
        let obj = new_object(
            ObjectKind::Function(Callable::Native(f)),
            Some(self.realm.function_proto.clone()),
        );
        obj.borrow_mut().set_own("name", Value::str(name));
        obj
    }

    /// Runs a whole unit. Bindings persist across calls on the same interpreter.
    pub fn exec_program(&mut self, program: &Program) -> Result<ExecOutcome, RuntimeError> {
        self.stdout.clear();
        let global = self.global.clone();
        let value = self.exec_top_level(&program.stmts, &global).map_err(|t| self.uncaught(t))?;
        Ok(ExecOutcome {
            value,
            stdout: self.stdout.clone(),
        })
    }

    /// Output of the last `exec_program`, including output written before a failure.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    fn exec_top_level(&mut self, stmts: &[Stmt], env: &EnvRef) -> Eval<Value> {
        hoist_vars(env, stmts);
        self.hoist_functions(env, stmts);
        let mut last = Value::Undefined;
        for stmt in stmts {
            match stmt {
                Stmt::Expr(e) => last = self.eval(e, env)?,
                other => {
                    self.exec_stmt(other, env)?;
                }
            }
        }
        Ok(last)
    }

    fn uncaught(&self, throw: Throw) -> RuntimeError {
        match throw {
            Throw::Error(err) => err,
            Throw::Value(Value::Object(o)) => RuntimeError::Uncaught {
                name: lookup(&o, "name")
                    .map(|v| v.to_js_string())
                    .unwrap_or_else(|| "Error".to_string()),
                message: lookup(&o, "message")
                    .map(|v| v.to_js_string())
                    .unwrap_or_else(|| Value::Object(o.clone()).to_js_string()),
            },
            Throw::Value(other) => RuntimeError::Uncaught {
                name: other.type_of().to_string(),
                message: other.to_js_string(),
            },
        }
    }

    fn throw_error(&self, proto: &ObjRef, message: impl Into<String>) -> Throw {
        let err = new_object(ObjectKind::Plain, Some(proto.clone()));
        err.borrow_mut()
            .set_own("message", Value::str(message.into()));
        Throw::Value(Value::Object(err))
    }

    fn type_error(&self, message: impl Into<String>) -> Throw {
        self.throw_error(&self.realm.type_error_proto, message)
    }

    fn unsupported(&self, span: Span, message: impl Into<String>) -> Throw {
        Throw::Error(RuntimeError::Unsupported {
            message: message.into(),
            span,
        })
    }

    // ----- statements -----

    fn hoist_functions(&mut self, env: &EnvRef, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::Function(f) = stmt {
                if let Some(name) = &f.name {
                    let closure = self.make_closure(f, env);
                    declare(env, &name.node, closure);
                }
            }
        }
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &EnvRef) -> Eval<Completion> {
        self.hoist_functions(env, stmts);
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, block: &Block, env: &EnvRef) -> Eval<Completion> {
        let scope = child_env(env);
        self.exec_stmts(&block.stmts, &scope)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &EnvRef) -> Eval<Completion> {
        match stmt {
            Stmt::Function(_) | Stmt::TypeAlias(_) | Stmt::Empty(_) => {}
            Stmt::Class(c) => {
                let class = self.make_class(c, env);
                declare(env, &c.name.node, class.clone());
                self.init_fields(c.properties.iter().filter(|p| p.is_static), &class, env)?;
            }
            Stmt::VarDecl(d) => self.exec_var_decl(d, env)?,
            Stmt::Return(r) => {
                let value = match &r.arg {
                    Some(e) => self.eval(e, env)?,
                    None => Value::Undefined,
                };
                return Ok(Completion::Return(value));
            }
            Stmt::If(s) => {
                if self.eval(&s.cond, env)?.truthy() {
                    return self.exec_stmt(&s.then_branch, env);
                } else if let Some(alt) = &s.else_branch {
                    return self.exec_stmt(alt, env);
                }
            }
            Stmt::For(s) => return self.exec_for(s, env),
            Stmt::ForIn(s) => return self.exec_for_in(s, env),
            Stmt::While(s) => {
                while self.eval(&s.cond, env)?.truthy() {
                    match self.exec_stmt(&s.body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
            }
            Stmt::Block(b) => return self.exec_block(b, env),
            Stmt::Throw(t) => return Err(Throw::Value(self.eval(&t.arg, env)?)),
            Stmt::Break(_) => return Ok(Completion::Break),
            Stmt::Continue(_) => return Ok(Completion::Continue),
            Stmt::Expr(e) => {
                self.eval(e, env)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_var_decl(&mut self, d: &VarDecl, env: &EnvRef) -> Eval<()> {
        for decl in &d.decls {
            let name = &decl.name.node;
            let value = match &decl.init {
                Some(init) => self.eval(init, env)?,
                // A bare `var x;` keeps whatever the hoisted binding holds.
                None if d.kind == VarKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind(d.kind, name, value, env);
        }
        Ok(())
    }

    fn bind(&mut self, kind: VarKind, name: &str, value: Value, env: &EnvRef) {
        if kind != VarKind::Var || !set_var(env, name, value.clone()) {
            declare(env, name, value);
        }
    }

    fn exec_for(&mut self, s: &ForStmt, env: &EnvRef) -> Eval<Completion> {
        let scope = child_env(env);
        match &s.init {
            Some(ForInit::Decl(d)) => self.exec_var_decl(d, &scope)?,
            Some(ForInit::Expr(e)) => {
                self.eval(e, &scope)?;
            }
            None => {}
        }
        loop {
            if let Some(test) = &s.test {
                if !self.eval(test, &scope)?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(&s.body, &scope)? {
                Completion::Break => break,
                Completion::Return(v) => return Ok(Completion::Return(v)),
                Completion::Normal | Completion::Continue => {}
            }
            if let Some(update) = &s.update {
                self.eval(update, &scope)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_in(&mut self, s: &ForInStmt, env: &EnvRef) -> Eval<Completion> {
        let subject = self.eval(&s.right, env)?;
        let items = match s.kind {
            ForInKind::In => self.enumerable_keys(&subject),
            ForInKind::Of => self.iterate(&subject)?,
        };
        for item in items {
            let scope = child_env(env);
            match &s.left {
                ForBinding::Decl(d) => {
                    if let Some(decl) = d.decls.first() {
                        self.bind(d.kind, &decl.name.node, item, &scope);
                    }
                }
                ForBinding::Target(id) => self.assign_var(&id.node, item, env),
            }
            match self.exec_stmt(&s.body, &scope)? {
                Completion::Break => break,
                Completion::Return(v) => return Ok(Completion::Return(v)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    fn enumerable_keys(&self, subject: &Value) -> Vec<Value> {
        match subject {
            Value::Str(s) => (0..s.chars().count())
                .map(|i| Value::str(i.to_string()))
                .collect(),
            Value::Object(o) => {
                let o = o.borrow();
                let indices = match &o.kind {
                    ObjectKind::Array(items) => items.len(),
                    _ => 0,
                };
                (0..indices)
                    .map(|i| Value::str(i.to_string()))
                    .chain(o.props.iter().map(|(k, _)| Value::str(k)))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn iterate(&self, subject: &Value) -> Eval<Vec<Value>> {
        match subject {
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::Object(o) => match &o.borrow().kind {
                ObjectKind::Array(items) => Ok(items.clone()),
                _ => Err(self.type_error("object is not iterable")),
            },
            other => Err(self.type_error(format!("{} is not iterable", other.to_js_string()))),
        }
    }

    // ----- functions and classes -----

    fn function_object(&self, callable: Callable, name: &str, constructible: bool) -> ObjRef {
        let obj = new_object(
            ObjectKind::Function(callable),
            Some(self.realm.function_proto.clone()),
        );
        obj.borrow_mut().set_own("name", Value::str(name));
        if constructible {
            let proto = new_object(ObjectKind::Plain, Some(self.realm.object_proto.clone()));
            proto
                .borrow_mut()
                .set_own("constructor", Value::Object(obj.clone()));
            obj.borrow_mut().set_own("prototype", Value::Object(proto));
        }
        obj
    }

    fn make_closure(&self, f: &Function, env: &EnvRef) -> Value {
        let name = f.name.as_ref().map(|n| n.node.as_str()).unwrap_or("");
        let closure = Closure {
            function: Rc::new(f.clone()),
            env: env.clone(),
        };
        Value::Object(self.function_object(
            Callable::Closure(Rc::new(closure)),
            name,
            !f.is_arrow,
        ))
    }

    fn make_class(&self, c: &ClassDecl, env: &EnvRef) -> Value {
        let method_closure = |f: &Function| {
            Rc::new(Closure {
                function: Rc::new(f.clone()),
                env: env.clone(),
            })
        };
        let constructor = c
            .methods
            .iter()
            .find(|m| !m.is_static && m.key.node == "constructor")
            .map(|m| method_closure(&m.function));
        let ctor = ClassCtor {
            name: c.name.node.clone(),
            constructor,
            fields: c.properties.iter().filter(|p| !p.is_static).cloned().collect(),
            env: env.clone(),
        };
        let class = self.function_object(Callable::Class(Rc::new(ctor)), &c.name.node, true);
        let proto = lookup(&class, "prototype");
        for m in &c.methods {
            if !m.is_static && m.key.node == "constructor" {
                continue;
            }
            let method = self.function_object(
                Callable::Closure(method_closure(&m.function)),
                &m.key.node,
                false,
            );
            let target = if m.is_static {
                Some(class.clone())
            } else {
                proto.as_ref().and_then(|p| p.as_object().cloned())
            };
            if let Some(target) = target {
                target
                    .borrow_mut()
                    .set_own(&m.key.node, Value::Object(method));
            }
        }
        Value::Object(class)
    }

    /// Evaluates property initializers in order with `this` bound to `target`.
    fn init_fields<'p>(
        &mut self,
        fields: impl Iterator<Item = &'p ClassProperty>,
        target: &Value,
        env: &EnvRef,
    ) -> Eval<()> {
        for field in fields {
            let scope = child_env(env);
            scope.borrow_mut().this = Some(target.clone());
            let value = match &field.value {
                Some(e) => self.eval(e, &scope)?,
                None => Value::Undefined,
            };
            self.set_property(target, &field.key.node, value)?;
        }
        Ok(())
    }

    fn call_closure(&mut self, closure: &Closure, this: Value, args: Vec<Value>) -> Eval<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.unsupported(self.call_span, "maximum call depth exceeded"));
        }
        self.depth += 1;
        let result = self.call_closure_inner(closure, this, args);
        self.depth -= 1;
        result
    }

    fn call_closure_inner(
        &mut self,
        closure: &Closure,
        this: Value,
        args: Vec<Value>,
    ) -> Eval<Value> {
        let f = &closure.function;
        let env = child_env(&closure.env);
        if !f.is_arrow {
            env.borrow_mut().this = Some(this);
        }
        let mut args = args.into_iter();
        for p in &f.params {
            let value = if p.rest {
                Value::Object(self.new_array(args.by_ref().collect()))
            } else {
                match (args.next(), &p.default) {
                    (None | Some(Value::Undefined), Some(default)) => self.eval(default, &env)?,
                    (Some(v), _) => v,
                    (None, None) => Value::Undefined,
                }
            };
            declare(&env, &p.name.node, value);
        }
        match &f.body {
            FunctionBody::Expr(e) => self.eval(e, &env),
            FunctionBody::Block(b) => {
                hoist_vars(&env, &b.stmts);
                match self.exec_stmts(&b.stmts, &env)? {
                    Completion::Return(v) => Ok(v),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    pub(crate) fn call_value(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> Eval<Value> {
        let callable = callee.as_object().and_then(|o| o.borrow().callable());
        match callable {
            Some(Callable::Closure(c)) => self.call_closure(&c, this, args),
            Some(Callable::Native(f)) => f(self, this, args),
            Some(Callable::Class(c)) => Err(self.type_error(format!(
                "Class constructor {} cannot be invoked without 'new'",
                c.name
            ))),
            None => Err(self.type_error(format!("{} is not a function", callee.to_js_string()))),
        }
    }

    fn construct(&mut self, callee: &Value, args: Vec<Value>) -> Eval<Value> {
        let Some(ctor) = callee.as_object() else {
            return Err(self.type_error(format!("{} is not a constructor", callee.to_js_string())));
        };
        let callable = ctor.borrow().callable();
        let proto = match lookup(ctor, "prototype") {
            Some(Value::Object(p)) => p,
            _ => self.realm.object_proto.clone(),
        };
        let instance = Value::Object(new_object(ObjectKind::Plain, Some(proto)));
        let result = match callable {
            Some(Callable::Class(c)) => {
                self.init_fields(c.fields.iter(), &instance, &c.env)?;
                match &c.constructor {
                    Some(closure) => self.call_closure(closure, instance.clone(), args)?,
                    None => Value::Undefined,
                }
            }
            Some(Callable::Closure(c)) if !c.function.is_arrow => {
                self.call_closure(&c, instance.clone(), args)?
            }
            Some(Callable::Native(f)) => f(self, instance.clone(), args)?,
            _ => {
                return Err(self.type_error(format!(
                    "{} is not a constructor",
                    callee.to_js_string()
                )));
            }
        };
        Ok(match result {
            Value::Object(_) => result,
            _ => instance,
        })
    }

    fn new_array(&self, items: Vec<Value>) -> ObjRef {
        new_object(ObjectKind::Array(items), Some(self.realm.array_proto.clone()))
    }

    // ----- properties -----

    fn get_property(&self, base: &Value, key: &str) -> Eval<Value> {
        match base {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                base.to_js_string()
            ))),
            Value::Str(s) => Ok(match key {
                "length" => Value::Number(s.chars().count() as f64),
                _ => match array_index(key).and_then(|i| s.chars().nth(i)) {
                    Some(c) => Value::str(c.to_string()),
                    None => Value::Undefined,
                },
            }),
            Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
            Value::Object(o) => Ok(lookup(o, key).unwrap_or(Value::Undefined)),
        }
    }

    fn set_property(&self, base: &Value, key: &str, value: Value) -> Eval<()> {
        let Value::Object(o) = base else {
            if base.is_nully() {
                return Err(self.type_error(format!(
                    "Cannot set properties of {} (setting '{key}')",
                    base.to_js_string()
                )));
            }
            return Ok(());
        };
        let mut o = o.borrow_mut();
        if let ObjectKind::Array(items) = &mut o.kind {
            if let Some(i) = array_index(key) {
                if i >= items.len() {
                    items.resize(i + 1, Value::Undefined);
                }
                items[i] = value;
                return Ok(());
            }
            if key == "length" {
                items.resize(value.to_number().max(0.0) as usize, Value::Undefined);
                return Ok(());
            }
        }
        o.set_own(key, value);
        Ok(())
    }

    fn property_key(value: &Value) -> String {
        match value {
            Value::Number(n) => number_to_string(*n),
            other => other.to_js_string(),
        }
    }

    fn assign_var(&self, name: &str, value: Value, env: &EnvRef) {
        if !set_var(env, name, value.clone()) {
            declare(&self.global, name, value);
        }
    }

    // ----- expressions -----

    fn eval_args(&mut self, args: &[Expr], env: &EnvRef) -> Eval<Vec<Value>> {
        args.iter().map(|a| self.eval(a, env)).collect()
    }

    pub(crate) fn eval(&mut self, expr: &Expr, env: &EnvRef) -> Eval<Value> {
        match &expr.kind {
            ExprKind::Ident(id) => get_var(env, &id.node).ok_or_else(|| {
                self.throw_error(
                    &self.realm.reference_error_proto,
                    format!("{} is not defined", id.node),
                )
            }),
            ExprKind::This => Ok(this_value(env)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::str(s)),
            ExprKind::Regex { pattern, flags } => Ok(Value::Object(new_object(
                ObjectKind::RegExp {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                },
                Some(self.realm.regexp_proto.clone()),
            ))),
            ExprKind::Array(elems) => {
                let items = self.eval_args(elems, env)?;
                Ok(Value::Object(self.new_array(items)))
            }
            ExprKind::Object(props) => {
                let obj = new_object(ObjectKind::Plain, Some(self.realm.object_proto.clone()));
                for p in props {
                    let value = self.eval(&p.value, env)?;
                    obj.borrow_mut().set_own(&p.key.node, value);
                }
                Ok(Value::Object(obj))
            }
            ExprKind::Function(f) => Ok(match &f.name {
                // A named function expression sees its own name.
                Some(name) if !f.is_arrow => {
                    let scope = child_env(env);
                    let closure = self.make_closure(f, &scope);
                    declare(&scope, &name.node, closure.clone());
                    closure
                }
                _ => self.make_closure(f, env),
            }),
            ExprKind::Unary { op, expr: inner } => self.eval_unary(*op, inner, env),
            ExprKind::Update { op, prefix, target } => {
                let old = self.eval(target, env)?.to_number();
                let new = match op {
                    UpdateOp::Inc => old + 1.0,
                    UpdateOp::Dec => old - 1.0,
                };
                self.assign_to(target, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            ExprKind::Binary { left, op, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                self.eval_binop(*op, l, r)
            }
            ExprKind::Logical { left, op, right } => {
                let l = self.eval(left, env)?;
                match (op, l.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(l),
                    _ => self.eval(right, env),
                }
            }
            ExprKind::Assign { op, target, value } => {
                let rhs = self.eval(value, env)?;
                let value = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::AddAssign => {
                        let current = self.eval(target, env)?;
                        self.eval_binop(BinOp::Add, current, rhs)?
                    }
                    AssignOp::SubAssign => {
                        let current = self.eval(target, env)?;
                        self.eval_binop(BinOp::Sub, current, rhs)?
                    }
                };
                self.assign_to(target, value.clone(), env)?;
                Ok(value)
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            ExprKind::Member { object, property } => {
                let base = self.eval(object, env)?;
                self.get_property(&base, &property.node)
            }
            ExprKind::Index { object, index } => {
                let base = self.eval(object, env)?;
                let key = Self::property_key(&self.eval(index, env)?);
                self.get_property(&base, &key)
            }
            ExprKind::Call { callee, args } => {
                let (this, func) = match &callee.kind {
                    ExprKind::Member { object, property } => {
                        let base = self.eval(object, env)?;
                        let func = self.get_property(&base, &property.node)?;
                        (base, func)
                    }
                    ExprKind::Index { object, index } => {
                        let base = self.eval(object, env)?;
                        let key = Self::property_key(&self.eval(index, env)?);
                        let func = self.get_property(&base, &key)?;
                        (base, func)
                    }
                    _ => (Value::Undefined, self.eval(callee, env)?),
                };
                let args = self.eval_args(args, env)?;
                self.call_span = expr.span;
                self.call_value(&func, this, args)
            }
            ExprKind::New { callee, args } => {
                let ctor = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                self.call_span = expr.span;
                self.construct(&ctor, args)
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, inner: &Expr, env: &EnvRef) -> Eval<Value> {
        if op == UnaryOp::TypeOf {
            // `typeof undeclared` is not a reference error.
            if let ExprKind::Ident(id) = &inner.kind {
                return Ok(Value::str(
                    get_var(env, &id.node).map_or("undefined", |v| v.type_of()),
                ));
            }
        }
        let v = self.eval(inner, env)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!v.truthy()),
            UnaryOp::Neg => Value::Number(-v.to_number()),
            UnaryOp::Plus => Value::Number(v.to_number()),
            UnaryOp::TypeOf => Value::str(v.type_of()),
            UnaryOp::Void => Value::Undefined,
        })
    }

    fn assign_to(&mut self, target: &Expr, value: Value, env: &EnvRef) -> Eval<()> {
        match &target.kind {
            ExprKind::Ident(id) => {
                self.assign_var(&id.node, value, env);
                Ok(())
            }
            ExprKind::Member { object, property } => {
                let base = self.eval(object, env)?;
                self.set_property(&base, &property.node, value)
            }
            ExprKind::Index { object, index } => {
                let base = self.eval(object, env)?;
                let key = Self::property_key(&self.eval(index, env)?);
                self.set_property(&base, &key, value)
            }
            _ => Err(self.unsupported(target.span, "invalid assignment target")),
        }
    }

    fn eval_binop(&self, op: BinOp, l: Value, r: Value) -> Eval<Value> {
        let num = |f: fn(f64, f64) -> f64| Value::Number(f(l.to_number(), r.to_number()));
        Ok(match op {
            BinOp::Add => {
                let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Object(_));
                if stringy(&l) || stringy(&r) {
                    Value::str(format!("{}{}", l.to_js_string(), r.to_js_string()))
                } else {
                    num(|a, b| a + b)
                }
            }
            BinOp::Sub => num(|a, b| a - b),
            BinOp::Mul => num(|a, b| a * b),
            BinOp::Div => num(|a, b| a / b),
            BinOp::Rem => num(|a, b| a % b),
            BinOp::LooseEq => Value::Bool(l.loose_eq(&r)),
            BinOp::LooseNe => Value::Bool(!l.loose_eq(&r)),
            BinOp::StrictEq => Value::Bool(l.strict_eq(&r)),
            BinOp::StrictNe => Value::Bool(!l.strict_eq(&r)),
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                Value::Bool(compare(op, &l, &r))
            }
            BinOp::InstanceOf => Value::Bool(self.instance_of(&l, &r)?),
            BinOp::In => {
                let Value::Object(o) = &r else {
                    return Err(self.type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        l.to_js_string(),
                        r.to_js_string()
                    )));
                };
                Value::Bool(lookup(o, &Self::property_key(&l)).is_some())
            }
        })
    }

    fn instance_of(&self, value: &Value, ctor: &Value) -> Eval<bool> {
        let callable = ctor
            .as_object()
            .filter(|o| o.borrow().callable().is_some());
        let Some(ctor) = callable else {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let (Value::Object(obj), Some(Value::Object(target))) = (value, lookup(ctor, "prototype"))
        else {
            return Ok(false);
        };
        let mut current = obj.borrow().proto.clone();
        while let Some(p) = current {
            if Rc::ptr_eq(&p, &target) {
                return Ok(true);
            }
            current = p.borrow().proto.clone();
        }
        Ok(false)
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return match op {
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::Le => a <= b,
            _ => a >= b,
        };
    }
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        BinOp::Lt => a < b,
        BinOp::Gt => a > b,
        BinOp::Le => a <= b,
        _ => a >= b,
    }
}

/// Declares every `var` of a function body as `undefined`, without entering
/// nested functions.
fn hoist_vars(env: &EnvRef, stmts: &[Stmt]) {
    fn decl(env: &EnvRef, d: &VarDecl) {
        if d.kind == VarKind::Var {
            for v in &d.decls {
                env.borrow_mut()
                    .vars
                    .entry(v.name.node.clone())
                    .or_insert(Value::Undefined);
            }
        }
    }
    fn stmt(env: &EnvRef, s: &Stmt) {
        match s {
            Stmt::VarDecl(d) => decl(env, d),
            Stmt::If(s) => {
                stmt(env, &s.then_branch);
                if let Some(alt) = &s.else_branch {
                    stmt(env, alt);
                }
            }
            Stmt::For(s) => {
                if let Some(ForInit::Decl(d)) = &s.init {
                    decl(env, d);
                }
                stmt(env, &s.body);
            }
            Stmt::ForIn(s) => {
                if let ForBinding::Decl(d) = &s.left {
                    decl(env, d);
                }
                stmt(env, &s.body);
            }
            Stmt::While(s) => stmt(env, &s.body),
            Stmt::Block(b) => hoist_vars(env, &b.stmts),
            _ => {}
        }
    }
    for s in stmts {
        stmt(env, s);
    }
}

// ----- natives -----

fn native_noop(_: &mut Interpreter, _: Value, _: Vec<Value>) -> Eval<Value> {
    Ok(Value::Undefined)
}

fn native_object(interp: &mut Interpreter, this: Value, args: Vec<Value>) -> Eval<Value> {
    match args.into_iter().next() {
        Some(v @ Value::Object(_)) => Ok(v),
        _ if matches!(this, Value::Object(_)) => Ok(this),
        _ => Ok(Value::Object(new_object(
            ObjectKind::Plain,
            Some(interp.realm.object_proto.clone()),
        ))),
    }
}

fn native_function(interp: &mut Interpreter, _: Value, _: Vec<Value>) -> Eval<Value> {
    Err(interp.unsupported(interp.call_span, "the Function constructor cannot compile source"))
}

fn native_array(interp: &mut Interpreter, _: Value, args: Vec<Value>) -> Eval<Value> {
    let items = match args.as_slice() {
        [Value::Number(n)] => vec![Value::Undefined; n.max(0.0) as usize],
        _ => args,
    };
    Ok(Value::Object(interp.new_array(items)))
}

fn native_regexp(interp: &mut Interpreter, _: Value, args: Vec<Value>) -> Eval<Value> {
    let mut args = args.into_iter();
    let pattern = args.next().map(|v| v.to_js_string()).unwrap_or_default();
    let flags = args.next().map(|v| v.to_js_string()).unwrap_or_default();
    Ok(Value::Object(new_object(
        ObjectKind::RegExp { pattern, flags },
        Some(interp.realm.regexp_proto.clone()),
    )))
}

fn native_error(interp: &mut Interpreter, this: Value, args: Vec<Value>) -> Eval<Value> {
    let Value::Object(obj) = &this else {
        return Err(interp.type_error("Error constructors must be called with 'new'"));
    };
    if let Some(message) = args.into_iter().next().filter(|m| !matches!(m, Value::Undefined)) {
        obj.borrow_mut()
            .set_own("message", Value::str(message.to_js_string()));
    }
    Ok(this)
}

fn native_is_array(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Eval<Value> {
    let is_array = args.first().and_then(Value::as_object).is_some_and(|o| {
        matches!(o.borrow().kind, ObjectKind::Array(_))
    });
    Ok(Value::Bool(is_array))
}

fn array_items(interp: &Interpreter, this: &Value) -> Eval<Vec<Value>> {
    match this.as_object().map(|o| o.borrow()) {
        Some(o) => match &o.kind {
            ObjectKind::Array(items) => Ok(items.clone()),
            _ => Err(interp.type_error("receiver is not an array")),
        },
        None => Err(interp.type_error("receiver is not an array")),
    }
}

fn native_array_push(interp: &mut Interpreter, this: Value, args: Vec<Value>) -> Eval<Value> {
    if let Some(o) = this.as_object() {
        if let ObjectKind::Array(items) = &mut o.borrow_mut().kind {
            items.extend(args);
            return Ok(Value::Number(items.len() as f64));
        }
    }
    Err(interp.type_error("receiver is not an array"))
}

/// Calls `callback(item, index, array)` until one result's truthiness equals `stop_on`.
fn scan_array(interp: &mut Interpreter, this: Value, args: Vec<Value>, stop_on: bool) -> Eval<bool> {
    let items = array_items(interp, &this)?;
    let callback = args.into_iter().next().unwrap_or(Value::Undefined);
    for (i, item) in items.into_iter().enumerate() {
        let result = interp.call_value(
            &callback,
            Value::Undefined,
            vec![item, Value::Number(i as f64), this.clone()],
        )?;
        if result.truthy() == stop_on {
            return Ok(true);
        }
    }
    Ok(false)
}

fn native_array_some(interp: &mut Interpreter, this: Value, args: Vec<Value>) -> Eval<Value> {
    Ok(Value::Bool(scan_array(interp, this, args, true)?))
}

fn native_array_every(interp: &mut Interpreter, this: Value, args: Vec<Value>) -> Eval<Value> {
    Ok(Value::Bool(!scan_array(interp, this, args, false)?))
}

fn native_array_join(interp: &mut Interpreter, this: Value, args: Vec<Value>) -> Eval<Value> {
    let items = array_items(interp, &this)?;
    let sep = match args.first() {
        None | Some(Value::Undefined) => ",".to_string(),
        Some(v) => v.to_js_string(),
    };
    let parts = items
        .iter()
        .map(|v| if v.is_nully() { String::new() } else { v.to_js_string() })
        .collect::<Vec<_>>();
    Ok(Value::str(parts.join(&sep)))
}

fn native_console_log(interp: &mut Interpreter, _: Value, args: Vec<Value>) -> Eval<Value> {
    let line = args
        .iter()
        .map(Value::to_js_string)
        .collect::<Vec<_>>()
        .join(" ");
    interp.stdout.push_str(&line);
    interp.stdout.push('\n');
    Ok(Value::Undefined)
}
