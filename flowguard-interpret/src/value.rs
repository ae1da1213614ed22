use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use flowguard_ast::{ClassProperty, Function};

use crate::vm::{Env, Interpreter, Throw};

pub type ObjRef = Rc<RefCell<Object>>;

pub type NativeFn = fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Throw>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(ObjRef),
}

pub struct Object {
    pub kind: ObjectKind,
    /// Own properties in insertion order.
    pub props: Vec<(String, Value)>,
    pub proto: Option<ObjRef>,
}

pub enum ObjectKind {
    Plain,
    Array(Vec<Value>),
    Function(Callable),
    RegExp { pattern: String, flags: String },
}

#[derive(Clone)]
pub enum Callable {
    Closure(Rc<Closure>),
    Native(NativeFn),
    Class(Rc<ClassCtor>),
}

pub struct Closure {
    pub function: Rc<Function>,
    pub env: Rc<RefCell<Env>>,
}

pub struct ClassCtor {
    pub name: String,
    pub constructor: Option<Rc<Closure>>,
    /// Instance properties, initialized before the constructor body runs.
    pub fields: Vec<ClassProperty>,
    pub env: Rc<RefCell<Env>>,
}

impl Object {
    pub fn new(kind: ObjectKind, proto: Option<ObjRef>) -> Self {
        Self {
            kind,
            props: Vec::new(),
            proto,
        }
    }

    pub fn own(&self, key: &str) -> Option<Value> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set_own(&mut self, key: &str, value: Value) {
        match self.props.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.props.push((key.to_string(), value)),
        }
    }

    pub fn callable(&self) -> Option<Callable> {
        match &self.kind {
            ObjectKind::Function(c) => Some(c.clone()),
            _ => None,
        }
    }
}

pub fn new_object(kind: ObjectKind, proto: Option<ObjRef>) -> ObjRef {
    Rc::new(RefCell::new(Object::new(kind, proto)))
}

/// Looks `key` up along the prototype chain.
pub fn lookup(obj: &ObjRef, key: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        let o = o.borrow();
        if let Some(v) = own_property(&o, key) {
            return Some(v);
        }
        current = o.proto.clone();
    }
    None
}

fn own_property(o: &Object, key: &str) -> Option<Value> {
    if let ObjectKind::Array(items) = &o.kind {
        if key == "length" {
            return Some(Value::Number(items.len() as f64));
        }
        if let Some(i) = array_index(key) {
            return Some(items.get(i).cloned().unwrap_or(Value::Undefined));
        }
    }
    o.own(key)
}

pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(o) => match o.borrow().kind {
                ObjectKind::Function(_) => "function",
                _ => "object",
            },
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn is_nully(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Object(_) => {
                let s = self.to_js_string();
                Value::str(s).to_number()
            }
        }
    }

    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.to_string(),
            Value::Object(o) => object_to_string(o),
        }
    }

    /// `===`
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nully() || b.is_nully() => a.is_nully() && b.is_nully(),
            (Value::Object(_), Value::Object(_)) | (Value::Str(_), Value::Str(_)) => {
                self.strict_eq(other)
            }
            (Value::Object(_), prim) => Value::str(self.to_js_string()).loose_eq(prim),
            (prim, Value::Object(_)) => prim.loose_eq(&Value::str(other.to_js_string())),
            _ => self.to_number() == other.to_number(),
        }
    }
}

fn object_to_string(o: &ObjRef) -> String {
    let name = lookup(o, "name");
    let message = lookup(o, "message");
    let obj = o.borrow();
    match &obj.kind {
        ObjectKind::Array(items) => items
            .iter()
            .map(|v| {
                if v.is_nully() {
                    String::new()
                } else {
                    v.to_js_string()
                }
            })
            .collect::<Vec<_>>()
            .join(","),
        ObjectKind::Function(_) => {
            let name = name.map(|n| n.to_js_string()).unwrap_or_default();
            format!("function {name}() {{ [code] }}")
        }
        ObjectKind::RegExp { pattern, flags } => format!("/{pattern}/{flags}"),
        ObjectKind::Plain => match (name, message) {
            (Some(name), Some(message)) => {
                let message = message.to_js_string();
                if message.is_empty() {
                    name.to_js_string()
                } else {
                    format!("{}: {message}", name.to_js_string())
                }
            }
            _ => "[object Object]".to_string(),
        },
    }
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => f.write_str(&other.to_js_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}
