#![forbid(unsafe_code)]

use flowguard_ast::{BinOp, Expr, ExprKind, Ident, LogicalOp, Property, UnaryOp};

use crate::types::{is_unguardable, permits_nully, ShapeField, TypeTag};

/// Outcome of checking an expression against permitted tags without running it.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Valid,
    /// Provably violates; carries the category the expression produces.
    Invalid(&'static str),
    Unknown,
    /// A bare identifier; needs one lookup through the constant bindings.
    Constant(Ident),
}

/// Read-only view of the `const` bindings visible at a site.
pub trait ConstantLookup {
    fn constant_init(&self, _name: &str) -> Option<&Expr> {
        None
    }
}

#[derive(Default)]
pub struct NoConstants;

impl ConstantLookup for NoConstants {}

pub struct Verifier<'a, C: ConstantLookup + ?Sized> {
    consts: &'a C,
}

impl<'a, C: ConstantLookup + ?Sized> Verifier<'a, C> {
    pub fn new(consts: &'a C) -> Self {
        Self { consts }
    }

    /// Verifies, following an identifier to its `const` initializer once.
    /// Never returns [`Verdict::Constant`].
    pub fn resolve(&self, expr: &Expr, tags: &[TypeTag]) -> Verdict {
        match verify(expr, tags) {
            Verdict::Constant(id) => {
                let Some(init) = self.consts.constant_init(&id.node) else {
                    return Verdict::Unknown;
                };
                match verify(init, tags) {
                    Verdict::Constant(_) => Verdict::Unknown,
                    other => other,
                }
            }
            other => other,
        }
    }
}

fn has(tags: &[TypeTag], tag: &TypeTag) -> bool {
    tags.contains(tag)
}

fn admits(tags: &[TypeTag], tag: TypeTag, got: &'static str) -> Verdict {
    if has(tags, &tag) {
        Verdict::Valid
    } else {
        Verdict::Invalid(got)
    }
}

/// One verification step with no constant resolution.
pub fn verify(expr: &Expr, tags: &[TypeTag]) -> Verdict {
    // An empty list only occurs for unchecked tuple positions.
    if tags.is_empty() || is_unguardable(tags) {
        return Verdict::Valid;
    }

    if expr.is_nully() {
        if permits_nully(tags) {
            return Verdict::Valid;
        }
        let got = if matches!(expr.kind, ExprKind::Null) {
            "null"
        } else {
            "undefined"
        };
        return Verdict::Invalid(got);
    }

    if let Some(n) = number_literal(expr) {
        let ok = tags.iter().any(|t| match t {
            TypeTag::Number => true,
            TypeTag::Numeric(w) => w.accepts(n),
            _ => false,
        });
        return if ok {
            Verdict::Valid
        } else {
            Verdict::Invalid("number")
        };
    }

    match &expr.kind {
        ExprKind::Regex { .. } => {
            let ok = has(tags, &TypeTag::Object)
                || has(tags, &TypeTag::Nominal(vec!["RegExp".to_string()]));
            if ok {
                Verdict::Valid
            } else {
                Verdict::Invalid("RegExp")
            }
        }
        ExprKind::String(_) => admits(tags, TypeTag::String, "string"),
        ExprKind::Bool(_) => admits(tags, TypeTag::Boolean, "boolean"),
        ExprKind::Object(props) => verify_object(props, tags),
        ExprKind::Array(elems) => verify_array(elems, tags),
        ExprKind::Function(_) => {
            if has(tags, &TypeTag::Function) || has(tags, &TypeTag::Object) {
                Verdict::Valid
            } else {
                Verdict::Invalid("function")
            }
        }
        ExprKind::New { callee, .. } => {
            // A constructed instance may still satisfy an unseen nominal type.
            let Some(path) = static_path(callee) else {
                return Verdict::Unknown;
            };
            let ok = has(tags, &TypeTag::Object) || has(tags, &TypeTag::Nominal(path));
            if ok {
                Verdict::Valid
            } else {
                Verdict::Unknown
            }
        }
        ExprKind::Unary {
            op: UnaryOp::TypeOf,
            ..
        } => admits(tags, TypeTag::String, "string"),
        _ if is_boolean_expr(expr) => admits(tags, TypeTag::Boolean, "boolean"),
        ExprKind::Ident(id) => Verdict::Constant(id.clone()),
        _ => Verdict::Unknown,
    }
}

fn number_literal(expr: &Expr) -> Option<f64> {
    match &expr.kind {
        ExprKind::Number(n) => Some(*n),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            expr: inner,
        } => match inner.kind {
            ExprKind::Number(n) => Some(-n),
            _ => None,
        },
        _ => None,
    }
}

fn is_boolean_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Bool(_) => true,
        ExprKind::Unary {
            op: UnaryOp::Not, ..
        } => true,
        ExprKind::Binary { op, .. } => matches!(
            op,
            BinOp::LooseEq
                | BinOp::LooseNe
                | BinOp::StrictEq
                | BinOp::StrictNe
                | BinOp::Lt
                | BinOp::Gt
                | BinOp::Le
                | BinOp::Ge
                | BinOp::InstanceOf
                | BinOp::In
        ),
        ExprKind::Logical {
            left,
            op: LogicalOp::And | LogicalOp::Or,
            right,
        } => is_boolean_expr(left) && is_boolean_expr(right),
        _ => false,
    }
}

fn static_path(expr: &Expr) -> Option<Vec<String>> {
    match &expr.kind {
        ExprKind::Ident(id) => Some(vec![id.node.clone()]),
        ExprKind::Member { object, property } => {
            let mut path = static_path(object)?;
            path.push(property.node.clone());
            Some(path)
        }
        _ => None,
    }
}

/// Nested positions are not resolved through constants.
fn verify_nested(expr: &Expr, tags: &[TypeTag]) -> Verdict {
    match verify(expr, tags) {
        Verdict::Constant(_) => Verdict::Unknown,
        other => other,
    }
}

/// Valid if any candidate is valid, unknown if any is undecided.
fn best_of(verdicts: impl IntoIterator<Item = Verdict>, got: &'static str) -> Verdict {
    let mut unknown = false;
    for v in verdicts {
        match v {
            Verdict::Valid => return Verdict::Valid,
            Verdict::Unknown | Verdict::Constant(_) => unknown = true,
            Verdict::Invalid(_) => {}
        }
    }
    if unknown {
        Verdict::Unknown
    } else {
        Verdict::Invalid(got)
    }
}

/// Invalid if any part is invalid, unknown if any is undecided.
fn all_of(verdicts: impl IntoIterator<Item = Verdict>, got: &'static str) -> Verdict {
    let mut unknown = false;
    for v in verdicts {
        match v {
            Verdict::Invalid(_) => return Verdict::Invalid(got),
            Verdict::Unknown | Verdict::Constant(_) => unknown = true,
            Verdict::Valid => {}
        }
    }
    if unknown {
        Verdict::Unknown
    } else {
        Verdict::Valid
    }
}

fn verify_object(props: &[Property], tags: &[TypeTag]) -> Verdict {
    if has(tags, &TypeTag::Object) {
        return Verdict::Valid;
    }
    let shapes = tags.iter().filter_map(|t| match t {
        TypeTag::Shape(fields) => Some(verify_shape(props, fields)),
        _ => None,
    });
    best_of(shapes, "Object")
}

fn verify_shape(props: &[Property], fields: &[ShapeField]) -> Verdict {
    let per_field = fields.iter().map(|field| {
        match props.iter().rev().find(|p| p.key.node == field.key) {
            Some(p) => verify_nested(&p.value, &field.tags),
            None if field.optional || permits_nully(&field.tags) => Verdict::Valid,
            None => Verdict::Invalid("Object"),
        }
    });
    all_of(per_field, "Object")
}

fn verify_array(elems: &[Expr], tags: &[TypeTag]) -> Verdict {
    if has(tags, &TypeTag::Object) {
        return Verdict::Valid;
    }
    let candidates = tags.iter().filter_map(|t| match t {
        TypeTag::Array(None) => Some(Verdict::Valid),
        TypeTag::Array(Some(elem_tags)) => Some(all_of(
            elems.iter().map(|e| verify_nested(e, elem_tags)),
            "Array",
        )),
        TypeTag::Tuple(positions) => {
            if positions.len() != elems.len() {
                return Some(Verdict::Invalid("Array"));
            }
            Some(all_of(
                elems
                    .iter()
                    .zip(positions)
                    .map(|(e, pos)| verify_nested(e, pos)),
                "Array",
            ))
        }
        _ => None,
    });
    best_of(candidates, "Array")
}
