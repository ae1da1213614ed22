#![forbid(unsafe_code)]

use flowguard_ast::{
    ident, BinOp, Block, Expr, ExprKind, Function, FunctionBody, Param, ReturnStmt, Span, Stmt,
    UnaryOp,
};

use crate::scope::NameAllocator;
use crate::types::{describe_tags, is_unguardable, NumericWidth, ShapeField, TypeTag};

/// The construct a guarded value is bound to, for error messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiteKind {
    Argument,
    OptionalArgument,
    RestArgument,
    Variable,
    Property,
    Return,
}

#[derive(Clone, Copy, Debug)]
pub struct Site<'a> {
    pub kind: SiteKind,
    /// Binding name, or the function name for returns.
    pub name: Option<&'a str>,
}

impl Site<'_> {
    pub fn describe(&self) -> String {
        let construct = match self.kind {
            SiteKind::Argument => "argument",
            SiteKind::OptionalArgument => "optional argument",
            SiteKind::RestArgument => "rest argument",
            SiteKind::Variable => "variable",
            SiteKind::Property => "property",
            SiteKind::Return => {
                return match self.name {
                    Some(name) => format!("Function \"{name}\" return value"),
                    None => "Function return value".to_string(),
                };
            }
        };
        match self.name {
            Some(name) => format!("Value of {construct} \"{name}\""),
            None => format!("Value of {construct}"),
        }
    }
}

/// Builds an expression that is true when `subject` matches none of `tags`.
/// Returns `None` when nothing can be checked. Callback parameters avoid the
/// names in `names`.
pub fn build_test(subject: &Expr, tags: &[TypeTag], names: &NameAllocator) -> Option<Expr> {
    if tags.is_empty() || is_unguardable(tags) {
        return None;
    }
    let mut test: Option<Expr> = None;
    for tag in tags {
        let term = violation(subject, tag, names)?;
        test = Some(match test {
            None => term,
            Some(acc) => Expr::and(acc, term),
        });
    }
    test
}

/// `if (<test>) throw new TypeError(...)` for `subject`.
pub fn build_guard(
    subject: &Expr,
    tags: &[TypeTag],
    site: Site<'_>,
    names: &NameAllocator,
) -> Option<Stmt> {
    let test = build_test(subject, tags, names)?;
    let span = subject.span;
    let message = format!(
        "{} violates contract, expected {} got ",
        site.describe(),
        describe_tags(tags)
    );
    let error = Expr::new_instance(
        Expr::ident(span, "TypeError"),
        vec![Expr::binary(
            Expr::string(span, message),
            BinOp::Add,
            actual_category(subject),
        )],
    );
    Some(Stmt::if_throw(test, error))
}

/// `s === null ? "null" : s instanceof Object && s.constructor ? s.constructor.name : typeof s`
pub fn actual_category(subject: &Expr) -> Expr {
    let span = subject.span;
    let constructor = Expr::member(subject.clone(), "constructor");
    Expr::conditional(
        Expr::binary(subject.clone(), BinOp::StrictEq, Expr::null(span)),
        Expr::string(span, "null"),
        Expr::conditional(
            Expr::and(
                Expr::binary(subject.clone(), BinOp::InstanceOf, Expr::ident(span, "Object")),
                constructor.clone(),
            ),
            Expr::member(constructor, "name"),
            Expr::type_of(subject.clone()),
        ),
    )
}

fn typeof_is_not(subject: &Expr, name: &str) -> Expr {
    Expr::binary(
        Expr::type_of(subject.clone()),
        BinOp::StrictNe,
        Expr::string(subject.span, name),
    )
}

fn not_array(subject: &Expr) -> Expr {
    let span = subject.span;
    Expr::not(Expr::call(
        Expr::member(Expr::ident(span, "Array"), "isArray"),
        vec![subject.clone()],
    ))
}

fn not_object(subject: &Expr) -> Expr {
    Expr::or(
        typeof_is_not(subject, "object"),
        Expr::binary(subject.clone(), BinOp::StrictEq, Expr::null(subject.span)),
    )
}

fn any_of(first: Expr, rest: impl IntoIterator<Item = Expr>) -> Expr {
    rest.into_iter().fold(first, Expr::or)
}

fn field_access(subject: &Expr, key: &str) -> Expr {
    let plain = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain {
        Expr::member(subject.clone(), key)
    } else {
        Expr::index(subject.clone(), Expr::string(subject.span, key))
    }
}

fn violation(subject: &Expr, tag: &TypeTag, names: &NameAllocator) -> Option<Expr> {
    let span = subject.span;
    let test = match tag {
        TypeTag::Null => Expr::binary(subject.clone(), BinOp::LooseNe, Expr::null(span)),
        TypeTag::String => typeof_is_not(subject, "string"),
        TypeTag::Number => typeof_is_not(subject, "number"),
        TypeTag::Boolean => typeof_is_not(subject, "boolean"),
        TypeTag::Symbol => typeof_is_not(subject, "symbol"),
        TypeTag::Undefined => typeof_is_not(subject, "undefined"),
        TypeTag::Function => typeof_is_not(subject, "function"),
        TypeTag::Object => not_object(subject),
        TypeTag::Array(None) => not_array(subject),
        TypeTag::Array(Some(elem)) => match element_callback(span, elem, names) {
            Some(callback) => Expr::or(
                not_array(subject),
                Expr::call(Expr::member(subject.clone(), "some"), vec![callback]),
            ),
            None => not_array(subject),
        },
        TypeTag::Tuple(positions) => {
            let length = Expr::binary(
                Expr::member(subject.clone(), "length"),
                BinOp::StrictNe,
                Expr::number(span, positions.len() as f64),
            );
            let items = positions.iter().enumerate().filter_map(|(i, tags)| {
                let item = Expr::index(subject.clone(), Expr::number(span, i as f64));
                build_test(&item, tags, names)
            });
            any_of(not_array(subject), std::iter::once(length).chain(items))
        }
        TypeTag::Numeric(width) => numeric_violation(subject, *width),
        TypeTag::Nominal(path) => Expr::not(Expr::binary(
            subject.clone(),
            BinOp::InstanceOf,
            Expr::path(span, path),
        )),
        TypeTag::Shape(fields) => shape_violation(subject, fields, names),
        TypeTag::Any | TypeTag::Mixed | TypeTag::Generic(_) => return None,
    };
    Some(test)
}

fn shape_violation(subject: &Expr, fields: &[ShapeField], names: &NameAllocator) -> Expr {
    let field_tests = fields
        .iter()
        .filter_map(|f| build_test(&field_access(subject, &f.key), &f.tags, names));
    any_of(not_object(subject), field_tests)
}

fn numeric_violation(subject: &Expr, width: NumericWidth) -> Expr {
    let span = subject.span;
    let mut terms = Vec::new();
    if width.is_integral() {
        terms.push(Expr::binary(
            Expr::binary(subject.clone(), BinOp::Rem, Expr::number(span, 1.0)),
            BinOp::StrictNe,
            Expr::number(span, 0.0),
        ));
    }
    if let Some((lo, hi)) = width.bounds() {
        terms.push(Expr::binary(subject.clone(), BinOp::Lt, signed_number(span, lo)));
        terms.push(Expr::binary(subject.clone(), BinOp::Gt, signed_number(span, hi)));
    }
    any_of(typeof_is_not(subject, "number"), terms)
}

/// Negative bounds print as `-n`, which reads back as a unary minus.
fn signed_number(span: Span, n: f64) -> Expr {
    if n < 0.0 {
        Expr::unary(UnaryOp::Neg, Expr::number(span, -n))
    } else {
        Expr::number(span, n)
    }
}

/// `function (item) { return <violation of item>; }`. The parameter is renamed
/// when `item` is in use or names a class the element check refers to.
fn element_callback(span: Span, elem: &[TypeTag], names: &NameAllocator) -> Option<Expr> {
    let mut classes = Vec::new();
    nominal_heads(elem, &mut classes);
    let param = names.unused("item", |n| classes.contains(&n));
    let item = Expr::ident(span, param.clone());
    let test = build_test(&item, elem, names)?;
    let function = Function {
        span,
        name: None,
        type_params: Vec::new(),
        params: vec![Param {
            span,
            name: ident(span, param),
            optional: false,
            rest: false,
            ty: None,
            default: None,
        }],
        return_type: None,
        body: FunctionBody::Block(Block {
            span,
            stmts: vec![Stmt::Return(ReturnStmt {
                span,
                arg: Some(test),
            })],
        }),
        is_arrow: false,
    };
    Some(Expr::new(span, ExprKind::Function(Box::new(function))))
}

fn nominal_heads<'t>(tags: &'t [TypeTag], out: &mut Vec<&'t str>) {
    for tag in tags {
        match tag {
            TypeTag::Nominal(path) => out.extend(path.first().map(String::as_str)),
            TypeTag::Array(Some(elem)) => nominal_heads(elem, out),
            TypeTag::Tuple(positions) => {
                for p in positions {
                    nominal_heads(p, out);
                }
            }
            TypeTag::Shape(fields) => {
                for f in fields {
                    nominal_heads(&f.tags, out);
                }
            }
            _ => {}
        }
    }
}
