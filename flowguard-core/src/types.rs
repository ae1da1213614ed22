#![forbid(unsafe_code)]

use std::collections::HashMap;

use flowguard_ast::{TypeAlias, TypeAnnotation, TypeKind};

use crate::error::TransformError;

/// One permitted runtime shape of a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Symbol,
    Undefined,
    Null,
    Object,
    Function,
    Any,
    Mixed,
    /// `Array` or `T[]`; element tags are kept one level deep only.
    Array(Option<Vec<TypeTag>>),
    Tuple(Vec<Vec<TypeTag>>),
    Numeric(NumericWidth),
    /// Class or interface, checked with `instanceof`. Qualified names keep their segments.
    Nominal(Vec<String>),
    /// A generic type parameter; erased, so nothing can be checked at runtime.
    Generic(String),
    Shape(Vec<ShapeField>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeField {
    pub key: String,
    pub optional: bool,
    pub tags: Vec<TypeTag>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericWidth {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

const FLOAT32_MAX: f64 = 3.4028234663852886e38;

impl NumericWidth {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int8" => NumericWidth::Int8,
            "uint8" => NumericWidth::Uint8,
            "int16" => NumericWidth::Int16,
            "uint16" => NumericWidth::Uint16,
            "int32" => NumericWidth::Int32,
            "uint32" => NumericWidth::Uint32,
            "float32" => NumericWidth::Float32,
            "float64" => NumericWidth::Float64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericWidth::Int8 => "int8",
            NumericWidth::Uint8 => "uint8",
            NumericWidth::Int16 => "int16",
            NumericWidth::Uint16 => "uint16",
            NumericWidth::Int32 => "int32",
            NumericWidth::Uint32 => "uint32",
            NumericWidth::Float32 => "float32",
            NumericWidth::Float64 => "float64",
        }
    }

    pub fn is_integral(self) -> bool {
        !matches!(self, NumericWidth::Float32 | NumericWidth::Float64)
    }

    /// Inclusive range, or `None` when every number is accepted.
    pub fn bounds(self) -> Option<(f64, f64)> {
        match self {
            NumericWidth::Int8 => Some((-128.0, 127.0)),
            NumericWidth::Uint8 => Some((0.0, 255.0)),
            NumericWidth::Int16 => Some((-32768.0, 32767.0)),
            NumericWidth::Uint16 => Some((0.0, 65535.0)),
            NumericWidth::Int32 => Some((-2147483648.0, 2147483647.0)),
            NumericWidth::Uint32 => Some((0.0, 4294967295.0)),
            NumericWidth::Float32 => Some((-FLOAT32_MAX, FLOAT32_MAX)),
            NumericWidth::Float64 => None,
        }
    }

    pub fn accepts(self, n: f64) -> bool {
        if self.is_integral() && n.fract() != 0.0 {
            return false;
        }
        match self.bounds() {
            Some((lo, hi)) => n >= lo && n <= hi,
            None => true,
        }
    }
}

impl TypeTag {
    pub fn describe(&self) -> String {
        match self {
            TypeTag::String => "string".to_string(),
            TypeTag::Number => "number".to_string(),
            TypeTag::Boolean => "boolean".to_string(),
            TypeTag::Symbol => "symbol".to_string(),
            TypeTag::Undefined => "undefined".to_string(),
            TypeTag::Null => "null".to_string(),
            TypeTag::Object => "object".to_string(),
            TypeTag::Function => "function".to_string(),
            TypeTag::Any => "any".to_string(),
            TypeTag::Mixed => "mixed".to_string(),
            TypeTag::Array(None) => "Array".to_string(),
            TypeTag::Array(Some(elem)) => format!("Array of {}", describe_tags(elem)),
            TypeTag::Tuple(elems) => {
                let parts = elems.iter().map(|e| describe_tags(e)).collect::<Vec<_>>();
                format!("[{}]", parts.join(", "))
            }
            TypeTag::Numeric(w) => w.name().to_string(),
            TypeTag::Nominal(path) => path.join("."),
            TypeTag::Generic(name) => name.clone(),
            TypeTag::Shape(fields) => {
                let keys = fields.iter().map(|f| f.key.clone()).collect::<Vec<_>>();
                let noun = if keys.len() == 1 { "property" } else { "properties" };
                format!("Object with {noun} {}", english_list(&keys, "and"))
            }
        }
    }
}

/// `"A, B or C"`.
pub fn describe_tags(tags: &[TypeTag]) -> String {
    let parts = tags.iter().map(TypeTag::describe).collect::<Vec<_>>();
    english_list(&parts, "or")
}

fn english_list(items: &[String], conj: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} {conj} {last}", init.join(", ")),
    }
}

/// Lists containing `any`, `mixed` or an erased generic admit every value.
pub fn is_unguardable(tags: &[TypeTag]) -> bool {
    tags.iter()
        .any(|t| matches!(t, TypeTag::Any | TypeTag::Mixed | TypeTag::Generic(_)))
}

pub fn permits_nully(tags: &[TypeTag]) -> bool {
    tags.iter()
        .any(|t| matches!(t, TypeTag::Null | TypeTag::Undefined))
}

fn push_unique(out: &mut Vec<TypeTag>, tag: TypeTag) {
    if !out.contains(&tag) {
        out.push(tag);
    }
}

fn extend_unique(out: &mut Vec<TypeTag>, tags: Vec<TypeTag>) {
    for tag in tags {
        push_unique(out, tag);
    }
}

/// Element tags of a container. Nested containers are not inspected.
fn element_tags(tags: Vec<TypeTag>) -> Option<Vec<TypeTag>> {
    if tags.is_empty() || is_unguardable(&tags) {
        return None;
    }
    let mut out = Vec::new();
    for tag in tags {
        let tag = match tag {
            TypeTag::Array(_) | TypeTag::Tuple(_) => TypeTag::Array(None),
            other => other,
        };
        push_unique(&mut out, tag);
    }
    Some(out)
}

/// Converts annotations to tag lists, expanding type aliases and erasing the
/// generic parameters in scope.
pub struct Annotations<'a> {
    aliases: &'a HashMap<String, TypeAlias>,
    generics: &'a [String],
}

#[derive(Default)]
struct Expansion {
    /// Aliases currently being expanded, innermost last.
    stack: Vec<String>,
    /// Alias parameter bindings, one frame per expansion.
    subst: Vec<HashMap<String, Option<TypeAnnotation>>>,
}

impl<'a> Annotations<'a> {
    pub fn new(aliases: &'a HashMap<String, TypeAlias>, generics: &'a [String]) -> Self {
        Self { aliases, generics }
    }

    pub fn extract(&self, ann: &TypeAnnotation) -> Result<Vec<TypeTag>, TransformError> {
        let mut exp = Expansion::default();
        let mut out = Vec::new();
        self.extract_into(ann, &mut exp, &mut out)?;
        Ok(out)
    }

    fn extract_list(
        &self,
        ann: &TypeAnnotation,
        exp: &mut Expansion,
    ) -> Result<Vec<TypeTag>, TransformError> {
        let mut out = Vec::new();
        self.extract_into(ann, exp, &mut out)?;
        Ok(out)
    }

    fn extract_into(
        &self,
        ann: &TypeAnnotation,
        exp: &mut Expansion,
        out: &mut Vec<TypeTag>,
    ) -> Result<(), TransformError> {
        match &ann.kind {
            TypeKind::String => push_unique(out, TypeTag::String),
            TypeKind::Number => push_unique(out, TypeTag::Number),
            TypeKind::Boolean => push_unique(out, TypeTag::Boolean),
            TypeKind::Symbol => push_unique(out, TypeTag::Symbol),
            TypeKind::Void => push_unique(out, TypeTag::Undefined),
            TypeKind::Null => push_unique(out, TypeTag::Null),
            TypeKind::Any => push_unique(out, TypeTag::Any),
            TypeKind::Mixed => push_unique(out, TypeTag::Mixed),
            TypeKind::Function { .. } => push_unique(out, TypeTag::Function),
            TypeKind::Parenthesized(inner) => self.extract_into(inner, exp, out)?,
            TypeKind::Nullable(inner) => {
                let mut tags = vec![TypeTag::Null];
                extend_unique(&mut tags, self.extract_list(inner, exp)?);
                extend_unique(out, tags);
            }
            TypeKind::Union(members) => {
                for m in members {
                    self.extract_into(m, exp, out)?;
                }
            }
            TypeKind::Array(elem) => {
                let elem = element_tags(self.extract_list(elem, exp)?);
                push_unique(out, TypeTag::Array(elem));
            }
            TypeKind::Tuple(elems) => {
                let mut positions = Vec::with_capacity(elems.len());
                for e in elems {
                    positions.push(element_tags(self.extract_list(e, exp)?).unwrap_or_default());
                }
                push_unique(out, TypeTag::Tuple(positions));
            }
            TypeKind::Object(props) => {
                if props.is_empty() {
                    push_unique(out, TypeTag::Object);
                    return Ok(());
                }
                let mut fields = Vec::with_capacity(props.len());
                for p in props {
                    let mut tags = self.extract_list(&p.value, exp)?;
                    if p.optional {
                        push_unique(&mut tags, TypeTag::Undefined);
                    }
                    fields.push(ShapeField {
                        key: p.key.node.clone(),
                        optional: p.optional,
                        tags,
                    });
                }
                push_unique(out, TypeTag::Shape(fields));
            }
            TypeKind::Generic { name, args } => self.extract_named(ann, name, args, exp, out)?,
            TypeKind::Intersection(_) | TypeKind::Typeof(_) => {
                return Err(TransformError::Contract {
                    message: format!("Unsupported annotation type: {}", ann.kind.kind_name()),
                    span: ann.span,
                });
            }
        }
        Ok(())
    }

    fn extract_named(
        &self,
        ann: &TypeAnnotation,
        name: &[flowguard_ast::Ident],
        args: &[TypeAnnotation],
        exp: &mut Expansion,
        out: &mut Vec<TypeTag>,
    ) -> Result<(), TransformError> {
        let path = name.iter().map(|n| n.node.clone()).collect::<Vec<_>>();
        let [simple] = path.as_slice() else {
            push_unique(out, TypeTag::Nominal(path));
            return Ok(());
        };

        // Alias parameters resolve in the scope that supplied the argument.
        let bound = exp.subst.last().and_then(|frame| frame.get(simple)).cloned();
        match bound {
            Some(Some(arg)) => {
                let frame = exp.subst.pop();
                let expanding = exp.stack.pop();
                let result = self.extract_into(&arg, exp, out);
                exp.stack.extend(expanding);
                exp.subst.extend(frame);
                return result;
            }
            Some(None) => {
                push_unique(out, TypeTag::Generic(simple.clone()));
                return Ok(());
            }
            None => {}
        }
        if self.generics.iter().any(|g| g == simple) {
            push_unique(out, TypeTag::Generic(simple.clone()));
            return Ok(());
        }

        if let Some(alias) = self.aliases.get(simple) {
            return self.expand_alias(ann, alias, args, exp, out);
        }

        match simple.as_str() {
            "Function" => push_unique(out, TypeTag::Function),
            "Object" => push_unique(out, TypeTag::Object),
            "Array" => {
                let elem = match args.first() {
                    Some(arg) => element_tags(self.extract_list(arg, exp)?),
                    None => None,
                };
                push_unique(out, TypeTag::Array(elem));
            }
            other => match NumericWidth::from_name(other) {
                Some(width) => push_unique(out, TypeTag::Numeric(width)),
                None => push_unique(out, TypeTag::Nominal(path)),
            },
        }
        Ok(())
    }

    fn expand_alias(
        &self,
        ann: &TypeAnnotation,
        alias: &TypeAlias,
        args: &[TypeAnnotation],
        exp: &mut Expansion,
        out: &mut Vec<TypeTag>,
    ) -> Result<(), TransformError> {
        let name = &alias.name.node;
        if exp.stack.iter().any(|n| n == name) {
            return Err(TransformError::Contract {
                message: format!("Type alias \"{name}\" refers to itself"),
                span: ann.span,
            });
        }

        // Parameters without an argument stay erased generics.
        let frame = alias
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| (param.node.clone(), args.get(i).cloned()))
            .collect::<HashMap<_, _>>();

        exp.stack.push(name.clone());
        exp.subst.push(frame);
        let result = self.extract_into(&alias.target, exp, out);
        exp.subst.pop();
        exp.stack.pop();
        result
    }
}

/// Extracts tags without aliases or generic parameters in scope.
pub fn extract_types(ann: &TypeAnnotation) -> Result<Vec<TypeTag>, TransformError> {
    let aliases = HashMap::new();
    Annotations::new(&aliases, &[]).extract(ann)
}
