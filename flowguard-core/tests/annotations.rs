use std::collections::HashMap;

use flowguard_ast::{Stmt, TypeAlias};
use flowguard_core::{
    describe_tags, extract_types, is_unguardable, Annotations, NumericWidth, ShapeField, TypeTag,
};

fn tags(src: &str) -> Vec<TypeTag> {
    let ty = flowguard_parse::parse_type(src).expect("parse type");
    extract_types(&ty).expect("extract")
}

fn aliases(src: &str) -> HashMap<String, TypeAlias> {
    let program = flowguard_parse::parse_source(src).expect("parse");
    program
        .stmts
        .into_iter()
        .filter_map(|s| match s {
            Stmt::TypeAlias(a) => Some((a.name.node.clone(), a)),
            _ => None,
        })
        .collect()
}

fn tags_with(aliases: &HashMap<String, TypeAlias>, generics: &[String], src: &str) -> Vec<TypeTag> {
    let ty = flowguard_parse::parse_type(src).expect("parse type");
    Annotations::new(aliases, generics).extract(&ty).expect("extract")
}

#[test]
fn primitives_and_unions() {
    assert_eq!(tags("string"), vec![TypeTag::String]);
    assert_eq!(tags("void"), vec![TypeTag::Undefined]);
    assert_eq!(tags("null"), vec![TypeTag::Null]);
    assert_eq!(tags("string | number"), vec![TypeTag::String, TypeTag::Number]);
    assert_eq!(tags("(string | string)"), vec![TypeTag::String]);
    assert_eq!(tags("?number"), vec![TypeTag::Null, TypeTag::Number]);
    assert_eq!(tags("() => void"), vec![TypeTag::Function]);
}

#[test]
fn any_and_mixed_are_unguardable() {
    assert!(is_unguardable(&tags("any")));
    assert!(is_unguardable(&tags("string | mixed")));
    assert!(!is_unguardable(&tags("?string")));
}

#[test]
fn special_names() {
    assert_eq!(tags("Function"), vec![TypeTag::Function]);
    assert_eq!(tags("Object"), vec![TypeTag::Object]);
    assert_eq!(tags("{}"), vec![TypeTag::Object]);
    assert_eq!(tags("Array"), vec![TypeTag::Array(None)]);
    assert_eq!(tags("Date"), vec![TypeTag::Nominal(vec!["Date".into()])]);
    assert_eq!(
        tags("React.Component"),
        vec![TypeTag::Nominal(vec!["React".into(), "Component".into()])]
    );
    assert_eq!(tags("uint8"), vec![TypeTag::Numeric(NumericWidth::Uint8)]);
}

#[test]
fn containers_keep_one_level_of_elements() {
    assert_eq!(tags("string[]"), vec![TypeTag::Array(Some(vec![TypeTag::String]))]);
    assert_eq!(
        tags("Array<string | number>"),
        vec![TypeTag::Array(Some(vec![TypeTag::String, TypeTag::Number]))]
    );
    assert_eq!(
        tags("number[][]"),
        vec![TypeTag::Array(Some(vec![TypeTag::Array(None)]))]
    );
    assert_eq!(tags("Array<any>"), vec![TypeTag::Array(None)]);
    assert_eq!(
        tags("[string, any]"),
        vec![TypeTag::Tuple(vec![vec![TypeTag::String], vec![]])]
    );
}

#[test]
fn object_shapes() {
    assert_eq!(
        tags("{ a: string, b?: number }"),
        vec![TypeTag::Shape(vec![
            ShapeField {
                key: "a".into(),
                optional: false,
                tags: vec![TypeTag::String],
            },
            ShapeField {
                key: "b".into(),
                optional: true,
                tags: vec![TypeTag::Number, TypeTag::Undefined],
            },
        ])]
    );
}

#[test]
fn unsupported_annotations_are_contract_errors() {
    for (src, kind) in [
        ("A & B", "IntersectionTypeAnnotation"),
        ("typeof x", "TypeofTypeAnnotation"),
    ] {
        let ty = flowguard_parse::parse_type(src).expect("parse type");
        let err = extract_types(&ty).unwrap_err();
        assert!(err.is_contract());
        assert_eq!(err.message(), format!("Unsupported annotation type: {kind}"));
    }
}

#[test]
fn aliases_expand_with_arguments() {
    let aliases = aliases("type Maybe<T> = ?T;\ntype Box<T> = { v: T };\ntype Id = string;");
    assert_eq!(tags_with(&aliases, &[], "Id"), vec![TypeTag::String]);
    assert_eq!(
        tags_with(&aliases, &[], "Maybe<number>"),
        vec![TypeTag::Null, TypeTag::Number]
    );
    // Missing arguments stay erased.
    assert!(is_unguardable(&tags_with(&aliases, &[], "Maybe")));

    let inner = TypeTag::Shape(vec![ShapeField {
        key: "v".into(),
        optional: false,
        tags: vec![TypeTag::String],
    }]);
    assert_eq!(
        tags_with(&aliases, &[], "Box<Box<string>>"),
        vec![TypeTag::Shape(vec![ShapeField {
            key: "v".into(),
            optional: false,
            tags: vec![inner],
        }])]
    );
}

#[test]
fn alias_arguments_resolve_in_the_callers_scope() {
    let aliases = aliases("type Maybe<T> = ?T;");
    let generics = vec!["T".to_string()];
    // `T` here is the function's own parameter, not the alias's.
    assert!(is_unguardable(&tags_with(&aliases, &generics, "Maybe<T>")));
    assert!(is_unguardable(&tags_with(&aliases, &generics, "T")));
    assert_eq!(
        tags_with(&aliases, &generics, "Maybe<string>"),
        vec![TypeTag::Null, TypeTag::String]
    );
}

#[test]
fn alias_cycles_are_rejected() {
    let aliases = aliases("type A = B;\ntype B = string | A;");
    let ty = flowguard_parse::parse_type("A").expect("parse type");
    let err = Annotations::new(&aliases, &[]).extract(&ty).unwrap_err();
    assert_eq!(err.message(), "Type alias \"A\" refers to itself");
}

#[test]
fn descriptions_read_as_english() {
    assert_eq!(describe_tags(&tags("string | number")), "string or number");
    assert_eq!(
        describe_tags(&tags("string | number | boolean")),
        "string, number or boolean"
    );
    assert_eq!(describe_tags(&tags("Array<string>")), "Array of string");
    assert_eq!(describe_tags(&tags("[string, number]")), "[string, number]");
    assert_eq!(
        describe_tags(&tags("{ x: number, y: number }")),
        "Object with properties x and y"
    );
    assert_eq!(describe_tags(&tags("?Date")), "null or Date");
}
