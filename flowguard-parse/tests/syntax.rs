use flowguard_ast::{ExprKind, ForBinding, ForInKind, FunctionBody, Stmt, TypeKind};
use flowguard_parse::{emit_program, format_program, format_type, parse_expr, parse_source, parse_type};

#[test]
fn annotated_function_parses() {
    let src = "function f(a: string, b?: number = 1, ...rest: Array<number>): ?string {\n    return a;\n}\n";
    let program = parse_source(src).expect("function should parse");
    let Stmt::Function(f) = &program.stmts[0] else {
        panic!("expected a function declaration");
    };
    assert_eq!(f.name.as_ref().map(|n| n.node.as_str()), Some("f"));
    assert_eq!(f.params.len(), 3);
    assert!(f.params[1].optional);
    assert!(f.params[1].default.is_some());
    assert!(f.params[2].rest);
    assert!(matches!(
        f.return_type.as_ref().map(|t| &t.kind),
        Some(TypeKind::Nullable(_))
    ));
}

#[test]
fn missing_semicolon_on_same_line_is_rejected() {
    let err = parse_source("var a = 1 var b = 2").expect_err("expected parse error");
    assert!(err.to_string().contains("expected ';'"), "unexpected error: {err}");
}

#[test]
fn newlines_terminate_statements() {
    let program = parse_source("var a = 1\nvar b = a\nreturnValue(b)\n").expect("should parse");
    assert_eq!(program.stmts.len(), 3);
}

#[test]
fn arrow_functions_and_parenthesized_expressions() {
    let e = parse_expr("(a: number, b): string => a + b").expect("arrow should parse");
    let ExprKind::Function(f) = &e.kind else {
        panic!("expected arrow function");
    };
    assert!(f.is_arrow);
    assert_eq!(f.params.len(), 2);
    assert!(matches!(f.body, FunctionBody::Expr(_)));

    let e = parse_expr("(a + b) * c").expect("parenthesized expr");
    assert!(matches!(e.kind, ExprKind::Binary { .. }));

    let e = parse_expr("x ? (y) : z").expect("conditional");
    assert!(matches!(e.kind, ExprKind::Conditional { .. }));
}

#[test]
fn for_in_and_for_of_heads() {
    let program = parse_source(
        "for (const k in obj) { k; }\nfor (let v: string of list) { v; }\nfor (x of xs) x;\nfor (var i = 0; i < 3; i++) {}\n",
    )
    .expect("loops should parse");
    let Stmt::ForIn(a) = &program.stmts[0] else {
        panic!("expected for-in");
    };
    assert_eq!(a.kind, ForInKind::In);
    let Stmt::ForIn(b) = &program.stmts[1] else {
        panic!("expected for-of");
    };
    assert_eq!(b.kind, ForInKind::Of);
    let ForBinding::Decl(decl) = &b.left else {
        panic!("expected declaration binding");
    };
    assert!(decl.decls[0].ty.is_some());
    let Stmt::ForIn(c) = &program.stmts[2] else {
        panic!("expected for-of");
    };
    assert!(matches!(c.left, ForBinding::Target(_)));
    assert!(matches!(program.stmts[3], Stmt::For(_)));
}

#[test]
fn type_syntax_covers_flow_forms() {
    for src in [
        "string | number",
        "?Array<string>",
        "{ x: number, y?: string }",
        "[number, string]",
        "number[]",
        "(x: number) => string",
        "Foo.Bar",
        "typeof value",
        "A & B",
    ] {
        let ty = parse_type(src).unwrap_or_else(|e| panic!("{src}: {e}"));
        assert_eq!(format_type(&ty), src);
    }
    let err = parse_type("'a'").expect_err("literal types are unsupported");
    assert!(err.to_string().contains("unsupported type syntax"), "unexpected error: {err}");
}

#[test]
fn parenthesized_type_is_kept() {
    let ty = parse_type("(string | number)[]").expect("should parse");
    let TypeKind::Array(elem) = &ty.kind else {
        panic!("expected array");
    };
    assert!(matches!(elem.kind, TypeKind::Parenthesized(_)));
}

#[test]
fn type_alias_and_class_parse() {
    let src = r#"
type Point = { x: number, y: number };
class Shape {
    constructor(p: Point) {
        this.p = p;
    }
    static origin(): Point {
        return { x: 0, y: 0 };
    }
}
"#;
    let program = parse_source(src).expect("should parse");
    assert!(matches!(program.stmts[0], Stmt::TypeAlias(_)));
    let Stmt::Class(c) = &program.stmts[1] else {
        panic!("expected class");
    };
    assert_eq!(c.methods.len(), 2);
    assert!(c.methods[1].is_static);
}

#[test]
fn class_properties_parse() {
    let src = "class Counter {\n    count: number = 0\n    static label: string = \"c\";\n    static = 1;\n    tag: ?string;\n    inc() { this.count += 1; }\n}\n";
    let program = parse_source(src).expect("should parse");
    let Stmt::Class(c) = &program.stmts[0] else {
        panic!("expected class");
    };
    let keys: Vec<_> = c.properties.iter().map(|p| p.key.node.as_str()).collect();
    assert_eq!(keys, ["count", "label", "static", "tag"]);
    assert!(!c.properties[0].is_static);
    assert!(c.properties[1].is_static);
    assert!(!c.properties[2].is_static);
    assert!(c.properties[3].value.is_none());
    assert!(matches!(
        c.properties[3].ty.as_ref().map(|t| &t.kind),
        Some(TypeKind::Nullable(_))
    ));
    assert_eq!(c.methods.len(), 1);
}

#[test]
fn regex_and_division_coexist() {
    let program = parse_source("var r = /a\\/b/g;\nvar q = a / b / c;\n").expect("should parse");
    let Stmt::VarDecl(d) = &program.stmts[0] else {
        panic!("expected var");
    };
    assert!(matches!(
        d.decls[0].init.as_ref().map(|e| &e.kind),
        Some(ExprKind::Regex { .. })
    ));
}

#[test]
fn format_then_emit_is_stable() {
    let src = "function id<T>(x: T): T {\n    return x;\n}\nconst n: number = id(1);\n";
    let program = parse_source(src).expect("should parse");
    assert_eq!(format_program(&program), src);
    let emitted = emit_program(&program);
    assert_eq!(emitted, "function id(x) {\n    return x;\n}\nconst n = id(1);\n");
    let reparsed = parse_source(&emitted).expect("emitted code parses");
    assert_eq!(emit_program(&reparsed), emitted);
}

#[test]
fn object_literal_statement_is_parenthesized() {
    let program = parse_source("({ a: 1 }).a;\n").expect("should parse");
    assert_eq!(format_program(&program), "({ a: 1 }.a);\n");
}
