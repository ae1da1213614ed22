//! Transformed programs executed end to end.

use flowguard_core::{transform_program, TransformError};
use flowguard_interpret::{ExecOutcome, Interpreter, RuntimeError, Value};

fn compile(src: &str) -> Result<String, TransformError> {
    let program = flowguard_parse::parse_source(src).expect("parse");
    let out = transform_program(&program)?;
    Ok(flowguard_parse::emit_program(&out.program))
}

/// Emits plain JavaScript, reads it back and runs it.
fn run(src: &str) -> Result<ExecOutcome, RuntimeError> {
    let js = compile(src).expect("transform");
    let program = flowguard_parse::parse_source(&js).expect("emitted code parses");
    Interpreter::new().exec_program(&program)
}

fn value(src: &str) -> Value {
    run(src).expect("run").value
}

fn violation(src: &str) -> String {
    match run(src) {
        Err(RuntimeError::Uncaught { name, message }) => {
            assert_eq!(name, "TypeError");
            message
        }
        other => panic!("expected a contract violation, got {other:?}"),
    }
}

const F: &str = "function f(a: string): boolean { return a === \"x\"; }\n";
const K: &str = "function k(a: string|number): string|number { return a; }\n";

#[test]
fn scenario_one_guards_the_argument_only() {
    assert_eq!(value(&format!("{F}f(\"x\")")), Value::Bool(true));
    assert_eq!(value(&format!("{F}f(\"y\")")), Value::Bool(false));
    assert_eq!(
        violation(&format!("{F}f(1)")),
        "Value of argument \"a\" violates contract, expected string got number"
    );
    let js = compile(F).expect("transform");
    assert_eq!(js.matches("throw new TypeError").count(), 1, "{js}");
}

#[test]
fn scenario_two_fails_before_running() {
    let err = compile("function g(a: number = \"x\"): number { return a; }\ng()").unwrap_err();
    assert!(err.is_contract());
    assert_eq!(
        err.message(),
        "Invalid default value for argument \"a\", expected number."
    );
}

#[test]
fn scenario_three_fails_before_running() {
    let err = compile("function h(): string { return 123; }").unwrap_err();
    assert_eq!(err.message(), "Invalid return type, expected string, got number.");
}

#[test]
fn scenario_four_union_arguments() {
    assert_eq!(value(&format!("{K}k(5)")), Value::Number(5.0));
    assert_eq!(value(&format!("{K}k(\"s\")")), Value::str("s"));
    assert_eq!(
        violation(&format!("{K}k(true)")),
        "Value of argument \"a\" violates contract, expected string or number got boolean"
    );
}

#[test]
fn scenario_five_opaque_initializer() {
    let src = "function compute() { return 1; }\nlet v: string = compute();";
    assert_eq!(
        violation(src),
        "Value of variable \"v\" violates contract, expected string got number"
    );

    let ok = "function compute() { return \"x\"; }\nlet v: string = compute();\nv";
    assert_eq!(value(ok), Value::str("x"));

    let js = compile("let v: string = \"static\";").expect("transform");
    assert!(!js.contains("throw"), "{js}");
}

#[test]
fn return_values_are_checked() {
    let src = "function g() { return null; }\nfunction f(): string { return g(); }\nf()";
    assert_eq!(
        violation(src),
        "Function \"f\" return value violates contract, expected string got null"
    );
    let src = "const f = function (): number { return \"1\" + 1; };\nf()";
    assert_eq!(
        violation(src),
        "Function return value violates contract, expected number got string"
    );
}

#[test]
fn messages_name_the_constructor_of_objects() {
    let src = "class Foo {}\nfunction f(a: string) {}\nf(new Foo())";
    assert_eq!(
        violation(src),
        "Value of argument \"a\" violates contract, expected string got Foo"
    );
    let src = "function f(a: string) {}\nf(new TypeError(\"x\"))";
    assert!(violation(src).ends_with("got TypeError"));
}

#[test]
fn nominal_types_use_instanceof() {
    let src = "class Point {}\nfunction f(p: Point) { return 1; }\n";
    assert_eq!(value(&format!("{src}f(new Point())")), Value::Number(1.0));
    assert_eq!(
        violation(&format!("{src}f({{}})")),
        "Value of argument \"p\" violates contract, expected Point got Object"
    );
}

#[test]
fn array_elements_are_checked() {
    let src = "function sum(xs: Array<number>) { let t = 0; for (const x of xs) t += x; return t; }\n";
    assert_eq!(value(&format!("{src}sum([1, 2, 3])")), Value::Number(6.0));
    assert_eq!(
        violation(&format!("{src}sum([1, \"2\"])")),
        "Value of argument \"xs\" violates contract, expected Array of number got Array"
    );
    assert!(violation(&format!("{src}sum(\"12\")")).ends_with("got string"));
}

#[test]
fn tuples_check_length_and_positions() {
    let src = "function f(t: [string, number]) { return t[1]; }\n";
    assert_eq!(value(&format!("{src}f([\"a\", 1])")), Value::Number(1.0));
    assert!(violation(&format!("{src}f([\"a\"])")).contains("expected [string, number]"));
    assert!(violation(&format!("{src}f([1, \"a\"])")).contains("expected [string, number]"));
}

#[test]
fn shapes_are_checked_recursively() {
    let src = "function f(p: { x: number, inner?: { y: string } }) { return p.x; }\n";
    assert_eq!(value(&format!("{src}f({{ x: 1 }})")), Value::Number(1.0));
    assert_eq!(
        value(&format!("{src}f({{ x: 2, inner: {{ y: \"ok\" }} }})")),
        Value::Number(2.0)
    );
    assert_eq!(
        violation(&format!("{src}f({{ x: \"1\" }})")),
        "Value of argument \"p\" violates contract, expected Object with properties x and inner got Object"
    );
    assert!(violation(&format!("{src}f({{ x: 1, inner: {{ y: 2 }} }})")).ends_with("got Object"));
    assert!(violation(&format!("{src}f(null)")).ends_with("got null"));
}

#[test]
fn numeric_widths_check_integrality_and_range() {
    let src = "function f(n: uint8) { return n; }\n";
    assert_eq!(value(&format!("{src}f(200)")), Value::Number(200.0));
    for bad in ["256", "-1", "1.5", "\"1\""] {
        let message = violation(&format!("{src}f({bad})"));
        assert!(message.contains("expected uint8 got "), "{message}");
    }
}

#[test]
fn optional_and_rest_arguments() {
    let src = "function f(a?: string, ...xs: Array<number>) { return xs.length; }\n";
    assert_eq!(value(&format!("{src}f()")), Value::Number(0.0));
    assert_eq!(value(&format!("{src}f(\"a\", 1, 2)")), Value::Number(2.0));
    assert_eq!(
        violation(&format!("{src}f(1)")),
        "Value of optional argument \"a\" violates contract, expected string or undefined got number"
    );
    assert_eq!(
        violation(&format!("{src}f(\"a\", 1, \"2\")")),
        "Value of rest argument \"xs\" violates contract, expected Array of number got Array"
    );
}

#[test]
fn opaque_returns_run_their_expression_once() {
    let src = r#"
        let calls = 0;
        function next() { calls += 1; return "v"; }
        function f(): string { return next(); }
        f();
        calls
    "#;
    assert_eq!(value(src), Value::Number(1.0));
}

#[test]
fn loop_bindings_are_checked_each_iteration() {
    let src = "let out = \"\";\nfor (const x: string of [\"a\", \"b\", 3]) { out += x; }\n";
    assert_eq!(
        violation(src),
        "Value of variable \"x\" violates contract, expected string got number"
    );
}

#[test]
fn methods_and_arrows_are_guarded() {
    let src = r#"
        class Counter {
            constructor(start: number) { this.n = start; }
            add(k: number): number { this.n += k; return this.n; }
        }
        const double = (x: number): number => x * 2;
        const c = new Counter(1);
        double(c.add(2))
    "#;
    assert_eq!(value(src), Value::Number(6.0));
    assert!(violation("class C { constructor(s: string) {} }\nnew C(1)").contains("\"s\""));
    assert!(violation("const d = (x: number): number => x * 2;\nd(\"a\")").contains("\"x\""));
}

#[test]
fn any_and_mixed_never_throw() {
    let src = "function f(x: any, y: mixed): any { return x; }\n";
    for arg in ["1", "\"s\"", "null", "undefined", "[1]", "{}"] {
        run(&format!("{src}f({arg}, {arg})")).expect("unguarded");
    }
    assert!(!compile(src).expect("transform").contains("throw"));
}

#[test]
fn both_branches_returning_is_not_a_missing_return() {
    let src = "function sign(n: number): string {\n    if (n < 0) {\n        return \"-\";\n    } else {\n        return \"+\";\n    }\n}\nsign(-3) + sign(3)";
    assert_eq!(value(src), Value::str("-+"));
}

#[test]
fn unannotated_programs_behave_the_same() {
    let src = "function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); }\nconsole.log(fact(5));\nfact(6)";
    let program = flowguard_parse::parse_source(src).expect("parse");
    let before = Interpreter::new().exec_program(&program).expect("run");
    let after = run(src).expect("run");
    assert_eq!(before.value, after.value);
    assert_eq!(before.stdout, after.stdout);
    assert_eq!(after.stdout, "120\n");
}

#[test]
fn returns_inside_braceless_loop_bodies_are_checked() {
    let src = "function pick(v) { return v; }\nfunction first(xs): string { for (const v of xs) return pick(v); return \"none\"; }\n";
    assert_eq!(value(&format!("{src}first([\"a\", 1])")), Value::str("a"));
    assert_eq!(value(&format!("{src}first([])")), Value::str("none"));
    assert_eq!(
        violation(&format!("{src}first([5])")),
        "Function \"first\" return value violates contract, expected string got number"
    );
}

#[test]
fn class_properties_are_checked_on_construction() {
    let src = "function id(v) { return v; }\nclass P { x: number = id(1); constructor(k) { this.x = this.x + k; } }\n";
    assert_eq!(value(&format!("{src}const p = new P(2);\np.x")), Value::Number(3.0));

    let src = "function id(v) { return v; }\nclass A { x: number = id(\"s\"); }\n";
    assert_eq!(
        violation(&format!("{src}new A()")),
        "Value of property \"x\" violates contract, expected number got string"
    );
    // The class itself is fine until something constructs it.
    run(&format!("{src}A")).expect("no instance, no check");

    assert_eq!(
        violation(&format!("{src}class S {{ static n: number = id(\"1\"); }}\nS.n")),
        "Value of property \"n\" violates contract, expected number got string"
    );
}

#[test]
fn element_checks_work_for_a_class_named_item() {
    let src = "class item {}\nfunction count(xs: Array<item>) { return xs.length; }\n";
    assert_eq!(value(&format!("{src}count([new item(), new item()])")), Value::Number(2.0));
    assert_eq!(
        violation(&format!("{src}count([1])")),
        "Value of argument \"xs\" violates contract, expected Array of item got Array"
    );
}
