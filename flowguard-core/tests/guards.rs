use flowguard_core::{transform_program, TransformOutput};

fn transform(src: &str) -> TransformOutput {
    let program = flowguard_parse::parse_source(src).expect("parse");
    transform_program(&program).expect("transform")
}

fn emit(src: &str) -> String {
    flowguard_parse::emit_program(&transform(src).program)
}

fn contract_error(src: &str) -> String {
    let program = flowguard_parse::parse_source(src).expect("parse");
    let err = transform_program(&program).unwrap_err();
    assert!(err.is_contract(), "expected a contract error, got {err:?}");
    err.message().to_string()
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("{needle:?} not found in:\n{haystack}"))
}

#[test]
fn argument_guard_and_verified_boolean_return() {
    let out = transform("function f(a: string): boolean { return a === \"x\"; }");
    assert_eq!(out.stats.functions, 1);
    assert_eq!(out.stats.guards_inserted, 1);
    assert_eq!(out.stats.statically_verified, 1);

    let js = flowguard_parse::emit_program(&out.program);
    assert!(js.contains("if (typeof a !== \"string\")"), "{js}");
    assert!(
        js.contains("Value of argument \\\"a\\\" violates contract, expected string got "),
        "{js}"
    );
    assert!(js.contains("return a === \"x\";"), "{js}");
    assert!(!js.contains(": string"), "annotations must be erased:\n{js}");
}

#[test]
fn union_guard_requires_every_member_to_fail() {
    let js = emit("function k(a: string|number): string|number { return a; }");
    assert!(
        js.contains("typeof a !== \"string\" && typeof a !== \"number\""),
        "{js}"
    );
    assert!(js.contains("expected string or number got "), "{js}");
    assert!(js.contains("Function \\\"k\\\" return value violates contract"), "{js}");
}

#[test]
fn invalid_default_value_is_rejected() {
    assert_eq!(
        contract_error("function g(a: number = \"x\"): number { return a; }"),
        "Invalid default value for argument \"a\", expected number."
    );
}

#[test]
fn invalid_literal_return_is_rejected() {
    assert_eq!(
        contract_error("function h(): string { return 123; }"),
        "Invalid return type, expected string, got number."
    );
    assert_eq!(
        contract_error("function h(): string { return; }"),
        "Invalid return type, expected string, got undefined."
    );
}

#[test]
fn missing_return_is_rejected() {
    assert_eq!(
        contract_error("function h(): string { const g = () => { return \"x\"; }; }"),
        "Function \"h\" did not return a value, expected string."
    );
    // Nullable and void results may fall off the end.
    transform("function h(): ?string {}\nfunction v(): void {}");
}

#[test]
fn variable_guard_follows_the_declaration() {
    let out = transform("let v: string = compute();");
    assert_eq!(out.stats.guards_inserted, 1);
    let js = flowguard_parse::emit_program(&out.program);
    let decl = position(&js, "let v = compute();");
    let guard = position(&js, "if (typeof v !== \"string\")");
    assert!(decl < guard, "{js}");
    assert!(js.contains("Value of variable \\\"v\\\" violates contract"), "{js}");
}

#[test]
fn statically_valid_variable_needs_no_guard() {
    let out = transform("let v: string = \"static\";");
    assert_eq!(out.stats.guards_inserted, 0);
    assert_eq!(out.stats.statically_verified, 1);
    assert_eq!(flowguard_parse::emit_program(&out.program), "let v = \"static\";\n");
}

#[test]
fn invalid_variable_initializer_is_rejected() {
    assert_eq!(
        contract_error("const v: string = 5;"),
        "Invalid value for variable \"v\", expected string, got number."
    );
}

#[test]
fn uninitialized_declarations_are_not_guarded() {
    let out = transform("let v: string;");
    assert_eq!(out.stats.guards_inserted, 0);
}

#[test]
fn opaque_return_is_evaluated_once() {
    let js = emit("function f(): string { return compute(); }");
    let temp = position(&js, "const _compute = compute();");
    let guard = position(&js, "if (typeof _compute !== \"string\")");
    let ret = position(&js, "return _compute;");
    assert!(temp < guard && guard < ret, "{js}");
}

#[test]
fn temporaries_avoid_existing_names() {
    let js = emit("const _compute = 1;\nfunction f(): string { return compute(); }");
    assert!(js.contains("const _compute2 = compute();"), "{js}");
    assert!(js.contains("return _compute2;"), "{js}");
}

#[test]
fn identifier_returns_are_guarded_in_place() {
    let js = emit("function f(x): number { return x; }");
    let guard = position(&js, "if (typeof x !== \"number\")");
    let ret = position(&js, "return x;");
    assert!(guard < ret, "{js}");
    assert!(!js.contains("const _"), "{js}");
}

#[test]
fn constants_are_resolved_through_scopes() {
    let out = transform("const s = \"x\";\nfunction f(): string { return s; }");
    assert_eq!(out.stats.guards_inserted, 0);
    assert_eq!(out.stats.statically_verified, 1);

    assert_eq!(
        contract_error("const n = 1;\nfunction f(): string { return n; }"),
        "Invalid return type, expected string, got number."
    );

    // The parameter shadows the constant.
    let out = transform("const s = \"x\";\nfunction f(s): string { return s; }");
    assert_eq!(out.stats.guards_inserted, 1);

    // So does an inner `let`.
    let out = transform("const s = \"x\";\nfunction f(): string { let s = g(); return s; }");
    assert_eq!(out.stats.guards_inserted, 1);
}

#[test]
fn generic_parameters_are_erased() {
    let out = transform("function id<T>(x: T, y: T | string): T { return x; }");
    assert_eq!(out.stats.guards_inserted, 0);
    // Nested functions see the outer parameters.
    let out = transform("function outer<T>() { return function (x: T) {}; }");
    assert_eq!(out.stats.guards_inserted, 0);
}

#[test]
fn optional_and_rest_parameters() {
    let js = emit("function f(a?: string, ...xs: Array<number>) {}");
    assert!(
        js.contains("typeof a !== \"string\" && typeof a !== \"undefined\""),
        "{js}"
    );
    assert!(js.contains("Value of optional argument \\\"a\\\""), "{js}");
    assert!(js.contains("!Array.isArray(xs) || xs.some(function (item) {"), "{js}");
    assert!(js.contains("return typeof item !== \"number\";"), "{js}");
    assert!(js.contains("Value of rest argument \\\"xs\\\""), "{js}");
}

#[test]
fn argument_guards_keep_parameter_order() {
    let js = emit("function f(a: string, b: number) { return a; }");
    let a = position(&js, "typeof a !== \"string\"");
    let b = position(&js, "typeof b !== \"number\"");
    assert!(a < b, "{js}");
}

#[test]
fn concise_arrow_bodies_gain_a_block() {
    let js = emit("const double = (x: number): number => x * 2;");
    assert!(js.contains("const _ref = x * 2;"), "{js}");
    assert!(js.contains("return _ref;"), "{js}");

    // Unannotated arrows are left alone.
    assert_eq!(emit("const inc = (x) => x + 1;"), "const inc = (x) => x + 1;\n");
}

#[test]
fn loop_head_bindings_are_checked_in_the_body() {
    let js = emit("for (const x: string of xs) { use(x); }");
    let guard = position(&js, "if (typeof x !== \"string\")");
    let call = position(&js, "use(x);");
    assert!(guard < call, "{js}");
}

#[test]
fn class_methods_are_guarded() {
    let out = transform(
        "class P {\n  constructor(x: number) { this.x = x; }\n  get(): number { return this.x; }\n}",
    );
    assert_eq!(out.stats.functions, 2);
    assert_eq!(out.stats.guards_inserted, 2);
}

#[test]
fn nested_functions_have_independent_returns() {
    let out = transform(
        "function outer(): string {\n  const f = function (): number { return 1; };\n  return \"s\";\n}",
    );
    assert_eq!(out.stats.functions, 2);
    assert_eq!(out.stats.guards_inserted, 0);
    assert_eq!(out.stats.statically_verified, 2);
}

#[test]
fn nominal_shape_and_numeric_guards() {
    let js = emit("function f(d: Date, p: { x: number }, n: uint8) {}");
    assert!(js.contains("!(d instanceof Date)"), "{js}");
    assert!(
        js.contains("typeof p !== \"object\" || p === null || typeof p.x !== \"number\""),
        "{js}"
    );
    assert!(
        js.contains("typeof n !== \"number\" || n % 1 !== 0 || n < 0 || n > 255"),
        "{js}"
    );
}

#[test]
fn type_aliases_are_expanded_and_erased() {
    let out = transform("type Id = string | number;\nfunction f(a: Id) {}");
    let js = flowguard_parse::emit_program(&out.program);
    assert!(!js.contains("type Id"), "{js}");
    assert!(js.contains("expected string or number got "), "{js}");

    // Aliases declared later in the unit are visible too.
    let out = transform("function f(a: Id) {}\ntype Id = string;");
    assert_eq!(out.stats.guards_inserted, 1);

    assert_eq!(
        contract_error("type A = B;\ntype B = A;\nfunction f(a: A) {}"),
        "Type alias \"A\" refers to itself"
    );
}

#[test]
fn unsupported_annotation_aborts_the_unit() {
    assert_eq!(
        contract_error("function ok(a: string) {}\nfunction f(a: A & B) {}"),
        "Unsupported annotation type: IntersectionTypeAnnotation"
    );
}

#[test]
fn unannotated_code_is_untouched() {
    let src = "function f(a, b) {\n    return a + b;\n}\n";
    let out = transform(src);
    assert_eq!(out.stats.guards_inserted, 0);
    assert_eq!(flowguard_parse::emit_program(&out.program), src);
}

#[test]
fn returns_in_single_statement_branches_are_wrapped() {
    let out = transform("function f(x): string { if (x) return g(); return \"a\"; }");
    assert_eq!(out.stats.guards_inserted, 1);
    assert_eq!(out.stats.statically_verified, 1);
    let js = flowguard_parse::emit_program(&out.program);
    let open = position(&js, "if (x) {");
    let temp = position(&js, "const _g = g();");
    let guard = position(&js, "if (typeof _g !== \"string\")");
    let ret = position(&js, "return _g;");
    let close = position(&js, "return \"a\";");
    assert!(open < temp && temp < guard && guard < ret && ret < close, "{js}");
    assert_eq!(js.matches("throw new TypeError").count(), 1, "{js}");
}

#[test]
fn class_property_guards_open_the_constructor() {
    let src = "class Box {\n    value: number = make();\n    label: string = \"b\";\n    constructor(v: string) { this.tag = v; }\n}";
    let out = transform(src);
    assert_eq!(out.stats.functions, 1);
    assert_eq!(out.stats.guards_inserted, 2);
    assert_eq!(out.stats.statically_verified, 1);
    let js = flowguard_parse::emit_program(&out.program);
    assert!(js.contains("value = make();"), "{js}");
    assert!(js.contains("label = \"b\";"), "{js}");
    let ctor = position(&js, "constructor(v) {");
    let field = position(&js, "if (typeof this.value !== \"number\")");
    let param = position(&js, "if (typeof v !== \"string\")");
    let body = position(&js, "this.tag = v;");
    assert!(ctor < field && field < param && param < body, "{js}");
    assert!(js.contains("Value of property \\\"value\\\" violates contract"), "{js}");
    assert!(!js.contains(": number"), "annotations must be erased:\n{js}");
}

#[test]
fn class_without_constructor_gets_one_for_property_guards() {
    let out = transform("class A { x: number = id(1); get() { return this.x; } }");
    assert_eq!(out.stats.functions, 1);
    let js = flowguard_parse::emit_program(&out.program);
    let ctor = position(&js, "constructor() {");
    let guard = position(&js, "if (typeof this.x !== \"number\")");
    let method = position(&js, "get() {");
    assert!(ctor < guard && guard < method, "{js}");

    // Nothing to check, nothing added.
    let js = emit("class B { x: number; y = id(1); z: number = 2; }");
    assert!(!js.contains("constructor"), "{js}");
    assert!(!js.contains("throw"), "{js}");
}

#[test]
fn static_property_guards_follow_the_class() {
    let js = emit("class A { static n: number = load(); }\nA.n");
    let class = position(&js, "class A {");
    let guard = position(&js, "if (typeof A.n !== \"number\")");
    let next = position(&js, "A.n;\n");
    assert!(class < guard && guard < next, "{js}");
    assert!(!js.contains("constructor"), "{js}");
}

#[test]
fn invalid_property_initializer_is_rejected() {
    assert_eq!(
        contract_error("class A { x: number = \"s\"; }\nnew A()"),
        "Invalid value for property \"x\", expected number, got string."
    );
    assert_eq!(
        contract_error("class A { static label: ?string = 5; }"),
        "Invalid value for property \"label\", expected null or string, got number."
    );
}

#[test]
fn element_callback_avoids_class_names() {
    let js = emit("class item {}\nfunction f(xs: Array<item>) {}");
    assert!(js.contains("xs.some(function (item2) {"), "{js}");
    assert!(js.contains("return !(item2 instanceof item);"), "{js}");
}
