use flowguard_core::{extract_types, transform_program, verify, NumericWidth, TypeTag, Verdict};
use flowguard_interpret::{Interpreter, RuntimeError, Value};
use proptest::{
    prelude::{prop, Strategy},
    test_runner::{Config, TestCaseError, TestRunner},
};

const MEMBERS: [&str; 8] = [
    "string",
    "number",
    "boolean",
    "null",
    "undefined",
    "Date",
    "uint8",
    "Array<string>",
];

const WIDTHS: [&str; 6] = ["int8", "uint8", "int16", "uint16", "int32", "uint32"];

fn tags_of(src: &str) -> Vec<TypeTag> {
    let ann = flowguard_parse::parse_type(src).expect("parse type");
    extract_types(&ann).expect("extract")
}

fn same_set(a: &[TypeTag], b: &[TypeTag]) -> bool {
    a.iter().all(|t| b.contains(t)) && b.iter().all(|t| a.contains(t))
}

fn fail(e: impl std::fmt::Debug) -> TestCaseError {
    TestCaseError::fail(format!("{e:?}"))
}

#[test]
fn union_order_does_not_change_the_tag_set() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    let strat = prop::sample::subsequence(MEMBERS.to_vec(), 1..=MEMBERS.len()).prop_shuffle();

    runner
        .run(&strat, |members| {
            let shuffled = tags_of(&members.join(" | "));
            let mut canonical = members.clone();
            canonical.sort_unstable();
            let sorted = tags_of(&canonical.join(" | "));
            if !same_set(&shuffled, &sorted) {
                return Err(TestCaseError::fail(format!(
                    "{members:?}: {shuffled:?} vs {sorted:?}"
                )));
            }
            Ok(())
        })
        .expect("union extraction is order independent");
}

#[test]
fn literal_verdicts_follow_numeric_ranges() {
    let mut runner = TestRunner::new(Config {
        cases: 128,
        ..Config::default()
    });
    let strat = (prop::sample::select(WIDTHS.to_vec()), -70_000i64..70_000);

    runner
        .run(&strat, |(width, n)| {
            let tags = tags_of(width);
            let expr = flowguard_parse::parse_expr(&n.to_string()).map_err(fail)?;
            let expected = NumericWidth::from_name(width)
                .map(|w| w.accepts(n as f64))
                .ok_or_else(|| TestCaseError::fail(width))?;
            let verdict = verify(&expr, &tags);
            let agrees = match verdict {
                Verdict::Valid => expected,
                Verdict::Invalid("number") => !expected,
                _ => false,
            };
            if !agrees {
                return Err(TestCaseError::fail(format!("{n} as {width}: {verdict:?}")));
            }
            Ok(())
        })
        .expect("numeric literal verdicts");
}

#[test]
fn string_literals_are_valid_strings() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    let tags = tags_of("string");

    runner
        .run(&"[a-z ]{0,12}", |s| {
            let expr = flowguard_parse::parse_expr(&format!("\"{s}\"")).map_err(fail)?;
            match verify(&expr, &tags) {
                Verdict::Valid => Ok(()),
                other => Err(TestCaseError::fail(format!("{s:?}: {other:?}"))),
            }
        })
        .expect("string literal verdicts");
}

/// The guard inserted for an opaque value agrees with the static range check.
#[test]
fn runtime_guards_agree_with_static_ranges() {
    let mut runner = TestRunner::new(Config {
        cases: 48,
        ..Config::default()
    });
    let strat = (prop::sample::select(WIDTHS.to_vec()), -70_000i64..70_000);

    runner
        .run(&strat, |(width, n)| {
            let src = format!("function id(x) {{ return x; }}\nlet v: {width} = id({n});\nv");
            let program = flowguard_parse::parse_source(&src).map_err(fail)?;
            let out = transform_program(&program).map_err(fail)?;
            let accepted = NumericWidth::from_name(width)
                .map(|w| w.accepts(n as f64))
                .ok_or_else(|| TestCaseError::fail(width))?;
            match Interpreter::new().exec_program(&out.program) {
                Ok(run) if accepted && run.value == Value::Number(n as f64) => Ok(()),
                Err(RuntimeError::Uncaught { name, .. }) if !accepted && name == "TypeError" => {
                    Ok(())
                }
                other => Err(TestCaseError::fail(format!("{n} as {width}: {other:?}"))),
            }
        })
        .expect("runtime guards match static ranges");
}
