use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn flowguard(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flowguard"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("FLOWGUARD_LOG")
        .output()
        .expect("spawn flowguard")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

const GREET: &str = "function greet(name: string): string {\n    return \"hi \" + name;\n}\nconsole.log(greet(\"ada\"));\n";

#[test]
fn build_emits_plain_javascript() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("greet.js"), GREET).expect("write");

    let out = flowguard(dir.path(), &["build", "greet.js"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let js = stdout(&out);
    assert!(js.contains("typeof name !== \"string\""), "{js}");
    assert!(!js.contains(": string"), "{js}");

    let out = flowguard(dir.path(), &["build", "greet.js", "--out", "out/greet.js"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let written = fs::read_to_string(dir.path().join("out/greet.js")).expect("output");
    assert_eq!(written, js);
}

#[test]
fn build_without_arguments_uses_the_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("src")).expect("mkdir");
    fs::write(dir.path().join("src/greet.js"), GREET).expect("write");
    fs::write(
        dir.path().join("Flowguard.toml"),
        "[project]\nname = \"demo\"\n\n[build]\nsources = [\"src/greet.js\"]\n",
    )
    .expect("write");

    let out = flowguard(dir.path(), &["build"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let js = fs::read_to_string(dir.path().join("dist/src/greet.js")).expect("output");
    assert!(js.contains("throw new TypeError"), "{js}");
}

#[test]
fn build_without_arguments_or_manifest_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = flowguard(dir.path(), &["build"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Flowguard.toml"), "{}", stderr(&out));
}

#[test]
fn build_rejects_a_file_together_with_a_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("greet.js"), GREET).expect("write");
    fs::write(dir.path().join("Flowguard.toml"), "[build]\nsources = []\n").expect("write");

    let out = flowguard(dir.path(), &["build", "greet.js", "--manifest", "Flowguard.toml"]);
    assert!(!out.status.success());
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("cannot be used with"), "{}", stderr(&out));
    assert!(stdout(&out).is_empty());
}

#[test]
fn check_prints_statistics() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("greet.js"), GREET).expect("write");

    let out = flowguard(dir.path(), &["check", "greet.js"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("greet.js: ok (1 function"), "{}", stdout(&out));

    let out = flowguard(dir.path(), &["check", "greet.js", "--json"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json");
    assert_eq!(report["ok"], true);
    assert_eq!(report["stats"]["functions"], 1);
    assert_eq!(report["stats"]["guards_inserted"], 2);
}

#[test]
fn check_rejects_contract_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("bad.js"), "function h(): string { return 123; }\n").expect("write");

    let out = flowguard(dir.path(), &["check", "bad.js"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Invalid return type"), "{}", stderr(&out));

    let out = flowguard(dir.path(), &["check", "bad.js", "--json"]);
    assert!(!out.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json");
    assert_eq!(report["ok"], false);
    assert_eq!(report["error"]["kind"], "contract");
}

#[test]
fn run_executes_the_guarded_program() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("greet.js"), GREET).expect("write");
    let out = flowguard(dir.path(), &["run", "greet.js"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "hi ada\n");

    let bad = GREET.replace("greet(\"ada\")", "greet(42)");
    fs::write(dir.path().join("bad.js"), bad).expect("write");
    let out = flowguard(dir.path(), &["run", "bad.js"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("uncaught TypeError"), "{}", stderr(&out));
}
