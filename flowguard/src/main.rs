#![forbid(unsafe_code)]

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, NamedSource};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowguard_ast::Program;
use flowguard_core::TransformOutput;
use flowguard_interpret::{Interpreter, Value};

mod manifest;
mod report;

#[derive(Parser, Debug)]
#[command(
    name = "flowguard",
    version,
    about = "Compiles type annotations into runtime contract guards"
)]
struct Cli {
    /// Log every transform decision (overrides `FLOWGUARD_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Transform annotated sources and emit plain JavaScript
    Build {
        /// Input file. Without one, every source listed in `Flowguard.toml` is built.
        path: Option<PathBuf>,

        /// Output file (single input) or directory (manifest build)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Path to `Flowguard.toml` (default: searched upwards from the current directory)
        #[arg(long, conflicts_with = "path")]
        manifest: Option<PathBuf>,
    },

    /// Transform without emitting; report contract errors and statistics
    Check {
        path: PathBuf,

        /// Print a machine-readable report (JSON)
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Transform and execute with the built-in evaluator
    Run { path: PathBuf },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("FLOWGUARD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Cmd::Build {
            path: Some(path),
            out,
            ..
        } => build_file(&path, out.as_deref()),
        Cmd::Build {
            path: None,
            out,
            manifest,
        } => build_project(manifest, out),
        Cmd::Check { path, json } => check(&path, json),
        Cmd::Run { path } => run(&path),
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

struct Unit {
    source: NamedSource<String>,
    program: Program,
}

fn parse_file(path: &Path) -> miette::Result<Unit> {
    let src = fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))?;
    let source = NamedSource::new(display_path(path), src.clone());
    let program =
        flowguard_parse::parse_source(&src).map_err(|e| e.with_source_code(source.clone()))?;
    Ok(Unit { source, program })
}

fn transform(unit: &Unit) -> miette::Result<TransformOutput> {
    flowguard_core::transform_program(&unit.program)
        .map_err(|e| miette::Report::new(e).with_source_code(unit.source.clone()))
}

fn compile_file(path: &Path) -> miette::Result<(Unit, TransformOutput)> {
    let unit = parse_file(path)?;
    let out = transform(&unit)?;
    debug!(
        file = %path.display(),
        functions = out.stats.functions,
        guards = out.stats.guards_inserted,
        verified = out.stats.statically_verified,
        "transformed"
    );
    Ok((unit, out))
}

fn write_output(dest: &Path, js: &str) -> miette::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    fs::write(dest, js).into_diagnostic()?;
    info!(out = %dest.display(), "wrote");
    Ok(())
}

fn build_file(path: &Path, out: Option<&Path>) -> miette::Result<()> {
    let (_, output) = compile_file(path)?;
    let js = flowguard_parse::emit_program(&output.program);
    match out {
        Some(dest) => write_output(dest, &js),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(js.as_bytes()).into_diagnostic()?;
            stdout.flush().into_diagnostic()
        }
    }
}

fn build_project(manifest: Option<PathBuf>, out: Option<PathBuf>) -> miette::Result<()> {
    let manifest_path = match manifest {
        Some(p) => p,
        None => {
            let cwd = std::env::current_dir().into_diagnostic()?;
            manifest::find_manifest(&cwd).ok_or_else(|| manifest::ManifestError {
                message: format!(
                    "no input file given and no {} found in {} or its parents",
                    manifest::MANIFEST_NAME,
                    cwd.display()
                ),
            })?
        }
    };
    let mut resolved = manifest::load_manifest(&manifest_path)?;
    if let Some(out) = out {
        resolved.out_dir = out;
    }
    info!(
        project = resolved.name.as_deref().unwrap_or("<unnamed>"),
        sources = resolved.sources.len(),
        "building"
    );

    for source in &resolved.sources {
        let (_, output) = compile_file(source)?;
        let js = flowguard_parse::emit_program(&output.program);
        write_output(&resolved.output_for(source), &js)?;
    }
    Ok(())
}

fn check(path: &Path, json: bool) -> miette::Result<()> {
    let input = display_path(path);
    if !json {
        let (_, output) = compile_file(path)?;
        println!("{}", report::summary(&input, &output.stats));
        return Ok(());
    }

    let unit = match parse_file(path) {
        Ok(unit) => unit,
        Err(e) => {
            println!("{}", report::CheckReport::parse_failure(&input, &e).to_json()?);
            return Err(e);
        }
    };
    match flowguard_core::transform_program(&unit.program) {
        Ok(output) => {
            println!(
                "{}",
                report::CheckReport::success(&input, &output.stats).to_json()?
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                report::CheckReport::transform_failure(&input, &e).to_json()?
            );
            Err(miette::Report::new(e).with_source_code(unit.source))
        }
    }
}

fn run(path: &Path) -> miette::Result<()> {
    let (unit, output) = compile_file(path)?;
    let mut interp = Interpreter::new();
    let result = interp.exec_program(&output.program);

    let stdout = match &result {
        Ok(outcome) => outcome.stdout.as_str(),
        Err(_) => interp.stdout(),
    };
    let mut w = io::stdout().lock();
    w.write_all(stdout.as_bytes()).into_diagnostic()?;

    let outcome = result.map_err(|e| miette::Report::new(e).with_source_code(unit.source))?;
    if !matches!(outcome.value, Value::Undefined) {
        writeln!(w, "{:?}", outcome.value).into_diagnostic()?;
    }
    w.flush().into_diagnostic()
}
