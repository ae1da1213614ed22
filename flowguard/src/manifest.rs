#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

pub const MANIFEST_NAME: &str = "Flowguard.toml";

const DEFAULT_OUT_DIR: &str = "dist";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(flowguard::manifest))]
pub struct ManifestError {
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedManifest {
    pub manifest_path: PathBuf,
    pub project_root: PathBuf,
    pub name: Option<String>,

    /// Sources to build, resolved against `project_root`.
    pub sources: Vec<PathBuf>,

    pub out_dir: PathBuf,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Manifest {
    #[serde(default)]
    project: Option<Project>,

    #[serde(default)]
    build: Option<Build>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Project {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Build {
    #[serde(default)]
    sources: Vec<String>,

    #[serde(default)]
    out_dir: Option<String>,
}

impl ResolvedManifest {
    /// Where the emitted code for `source` goes: its path relative to the
    /// project root, mirrored under `out_dir`.
    pub fn output_for(&self, source: &Path) -> PathBuf {
        let relative = source
            .strip_prefix(&self.project_root)
            .map(Path::to_path_buf)
            .ok()
            .or_else(|| source.file_name().map(PathBuf::from))
            .unwrap_or_else(|| source.to_path_buf());
        self.out_dir.join(relative)
    }
}

pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(MANIFEST_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        match cur.parent().map(|p| p.to_path_buf()) {
            Some(p) => cur = p,
            None => return None,
        }
    }
}

pub fn load_manifest(manifest_path: &Path) -> Result<ResolvedManifest, ManifestError> {
    let project_root = manifest_path
        .parent()
        .ok_or_else(|| ManifestError {
            message: "manifest has no parent directory".to_string(),
        })?
        .to_path_buf();

    let raw = fs::read_to_string(manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;

    let parsed: Manifest = toml::from_str(&raw).map_err(|e| ManifestError {
        message: format!("failed to parse {}: {e}", manifest_path.display()),
    })?;

    let build = parsed.build.unwrap_or_default();
    if build.sources.is_empty() {
        return Err(ManifestError {
            message: format!("{} lists no [build] sources", manifest_path.display()),
        });
    }

    let sources = build
        .sources
        .iter()
        .map(|s| resolve_path(&project_root, s))
        .collect();
    let out_dir = resolve_path(
        &project_root,
        build.out_dir.as_deref().unwrap_or(DEFAULT_OUT_DIR),
    );

    Ok(ResolvedManifest {
        manifest_path: manifest_path.to_path_buf(),
        name: parsed.project.and_then(|p| p.name),
        sources: dedup_paths(sources),
        out_dir,
        project_root,
    })
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    if pb.is_absolute() { pb } else { base.join(pb) }
}

fn dedup_paths(v: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    v.into_iter()
        .filter(|p| seen.insert(p.canonicalize().unwrap_or_else(|_| p.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, text).expect("write");
        path
    }

    #[test]
    fn sources_resolve_against_the_manifest_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            MANIFEST_NAME,
            "[project]\nname = \"demo\"\n\n[build]\nsources = [\"src/app.js\", \"src/app.js\"]\n",
        );
        let m = load_manifest(&path).expect("manifest");
        assert_eq!(m.name.as_deref(), Some("demo"));
        assert_eq!(m.sources, vec![dir.path().join("src/app.js")]);
        assert_eq!(m.out_dir, dir.path().join("dist"));
        assert_eq!(
            m.output_for(&m.sources[0]),
            dir.path().join("dist").join("src/app.js")
        );
    }

    #[test]
    fn manifest_is_found_from_nested_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), MANIFEST_NAME, "[build]\nsources = [\"a.js\"]\nout_dir = \"out\"\n");
        let nested = dir.path().join("src/deep");
        fs::create_dir_all(&nested).expect("mkdir");
        assert_eq!(find_manifest(&nested), Some(path.clone()));
        let m = load_manifest(&path).expect("manifest");
        assert_eq!(m.out_dir, dir.path().join("out"));
    }

    #[test]
    fn bad_manifests_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), MANIFEST_NAME, "[build\n");
        let err = load_manifest(&path).unwrap_err();
        assert!(err.message.contains("failed to parse"), "{}", err.message);

        let path = write(dir.path(), MANIFEST_NAME, "[project]\nname = \"x\"\n");
        let err = load_manifest(&path).unwrap_err();
        assert!(err.message.contains("no [build] sources"), "{}", err.message);
    }
}
