//! The build manifest: what a build read and what it found.

use crate::compile::Compilation;
use crate::error::{Error, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Version of the manifest layout.
pub const MANIFEST_VERSION: u32 = 1;

/// A declaration file that fed the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Path relative to the source directory.
    pub path: PathBuf,
    /// Hex SHA-256 of the file contents.
    pub sha256: String,
}

/// A job declaration found in the sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredJob {
    /// The job name.
    pub name: String,
    /// The `const` or `static` it is bound to.
    pub binding: String,
    /// The declaring file.
    pub file: PathBuf,
    /// The 1-based line of the declaration.
    pub line: usize,
    /// The declared stage, if any.
    pub stage: Option<String>,
}

/// A JSON record of one build, for tooling that wants to know which sources
/// produced a document.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    /// Always [`MANIFEST_VERSION`].
    pub version: u32,
    /// RFC 3339 UTC timestamp.
    pub generated_at: String,
    /// The document that was written.
    pub output_file: PathBuf,
    /// Every declaration file, in scan order.
    pub source_files: Vec<SourceFile>,
    /// Every job, in pipeline order.
    pub discovered_jobs: Vec<DiscoveredJob>,
    /// The jobs each job depends on.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    /// Describes a finished build. Source files are hashed from `source_dir`.
    ///
    /// # Errors
    ///
    /// Fails if a source file can no longer be read.
    pub fn new(compilation: &Compilation, source_dir: &Path, output_file: &Path) -> Result<Self> {
        let source_files = compilation
            .files
            .iter()
            .map(|file| {
                let full = source_dir.join(file);
                let bytes = fs::read(&full).map_err(|e| Error::io(&full, e))?;
                Ok(SourceFile {
                    path: file.clone(),
                    sha256: sha256_hex(&bytes),
                })
            })
            .collect::<Result<_>>()?;

        let discovered_jobs = compilation
            .order
            .iter()
            .filter_map(|name| {
                let declaration = compilation.job_declarations.get(name)?;
                Some(DiscoveredJob {
                    name: name.clone(),
                    binding: declaration.binding.clone(),
                    file: declaration.file.clone(),
                    line: declaration.line,
                    stage: declaration.stage.clone(),
                })
            })
            .collect();

        Ok(Self {
            version: MANIFEST_VERSION,
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            output_file: output_file.to_path_buf(),
            source_files,
            discovered_jobs,
            dependencies: compilation.dependencies.clone(),
        })
    }

    /// Writes the manifest as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut text = serde_json::to_string_pretty(self).map_err(|e| Error::internal(format!("unable to encode manifest: {e}")))?;
        text.push('\n');
        fs::write(path, text).map_err(|e| Error::io(path, e))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{CompileOptions, compile};
    use pretty_assertions::assert_eq;

    #[test]
    fn hashes_are_lowercase_hex() {
        assert_eq!(sha256_hex(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn describes_a_build() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("jobs.rs"),
            r#"
use ci_forge::prelude::*;
const BUILD: Job = Job { name: "build", stage: "build", script: &["make"] };
const TEST: Job = Job { name: "test", needs: &[&BUILD], script: &["make test"] };
"#,
        )
        .unwrap();

        let compilation = compile(&CompileOptions::new(dir.path())).unwrap();
        let manifest = Manifest::new(&compilation, dir.path(), Path::new(".gitlab-ci.yml")).unwrap();

        assert_eq!(manifest.source_files.len(), 1);
        assert_eq!(manifest.source_files[0].sha256.len(), 64);
        assert_eq!(manifest.discovered_jobs.len(), 2);
        assert_eq!(manifest.discovered_jobs[0].binding, "BUILD");
        assert_eq!(manifest.discovered_jobs[0].stage.as_deref(), Some("build"));
        assert_eq!(manifest.dependencies["test"], vec!["build"]);

        let path = dir.path().join("manifest.json");
        manifest.write(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["version"], 1);
        assert_eq!(parsed["discovered_jobs"][1]["name"], "test");
    }
}
