use crate::config::Config;
use crate::outputter::Outputter;
use anyhow::{Context, Result};
use ci_forge::equivalence::check_equivalent;
use ci_forge::host::Host;
use ci_forge::import::{OutputMode, import_file};
use ci_forge::{CompileOptions, compile};
use clap::{ArgAction, Parser};
use serde_yaml::Value as YamlValue;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
pub struct ImportArgs {
    /// The pipeline document to import.
    #[arg(value_name = "FILE", default_value = ".gitlab-ci.yml")]
    input: PathBuf,

    /// Directory for the generated declaration files [default: the configured source directory].
    #[arg(short = 'o', long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// How to lay out the generated files.
    #[arg(long, value_enum, default_value_t = OutputMode::SingleFile)]
    mode: OutputMode,

    /// Compile the generated files and check that they reproduce the input.
    #[arg(long, action = ArgAction::SetTrue)]
    verify: bool,
}

pub fn import<H: Host>(args: &ImportArgs, outputter: &mut Outputter<'_, H>, cfg: &Config) -> Result<()> {
    let output_dir = args.output_dir.clone().unwrap_or_else(|| cfg.source_dir());

    outputter.start_activity("import");
    let written = import_file(&args.input, &output_dir, args.mode)?;
    for path in &written {
        outputter.message(format!("wrote {}", path.display()));
    }

    if args.verify {
        outputter.message("compiling the generated declarations");
        verify(&args.input, &output_dir, cfg)?;
    }

    let summary = if args.verify {
        format!("generated {} file(s), round trip verified", written.len())
    } else {
        format!("generated {} file(s)", written.len())
    };
    outputter.complete_activity(summary);
    Ok(())
}

/// Compiles the declarations in `source_dir` and compares the result with `input`.
fn verify(input: &Path, source_dir: &Path, cfg: &Config) -> Result<()> {
    let options = CompileOptions {
        source_dir: source_dir.to_path_buf(),
        modeling_crates: cfg.modeling_crates().to_vec(),
        format: cfg.format(),
    };
    let compilation = compile(&options).context("The generated declarations do not compile")?;

    let text = fs::read_to_string(input).with_context(|| format!("Unable to read {}", input.display()))?;
    let original: YamlValue = serde_yaml::from_str(&text).with_context(|| format!("Unable to parse {}", input.display()))?;

    check_equivalent(&original, &YamlValue::Mapping(compilation.document))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::RecordingHost;

    const DOCUMENT: &str = "\
stages: [build, test]
variables:
  RUST_LOG: debug
build:
  stage: build
  script: [cargo build]
test:
  stage: test
  needs: [build]
  rules:
    - if: $CI_COMMIT_BRANCH == \"main\"
      when: manual
  script: [cargo test]
";

    fn args(dir: &Path, mode: OutputMode) -> ImportArgs {
        ImportArgs {
            input: dir.join(".gitlab-ci.yml"),
            output_dir: None,
            mode,
            verify: true,
        }
    }

    #[test]
    fn imports_into_the_source_directory_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitlab-ci.yml"), DOCUMENT).unwrap();
        let cfg = Config::load(dir.path(), None).unwrap();

        let mut host = RecordingHost::default();
        import(&args(dir.path(), OutputMode::SingleFile), &mut Outputter::plain(&mut host), &cfg).unwrap();

        assert!(dir.path().join("ci").join("pipeline.rs").exists());
        assert_eq!(host.stdout.last().unwrap(), "import: generated 1 file(s), round trip verified");
    }

    #[test]
    fn per_category_layout_also_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitlab-ci.yml"), DOCUMENT).unwrap();
        let cfg = Config::load(dir.path(), None).unwrap();

        let mut host = RecordingHost::default();
        import(&args(dir.path(), OutputMode::PerCategory), &mut Outputter::plain(&mut host), &cfg).unwrap();

        for file in ["mod.rs", "pipeline.rs", "rules.rs", "jobs.rs"] {
            assert!(dir.path().join("ci").join(file).exists(), "{file}");
        }
    }
}
