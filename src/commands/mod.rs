mod build;
mod diff;
mod graph;
mod import;
mod list;
mod validate;

pub use build::{BuildArgs, build};
pub use diff::{DiffArgs, diff};
pub use graph::{GraphArgs, graph};
pub use import::{ImportArgs, import};
pub use list::{ListArgs, list};
pub use validate::{ValidateArgs, validate};

use crate::config::Config;
use ci_forge::CompileOptions;

/// How the configured project compiles.
fn compile_options(cfg: &Config) -> CompileOptions {
    CompileOptions {
        source_dir: cfg.source_dir(),
        modeling_crates: cfg.modeling_crates().to_vec(),
        format: cfg.format(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ci_forge::host::Host;
    use std::io;
    use std::process::{Command, Output};

    /// Records output; every command it is asked to run is missing.
    #[derive(Debug, Default)]
    pub struct RecordingHost {
        pub stdout: Vec<String>,
        pub stderr: Vec<String>,
        pub variables: Vec<(String, String)>,
    }

    impl Host for RecordingHost {
        fn run(&mut self, _cmd: &mut Command) -> io::Result<Output> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such program"))
        }

        fn vars(&self) -> impl Iterator<Item = (String, String)> {
            self.variables.clone().into_iter()
        }

        fn print_fmt(&mut self, args: core::fmt::Arguments<'_>) {
            self.stdout.push(format!("{args}"));
        }

        fn eprint_fmt(&mut self, args: core::fmt::Arguments<'_>) {
            self.stderr.push(format!("{args}"));
        }

        fn println_fmt(&mut self, args: core::fmt::Arguments<'_>) {
            self.stdout.push(format!("{args}"));
        }

        fn eprintln_fmt(&mut self, args: core::fmt::Arguments<'_>) {
            self.stderr.push(format!("{args}"));
        }
    }

    /// A project directory with `ci/pipeline.rs` holding `source`.
    pub fn project(source: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ci")).unwrap();
        std::fs::write(dir.path().join("ci").join("pipeline.rs"), source).unwrap();
        dir
    }

    pub const BUILD_TEST_DEPLOY: &str = r#"
use ci_forge::prelude::*;

const PIPELINE: Pipeline = Pipeline { stages: &["build", "test", "deploy"] };
const BUILD: Job = Job { name: "build", stage: "build", script: &["make"] };
const TEST: Job = Job { name: "test", stage: "test", needs: &[&BUILD], script: &["make test"] };
const DEPLOY: Job = Job {
    name: "deploy",
    stage: "deploy",
    needs: &[&TEST],
    rules: &[Rules::ON_DEFAULT_BRANCH],
    script: &["./deploy.sh"],
};
"#;
}
