//! Compile typed GitLab CI declarations to `.gitlab-ci.yml`, and back.
//!
//! `ci-forge` reads pipeline declarations written as Rust `const` items, checks that every
//! job it depends on exists and that nothing depends on itself, and writes a deterministic
//! `.gitlab-ci.yml`. It can also turn an existing `.gitlab-ci.yml` into declarations.
//!
//! # Quick Start
//!
//! Declare jobs in `ci/pipeline.rs`:
//!
//! ```rust,ignore
//! use ci_forge::prelude::*;
//!
//! const PIPELINE: Pipeline = Pipeline { stages: &["build", "test"] };
//!
//! const BUILD: Job = Job { name: "build", stage: "build", script: &["cargo build"] };
//! const TEST: Job = Job { name: "test", stage: "test", needs: &[&BUILD], script: &["cargo test"] };
//! ```
//!
//! Then:
//!
//! ```bash
//! # Write .gitlab-ci.yml
//! ci-forge build
//!
//! # Fail if .gitlab-ci.yml is stale
//! ci-forge build --check
//!
//! # Turn an existing document into declarations, and prove the round trip
//! ci-forge import .gitlab-ci.yml --verify
//!
//! # Which jobs run on a tag pipeline?
//! ci-forge list -v CI_COMMIT_TAG=v1.0
//! ```
//!
//! # Configuration
//!
//! Settings are read from `ci-forge.toml` (or `.yml`, `.yaml`, `.json`) in the project root.
//! Every key is optional:
//!
//! ```toml
//! source_dir = "ci"                # where the declarations live
//! output = ".gitlab-ci.yml"        # a `.json` name selects the JSON projection
//! format = "yaml"                  # or "json"
//! modeling_crates = ["ci_forge"]   # crates whose names declarations may import
//! manifest = "target/ci-manifest.json"
//! log_retention_count = 16
//! strict_warnings = false          # fail the build on warnings
//! ```
//!
//! # Logs
//!
//! Each run writes a log file to `logs/ci-forge/` next to the output document. The newest
//! `log_retention_count` files of each command are kept.
//!
//! # Exit Codes
//!
//! `0` on success, `1` when the input needs fixing, and `70` when `ci-forge` itself is at fault.

mod args;
mod commands;
mod config;
mod logger;
mod outputter;

use crate::args::{Cli, Commands};
use crate::config::Config;
use crate::logger::Log;
use crate::outputter::Outputter;
use anyhow::{Context, Result};
use ci_forge::host::{Host, RealHost};
use clap::Parser;
use commands::{build, diff, graph, import, list, validate};

/// Exit status for a bug in `ci-forge`, following `sysexits.h`.
const EX_SOFTWARE: i32 = 70;

fn main() {
    let cli = Cli::parse();
    let mut host = RealHost;

    if let Err(e) = inner_main(&cli, &mut host) {
        log::error!("{e:#}");
        log::logger().flush();
        host.eprintln(format!("{e:?}"));
        std::process::exit(exit_code(&e));
    }
}

fn inner_main<H: Host>(cli: &Cli, host: &mut H) -> Result<()> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Unable to determine the current directory")?,
    };

    let mut cfg = Config::load(&root, cli.config.as_deref())?;
    match &cli.command {
        Commands::Build(args) => cfg.override_with(cli.source_dir.as_deref(), args.output.as_deref(), args.format),
        _ => cfg.override_with(cli.source_dir.as_deref(), None, None),
    }

    Log::new(
        &cfg.output_dir(),
        cli.command.name(),
        cli.log_file.as_deref(),
        cfg.log_retention_count(),
        cli.log_level,
    )
    .context("Unable to create the log file")?
    .install()
    .context("Unable to install the logger")?;

    log::info!("ci-forge {} {} in {}", env!("CARGO_PKG_VERSION"), cli.command.name(), root.display());

    let mut outputter = Outputter::new(host, cli.color);
    let result = match &cli.command {
        Commands::Build(args) => build(args, &mut outputter, &cfg),
        Commands::Import(args) => import(args, &mut outputter, &cfg),
        Commands::Diff(args) => diff(args, &mut outputter),
        Commands::List(args) => list(args, &mut outputter, &cfg),
        Commands::Graph(args) => graph(args, &mut outputter, &cfg),
        Commands::Validate(args) => validate(args, &mut outputter, &cfg),
    };

    log::logger().flush();
    result
}

/// `1` for problems in the input, `70` for violated internal invariants.
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ci_forge::Error>() {
        Some(e) if !e.is_input_problem() => EX_SOFTWARE,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn exit_codes_separate_input_problems_from_bugs() {
        let input = anyhow::Error::from(ci_forge::Error::Cycle {
            cycle: vec!["a".into(), "a".into()],
        });
        assert_eq!(exit_code(&input), 1);

        let bug = anyhow::Error::from(ci_forge::Error::Internal { message: "boom".into() }).context("Building the pipeline");
        assert_eq!(exit_code(&bug), EX_SOFTWARE);

        assert_eq!(exit_code(&anyhow!("no such file")), 1);
    }
}
