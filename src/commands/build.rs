use crate::commands::compile_options;
use crate::config::Config;
use crate::outputter::Outputter;
use anyhow::{Result, bail};
use ci_forge::host::Host;
use ci_forge::manifest::Manifest;
use ci_forge::{Format, compile};
use clap::{ArgAction, Parser};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug, Default, Clone)]
pub struct BuildArgs {
    /// Where to write the document [default: `.gitlab-ci.yml`].
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format [default: implied by the output file name].
    #[arg(long, value_enum)]
    pub format: Option<Format>,

    /// Also write a JSON build manifest to this file.
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Fail when the build reports warnings.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Check that the output file is up to date instead of writing it.
    #[arg(long, action = ArgAction::SetTrue)]
    check: bool,
}

pub fn build<H: Host>(args: &BuildArgs, outputter: &mut Outputter<'_, H>, cfg: &Config) -> Result<()> {
    let options = compile_options(cfg);
    let output = cfg.output();

    outputter.start_activity("build");
    outputter.message(format!("compiling declarations in {}", options.source_dir.display()));

    let compilation = compile(&options)?;

    for diagnostic in &compilation.diagnostics {
        outputter.warning(diagnostic.to_string());
    }
    if (args.strict || cfg.strict_warnings()) && !compilation.diagnostics.is_empty() {
        outputter.complete_activity("failed");
        bail!("{} warning(s) reported and warnings are treated as errors", compilation.diagnostics.len());
    }

    if args.check {
        let current = fs::read_to_string(&output).unwrap_or_default();
        if current != compilation.text {
            outputter.complete_activity("out of date");
            bail!("{} is out of date, run `ci-forge build` to regenerate it", output.display());
        }
        outputter.complete_activity(format!("{} is up to date", output.display()));
        return Ok(());
    }

    compilation.write(&output)?;

    if let Some(path) = args.manifest.clone().or_else(|| cfg.manifest()) {
        Manifest::new(&compilation, &options.source_dir, &output)?.write(&path)?;
        outputter.message(format!("wrote manifest to {}", path.display()));
    }

    let summary = format!("wrote {} job(s) to {}", compilation.order.len(), output.display());
    let summary = outputter.success(summary).to_string();
    outputter.complete_activity(summary);
    Ok(())
}
