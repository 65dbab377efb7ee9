use crate::config::Config;
use crate::outputter::Outputter;
use anyhow::{Result, bail};
use ci_forge::host::Host;
use ci_forge::validate::{GlabValidator, ValidationOutcome, Validator};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// The document to validate [default: the configured output file].
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// The `glab` executable to run.
    #[arg(long, value_name = "PATH", default_value = "glab")]
    glab: String,
}

/// Runs `glab ci lint`. A missing `glab` is reported as a warning, not a failure.
pub fn validate<H: Host>(args: &ValidateArgs, outputter: &mut Outputter<'_, H>, cfg: &Config) -> Result<()> {
    let file = args.file.clone().unwrap_or_else(|| cfg.output());

    outputter.start_activity("validate");
    let outcome = GlabValidator::new(outputter.host()).with_program(&args.glab).validate(&file)?;

    match outcome {
        ValidationOutcome::Valid => {
            let message = outputter.success(format!("{} is valid", file.display())).to_string();
            outputter.complete_activity(message);
            Ok(())
        }
        ValidationOutcome::Invalid { messages } => {
            outputter.captured("glab ci lint", &messages);
            outputter.complete_activity("failed");
            bail!("{} is not a valid pipeline", file.display())
        }
        ValidationOutcome::Unavailable { reason } => {
            outputter.warning(format!("validation skipped: {reason}"));
            outputter.complete_activity("skipped");
            Ok(())
        }
    }
}
