use crate::outputter::Outputter;
use anyhow::{Context, Result, bail};
use ci_forge::equivalence::compare_text;
use ci_forge::host::Host;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct DiffArgs {
    /// The reference document.
    #[arg(value_name = "LEFT")]
    left: PathBuf,

    /// The document to compare against it.
    #[arg(value_name = "RIGHT")]
    right: PathBuf,
}

/// Prints every structural difference; fails if there is at least one.
pub fn diff<H: Host>(args: &DiffArgs, outputter: &mut Outputter<'_, H>) -> Result<()> {
    let read = |path: &PathBuf| fs::read_to_string(path).with_context(|| format!("Unable to read {}", path.display()));
    let differences = compare_text(&read(&args.left)?, &read(&args.right)?)?;

    if differences.is_empty() {
        let message = outputter.success("documents are equivalent").to_string();
        outputter.println(message);
        return Ok(());
    }

    for difference in &differences {
        outputter.println(difference.to_string());
    }
    bail!(
        "{} and {} differ in {} place(s)",
        args.left.display(),
        args.right.display(),
        differences.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::RecordingHost;
    use pretty_assertions::assert_eq;

    fn run(left: &str, right: &str) -> (Result<()>, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let args = DiffArgs {
            left: dir.path().join("left.yml"),
            right: dir.path().join("right.yml"),
        };
        fs::write(&args.left, left).unwrap();
        fs::write(&args.right, right).unwrap();

        let mut host = RecordingHost::default();
        let result = diff(&args, &mut Outputter::plain(&mut host));
        (result, host.stdout)
    }

    #[test]
    fn equivalent_documents_pass() {
        let (result, stdout) = run("build:\n  script: [make]\n", "{\"build\": {\"script\": [\"make\"]}}\n");
        assert!(result.is_ok());
        assert_eq!(stdout, vec!["documents are equivalent"]);
    }

    #[test]
    fn differences_are_listed_and_fail() {
        let (result, stdout) = run("build:\n  stage: build\n", "build:\n  stage: test\n");
        assert!(result.is_err());
        assert_eq!(stdout, vec!["build.stage: build != test"]);
    }
}
