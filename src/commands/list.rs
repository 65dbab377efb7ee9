use crate::commands::compile_options;
use crate::config::Config;
use crate::outputter::Outputter;
use anyhow::Result;
use ci_forge::compile;
use ci_forge::expression::{Disposition, evaluate_rules};
use ci_forge::host::Host;
use clap::{ArgAction, Parser};
use core::error::Error;
use core::str::FromStr;
use std::collections::HashMap;

#[derive(Parser, Debug, Default, Clone)]
pub struct ListArgs {
    /// Define a variable for evaluating rules.
    #[arg(short = 'v', long, value_parser = parse_key_val::<String, String>, value_name = "VAR=VALUE")]
    variable: Vec<(String, String)>,

    /// Also evaluate rules against this process's environment variables.
    #[arg(long, action = ArgAction::SetTrue)]
    env: bool,

    /// Include hidden template jobs.
    #[arg(short = 'a', long, action = ArgAction::SetTrue)]
    all: bool,
}

/// Parse a single key-value pair
#[expect(clippy::string_slice, reason = "Necessary for parsing KEY=VALUE")]
fn parse_key_val<T, U>(s: &str) -> Result<(T, U), Box<dyn Error + Send + Sync + 'static>>
where
    T: FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s.find('=').ok_or_else(|| format!("invalid KEY=value: no '=' found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

/// Prints each job in emission order with its stage and what its rules decide.
pub fn list<H: Host>(args: &ListArgs, outputter: &mut Outputter<'_, H>, cfg: &Config) -> Result<()> {
    let compilation = compile(&compile_options(cfg))?;

    let mut variables: HashMap<String, String> = HashMap::new();
    if args.env {
        variables.extend(outputter.host().vars());
    }
    variables.extend(args.variable.iter().cloned());

    let jobs: Vec<_> = compilation.jobs.iter().filter(|job| args.all || !job.is_hidden()).collect();
    if jobs.is_empty() {
        outputter.println("No jobs are declared.");
        return Ok(());
    }

    let width = jobs.iter().map(|job| job.name.len()).max().unwrap_or_default();
    for job in jobs {
        let disposition = if job.is_hidden() {
            "template".to_string()
        } else {
            match evaluate_rules(job, &variables)? {
                Disposition::Run(when) => when.to_string(),
                Disposition::Skip => "skipped".to_string(),
            }
        };
        outputter.println(format!("{:width$}  {:10}  {disposition}", job.name, job.effective_stage()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{BUILD_TEST_DEPLOY, RecordingHost, project};
    use pretty_assertions::assert_eq;

    fn run(args: &ListArgs, host: &mut RecordingHost) -> Vec<String> {
        let dir = project(BUILD_TEST_DEPLOY);
        let cfg = Config::load(dir.path(), None).unwrap();
        list(args, &mut Outputter::plain(host), &cfg).unwrap();
        host.stdout.iter().map(|line| line.trim_end().to_string()).collect()
    }

    #[test]
    fn rules_decide_with_given_variables() {
        let args = ListArgs {
            variable: vec![("CI_COMMIT_BRANCH".into(), "feature".into()), ("CI_DEFAULT_BRANCH".into(), "main".into())],
            ..ListArgs::default()
        };

        assert_eq!(
            run(&args, &mut RecordingHost::default()),
            vec![
                "build   build       on_success",
                "test    test        on_success",
                "deploy  deploy      skipped"
            ]
        );
    }

    #[test]
    fn environment_is_opt_in() {
        let mut host = RecordingHost {
            variables: vec![("CI_COMMIT_BRANCH".into(), "main".into()), ("CI_DEFAULT_BRANCH".into(), "main".into())],
            ..RecordingHost::default()
        };
        let args = ListArgs {
            env: true,
            ..ListArgs::default()
        };

        let lines = run(&args, &mut host);
        assert_eq!(lines[2], "deploy  deploy      on_success");
    }

    #[test]
    fn key_value_parsing() {
        assert_eq!(parse_key_val::<String, String>("A=b=c").unwrap(), ("A".to_string(), "b=c".to_string()));
        assert!(parse_key_val::<String, String>("A").is_err());
    }
}
