use crate::commands::{BuildArgs, DiffArgs, GraphArgs, ImportArgs, ListArgs, ValidateArgs};
use crate::outputter::ColorModes;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

/// The app's command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "ci-forge", version, about = "Compile typed GitLab CI declarations to .gitlab-ci.yml, and back")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root [default: the current directory].
    #[arg(long, short = 'C', value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Path to configuration file [default: one of ci-forge.[toml|yml|yaml|json] in the project root].
    #[arg(long, short = 'c', value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the declaration files [default: `ci`].
    #[arg(long, value_name = "DIR", global = true)]
    pub source_dir: Option<PathBuf>,

    /// Send log output to the specified file.
    #[arg(short = 'l', long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Most detailed level of log records to keep.
    #[arg(long, value_name = "LEVEL", default_value_t = LevelFilter::Debug, global = true)]
    pub log_level: LevelFilter,

    /// Colorize output.
    #[arg(long, value_name = "WHEN", default_value_t = ColorModes::Auto, value_enum, global = true)]
    pub color: ColorModes,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compiles the declarations into a pipeline document.
    Build(BuildArgs),

    /// Generates declaration source from an existing pipeline document.
    Import(ImportArgs),

    /// Compares two pipeline documents structurally.
    Diff(DiffArgs),

    /// Lists the declared jobs and whether their rules let them run.
    List(ListArgs),

    /// Shows the dependencies between jobs.
    Graph(GraphArgs),

    /// Checks a pipeline document with `glab ci lint`.
    Validate(ValidateArgs),
}

impl Commands {
    /// Prefix of this command's log files.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Import(_) => "import",
            Self::Diff(_) => "diff",
            Self::List(_) => "list",
            Self::Graph(_) => "graph",
            Self::Validate(_) => "validate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["ci-forge", "build", "--source-dir", "pipeline", "--color", "never", "-o", "out.yml"]).unwrap();
        assert_eq!(cli.source_dir, Some(PathBuf::from("pipeline")));
        assert_eq!(cli.color, ColorModes::Never);
        assert_eq!(cli.command.name(), "build");
        assert_eq!(cli.log_level, LevelFilter::Debug);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["ci-forge"]).is_err());
    }

    #[test]
    fn definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
