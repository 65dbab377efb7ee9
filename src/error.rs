//! Errors, and the diagnostics that are reported without failing a build.

use core::fmt::{self, Display};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Result type used throughout the compiler.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A position in a declaration source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// File path, relative to the source root where possible.
    pub file: PathBuf,

    /// One-based line number.
    pub line: usize,
}

impl Location {
    /// A location at `line` of `file`.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self { file: file.into(), line }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Everything that can go wrong while compiling, importing or comparing pipelines.
///
/// Source-level errors carry a file and line, model-level errors carry a job and field.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A declaration file is not valid Rust syntax.
    #[error("{}:{line}: {message}", .file.display())]
    Parse {
        /// The file, relative to the source root.
        file: PathBuf,

        /// One-based line of the syntax error.
        line: usize,

        /// The parser's description of the problem.
        message: String,
    },

    /// A file or directory could not be read or written.
    #[error("unable to access '{}'", .path.display())]
    Io {
        /// The path that was being read or written.
        path: PathBuf,

        /// The underlying failure.
        #[source]
        source: Arc<io::Error>,
    },

    /// The evaluated value of a declaration disagrees with what the scanner found.
    #[error("{}:{line}: unable to resolve '{binding}': {message}", .file.display())]
    Resolution {
        /// The file holding the declaration.
        file: PathBuf,

        /// One-based line of the offending expression.
        line: usize,

        /// The declaration's binding, such as `BUILD` or `MATRIX[1]`.
        binding: String,

        /// What went wrong.
        message: String,
    },

    /// A job depends on a job that does not exist.
    #[error("job '{job}' depends on '{missing}', but there is no '{missing}' job")]
    UnknownReference {
        /// The job holding the reference.
        job: String,

        /// The name that matches no job.
        missing: String,
    },

    /// Jobs depend on each other in a loop.
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    Cycle {
        /// Job names along the loop; the first and last are the same job.
        cycle: Vec<String>,
    },

    /// Two declarations claim the same job name.
    #[error("job name '{name}' is declared at {first} and again at {second}")]
    DuplicateName {
        /// The contested job name.
        name: String,

        /// Where the name was declared first.
        first: Location,

        /// Where it was declared again.
        second: Location,
    },

    /// A job names a stage that the pipeline does not declare.
    #[error("job '{job}' uses stage '{stage}', which is not in the pipeline's stage list")]
    UnknownStage {
        /// The job using the stage.
        job: String,

        /// The undeclared stage.
        stage: String,
    },

    /// A wire document does not have the shape the importer needs.
    #[error("{path}: {message}")]
    Schema {
        /// Location in the document, such as `build.needs[0]`.
        path: String,

        /// What the importer expected instead.
        message: String,
    },

    /// Two documents that were expected to be equivalent are not.
    #[error("documents are not equivalent:\n{}", .differences.join("\n"))]
    EquivalenceMismatch {
        /// One line per difference.
        differences: Vec<String>,
    },

    /// A job field holds a value that has no wire representation.
    #[error("job '{job}', field '{field}': {message}")]
    Serialize {
        /// The job, or `<pipeline>` for global sections.
        job: String,

        /// The field, by its wire key.
        field: String,

        /// Why the value cannot be written.
        message: String,
    },

    /// A rule condition is not a valid `if:` expression.
    #[error("invalid rule condition '{expression}': {message}")]
    Expression {
        /// The condition as written.
        expression: String,

        /// Why it could not be parsed or evaluated.
        message: String,
    },

    /// Several independent errors, reported together.
    #[error("{} errors:\n{}", .errors.len(), join_errors(.errors))]
    Many {
        /// The individual errors, in the order they were found.
        errors: Vec<Self>,
    },

    /// An invariant of the compiler itself was violated.
    #[error("internal error: {message}")]
    Internal {
        /// What was violated.
        message: String,
    },
}

fn join_errors(errors: &[Error]) -> String {
    errors.iter().map(|e| format!("  {e}")).collect::<Vec<_>>().join("\n")
}

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns `true` when the error can be fixed by editing the input, and `false`
    /// when it indicates a bug in the compiler.
    #[must_use]
    pub fn is_input_problem(&self) -> bool {
        match self {
            Self::Internal { .. } => false,
            Self::Many { errors } => errors.iter().all(Self::is_input_problem),
            _ => true,
        }
    }

    /// Turns a list of accumulated errors into a single result.
    pub fn collect(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Many { errors }),
        }
    }

    /// Flattens nested [`Error::Many`] values into a list of individual errors.
    #[must_use]
    pub fn into_list(self) -> Vec<Self> {
        match self {
            Self::Many { errors } => errors.into_iter().flat_map(Self::into_list).collect(),
            other => vec![other],
        }
    }
}

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The build succeeds, but the result may not be what was meant.
    Warning,
}

/// A non-fatal finding reported alongside a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// How serious the finding is.
    pub severity: Severity,

    /// The job the finding is about.
    pub job: String,

    /// The job's declaration.
    pub location: Location,

    /// The finding, in a sentence.
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "warning",
        };
        write!(f, "{label}: {}: job '{}': {}", self.location, self.job, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_not_input_problems() {
        assert!(!Error::internal("boom").is_input_problem());
        assert!(
            Error::Cycle {
                cycle: vec!["a".into(), "a".into()]
            }
            .is_input_problem()
        );

        let many = Error::Many {
            errors: vec![
                Error::UnknownReference {
                    job: "a".into(),
                    missing: "b".into(),
                },
                Error::internal("boom"),
            ],
        };
        assert!(!many.is_input_problem());
    }

    #[test]
    fn collect_unwraps_single_errors() {
        assert!(Error::collect(Vec::new()).is_ok());

        let single = Error::collect(vec![Error::internal("x")]).unwrap_err();
        assert!(matches!(single, Error::Internal { .. }));

        let many = Error::collect(vec![Error::internal("x"), Error::internal("y")]).unwrap_err();
        assert_eq!(many.into_list().len(), 2);
    }

    #[test]
    fn cycle_message_lists_the_path() {
        let e = Error::Cycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(e.to_string(), "circular dependency detected: a -> b -> a");
    }
}
