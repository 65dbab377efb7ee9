//! Validation of rendered documents by an external linter.

use crate::error::{Error, Result};
use crate::host::Host;
use std::io;
use std::path::Path;
use std::process::Command;

/// What the external linter had to say about a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The linter accepted the document.
    Valid,

    /// The linter rejected the document.
    Invalid {
        /// The linter's output, one line per entry.
        messages: Vec<String>,
    },

    /// The linter could not be run, for example because it is not installed.
    Unavailable {
        /// Why it could not be run.
        reason: String,
    },
}

/// Checks a rendered document with a tool outside the compiler.
pub trait Validator {
    /// Validates the document stored at `document`.
    ///
    /// # Errors
    ///
    /// Fails only on unexpected I/O problems; a missing tool is [`ValidationOutcome::Unavailable`].
    fn validate(&mut self, document: &Path) -> Result<ValidationOutcome>;
}

/// Runs `glab ci lint <file>`.
#[derive(Debug)]
pub struct GlabValidator<'a, H: Host> {
    host: &'a mut H,
    program: String,
}

impl<'a, H: Host> GlabValidator<'a, H> {
    /// A validator that runs `glab` through `host`.
    pub fn new(host: &'a mut H) -> Self {
        Self {
            host,
            program: "glab".into(),
        }
    }

    /// Uses a different `glab` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl<H: Host> Validator for GlabValidator<'_, H> {
    fn validate(&mut self, document: &Path) -> Result<ValidationOutcome> {
        let mut cmd = Command::new(&self.program);
        _ = cmd.arg("ci").arg("lint").arg(document);

        log::debug!("running {} ci lint {}", self.program, document.display());
        let output = match self.host.run(&mut cmd) {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(ValidationOutcome::Unavailable {
                    reason: format!("'{}' is not installed or not on PATH", self.program),
                });
            }
            Err(e) => return Err(Error::io(&self.program, e)),
        };

        if output.status.success() {
            return Ok(ValidationOutcome::Valid);
        }

        let messages = String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        Ok(ValidationOutcome::Invalid { messages })
    }
}
