//! Access to the outside world: child processes and the environment.

use std::io;
use std::process::{Command, Output};

/// Abstract the host environment to enable testing
pub trait Host {
    /// Run the given command to completion, capturing its output
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be started.
    fn run(&mut self, cmd: &mut Command) -> io::Result<Output>;

    /// Gets all environment variables as key-value pairs
    fn vars(&self) -> impl Iterator<Item = (String, String)>;

    /// Write formatted output to stdout.
    fn print_fmt(&mut self, args: core::fmt::Arguments<'_>);

    /// Write formatted output to stderr.
    fn eprint_fmt(&mut self, args: core::fmt::Arguments<'_>);

    /// Write formatted output to stdout.
    fn println_fmt(&mut self, args: core::fmt::Arguments<'_>);

    /// Write formatted output to stderr.
    fn eprintln_fmt(&mut self, args: core::fmt::Arguments<'_>);

    /// Write some text to stdout.
    fn print(&mut self, message: impl core::fmt::Display) {
        self.print_fmt(format_args!("{message}"));
    }

    /// Write a line to stdout.
    fn println(&mut self, message: impl core::fmt::Display) {
        self.println_fmt(format_args!("{message}"));
    }

    /// Write a line to stderr.
    fn eprintln(&mut self, message: impl core::fmt::Display) {
        self.eprintln_fmt(format_args!("{message}"));
    }
}

/// Default host that runs real OS commands.
#[derive(Debug, Clone, Default)]
pub struct RealHost;

impl Host for RealHost {
    fn run(&mut self, cmd: &mut Command) -> io::Result<Output> {
        cmd.output()
    }

    fn vars(&self) -> impl Iterator<Item = (String, String)> {
        std::env::vars_os().map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
    }

    #[expect(clippy::print_stdout, reason = "Real host outputs to stdout")]
    fn print_fmt(&mut self, args: core::fmt::Arguments<'_>) {
        print!("{args}");
    }

    #[expect(clippy::print_stderr, reason = "Real host outputs to stderr")]
    fn eprint_fmt(&mut self, args: core::fmt::Arguments<'_>) {
        eprint!("{args}");
    }

    #[expect(clippy::print_stdout, reason = "Real host outputs to stdout")]
    fn println_fmt(&mut self, args: core::fmt::Arguments<'_>) {
        println!("{args}");
    }

    #[expect(clippy::print_stderr, reason = "Real host outputs to stderr")]
    fn eprintln_fmt(&mut self, args: core::fmt::Arguments<'_>) {
        eprintln!("{args}");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// A mock host for testing that captures commands and output.
    #[derive(Debug, Default)]
    pub struct FakeHost {
        pub commands: Vec<String>,
        pub stdout: Vec<String>,
        pub stderr: Vec<String>,

        /// Results handed out by `run`, in order.
        pub outputs: Vec<io::Result<Output>>,

        variables: HashMap<String, String>,
    }

    impl FakeHost {
        /// Queues a completed process result with the given exit code.
        #[cfg(unix)]
        pub fn push_output(&mut self, code: i32, stdout: &str, stderr: &str) {
            use std::os::unix::process::ExitStatusExt;
            self.outputs.push(Ok(Output {
                status: std::process::ExitStatus::from_raw(code << 8),
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            }));
        }
    }

    impl Host for FakeHost {
        fn run(&mut self, cmd: &mut Command) -> io::Result<Output> {
            let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
            self.commands
                .push(format!("{} {}", cmd.get_program().to_string_lossy(), args.join(" ")));

            if self.outputs.is_empty() {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
            }
            self.outputs.remove(0)
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
}
