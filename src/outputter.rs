use ci_forge::host::Host;
use clap::ValueEnum;
use console::{StyledObject, Term, style};

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorModes {
    #[default]
    Auto,
    Always,
    Never,
}

/// Progress and findings for the person at the terminal.
///
/// Everything shown is also sent to the log file. On a terminal, progress messages
/// overwrite each other on one line; otherwise each becomes a line on stdout.
pub struct Outputter<'a, H> {
    host: &'a mut H,
    term: Term,
    interactive: bool,
    activity: String,
    color: ColorModes,
}

impl<'a, H: Host> Outputter<'a, H> {
    pub fn new(host: &'a mut H, color: ColorModes) -> Self {
        let term = Term::stdout();
        let interactive = term.is_term();
        Self {
            host,
            term,
            interactive,
            activity: String::new(),
            color,
        }
    }

    /// An outputter that always writes through the host.
    #[cfg(test)]
    pub fn plain(host: &'a mut H) -> Self {
        Self {
            host,
            term: Term::stdout(),
            interactive: false,
            activity: String::new(),
            color: ColorModes::Never,
        }
    }

    pub fn start_activity(&mut self, activity: impl AsRef<str>) {
        self.activity = activity.as_ref().into();
        log::info!("{}: started", self.activity);

        if self.interactive {
            _ = self.term.hide_cursor();
        }
    }

    pub fn complete_activity(&mut self, final_message: impl AsRef<str>) {
        let line = format!("{}: {}", self.activity, final_message.as_ref());
        log::info!("{line}");

        if self.interactive {
            _ = self.term.clear_line();
            _ = self.term.write_line(&line);
        } else {
            self.host.println(&line);
        }
        self.activity.clear();
    }

    pub fn message(&mut self, message: impl AsRef<str>) {
        let formatted = format!("{}: {}", self.activity, message.as_ref());
        log::info!("{formatted}");

        if self.interactive {
            _ = self.term.clear_line();
            _ = self.term.write_str(&formatted);
        } else {
            self.host.println(&formatted);
        }
    }

    pub fn warning(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::warn!("{message}");

        self.end_progress_line();
        let styled = self.yellow(message);
        self.host.eprintln(styled);
    }

    /// Shows lines reported by another tool, framed so they stand apart from our own output.
    pub fn captured(&mut self, title: &str, lines: &[String]) {
        self.end_progress_line();

        self.host.eprintln(format!("--- {title}"));
        log::warn!("--- {title}");
        for line in lines {
            let styled = if self.should_use_color() { style(line).italic() } else { style(line) };
            self.host.eprintln(styled);
            log::warn!("{line}");
        }
        self.host.eprintln("--- end");
    }

    /// Writes a result line, such as a rendered document, to stdout.
    pub fn println(&mut self, line: impl AsRef<str>) {
        self.end_progress_line();
        self.host.println(line.as_ref());
    }

    /// The host, for work that needs it directly such as running a tool.
    pub const fn host(&mut self) -> &mut H {
        self.host
    }

    pub fn success<D>(&self, data: D) -> StyledObject<D> {
        if self.should_use_color() { style(data).green() } else { style(data) }
    }

    fn end_progress_line(&self) {
        if self.interactive {
            _ = self.term.clear_line();
        }
    }

    fn should_use_color(&self) -> bool {
        match self.color {
            ColorModes::Always => true,
            ColorModes::Never => false,
            ColorModes::Auto => self.interactive,
        }
    }

    fn yellow<D>(&self, data: D) -> StyledObject<D> {
        if self.should_use_color() {
            style(data).yellow()
        } else {
            style(data)
        }
    }
}

impl<H> Drop for Outputter<'_, H> {
    fn drop(&mut self) {
        if self.interactive {
            _ = self.term.show_cursor();
        }
    }
}
