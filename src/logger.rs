use chrono::Local;
use log::{LevelFilter, Metadata, Record};
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Writes log records to a timestamped file under `<dir>/logs/ci-forge/`.
#[derive(Debug)]
pub struct Log {
    file: Mutex<BufWriter<File>>,
    level: LevelFilter,
}

impl Log {
    pub fn new(output_dir: &Path, log_prefix: &str, log_file: Option<&Path>, log_retention_count: usize, level: LevelFilter) -> io::Result<Self> {
        let log_path = if let Some(path) = log_file {
            path.to_path_buf()
        } else {
            let log_dir = output_dir.join("logs").join("ci-forge");
            fs::create_dir_all(&log_dir)?;

            prune_old_logs(&log_dir, log_prefix, log_retention_count.saturating_sub(1));

            let timestamp = Local::now().format("%Y-%m-%dT%H-%M-%S%.3f");
            log_dir.join(format!("{log_prefix}-{timestamp}.log"))
        };

        let file = OpenOptions::new().create(true).append(true).open(log_path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            level,
        })
    }

    /// Routes the `log` macros of this process to the file.
    ///
    /// # Errors
    ///
    /// Fails if another logger is already installed.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    fn write(&self, record: &Record<'_>) -> io::Result<()> {
        let mut file = self.file.lock().map_err(|_poisoned| io::Error::other("log file lock poisoned"))?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{timestamp}] [{}] [{}] {}", record.level(), record.target(), record.args())
    }
}

impl log::Log for Log {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    #[expect(clippy::print_stderr, reason = "The log file itself is unavailable")]
    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Err(e) = self.write(record) {
            eprintln!("Failed to write to log file: {e}");
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            _ = file.flush();
        }
    }
}

/// Keeps only the N most recent log files with the given prefix.
fn prune_old_logs(log_dir: &Path, log_prefix: &str, keep: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            if !path.is_file() || path.extension() != Some(OsStr::new("log")) {
                return None;
            }

            let file_name = path.file_name()?.to_str()?;
            if !file_name.starts_with(&format!("{log_prefix}-")) {
                return None;
            }

            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, path))
        })
        .collect();

    // newest first
    logs.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    for (_, path) in logs.iter().skip(keep) {
        _ = fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn pruning_keeps_the_newest_files_of_a_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["build-1.log", "build-2.log", "build-3.log", "import-1.log", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        prune_old_logs(dir.path(), "build", 1);

        let remaining = log_files(dir.path());
        assert_eq!(remaining.iter().filter(|n| n.starts_with("build-")).count(), 1);
        assert!(remaining.contains(&"import-1.log".to_string()));
        assert!(remaining.contains(&"notes.txt".to_string()));
    }

    #[test]
    fn records_land_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explicit.log");
        let log = Log::new(dir.path(), "build", Some(&path), 4, LevelFilter::Info).unwrap();

        log::Log::log(
            &log,
            &Record::builder()
                .level(log::Level::Info)
                .target("ci_forge::compile")
                .args(format_args!("wrote 3 job(s)"))
                .build(),
        );
        log::Log::log(&log, &Record::builder().level(log::Level::Debug).args(format_args!("hidden")).build());
        log::Log::flush(&log);

        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("[INFO] [ci_forge::compile] wrote 3 job(s)"));
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn default_location_is_under_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let _log = Log::new(dir.path(), "build", None, 4, LevelFilter::Info).unwrap();

        let files = log_files(&dir.path().join("logs").join("ci-forge"));
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("build-"));
    }
}
