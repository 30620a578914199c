//! File-backed logging for the client.
//!
//! The client draws the terminal, so nothing may log to stdout or stderr
//! while a session runs. Records are routed by level into two files under
//! `~/.tandem/` (current directory when no home is available): warnings
//! and errors land in `tandem.log`, everything chattier in
//! `tandem-debug.log`.

use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Metadata, Record};

const LOG_FILE: &str = "tandem.log";
const DEBUG_LOG_FILE: &str = "tandem-debug.log";

/// A `log` backend that splits records across two files by level.
pub struct SplitFileLogger {
    primary: Mutex<File>,
    verbose: Mutex<File>,
    max_level: LevelFilter,
}

impl SplitFileLogger {
    pub fn new(primary: File, verbose: File, max_level: LevelFilter) -> Self {
        SplitFileLogger {
            primary: Mutex::new(primary),
            verbose: Mutex::new(verbose),
            max_level,
        }
    }
}

impl log::Log for SplitFileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = match record.level() {
            Level::Error | Level::Warn => &self.primary,
            _ => &self.verbose,
        };
        if let Ok(mut file) = target.lock() {
            let _ = writeln!(file, "{}", format_record(record));
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.primary.lock() {
            let _ = file.flush();
        }
        if let Ok(mut file) = self.verbose.lock() {
            let _ = file.flush();
        }
    }
}

fn format_record(record: &Record) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!(
        "{timestamp} {:5} {}: {}",
        record.level(),
        record.target(),
        record.args()
    )
}

/// Directory the log files live in, created on demand.
fn log_dir() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        let dir = home.join(".tandem");
        if fs::create_dir_all(&dir).is_ok() {
            return dir;
        }
    }
    PathBuf::from(".")
}

fn open_append(path: PathBuf) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the split logger as the global backend.
///
/// `debug` raises the captured level from info to trace.
pub fn init(debug: bool) -> Result<(), Box<dyn Error>> {
    let dir = log_dir();
    let primary = open_append(dir.join(LOG_FILE))?;
    let verbose = open_append(dir.join(DEBUG_LOG_FILE))?;

    let max_level = if debug {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    };
    log::set_boxed_logger(Box::new(SplitFileLogger::new(primary, verbose, max_level)))?;
    log::set_max_level(max_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    fn logger_with_temp_files(
        max_level: LevelFilter,
    ) -> (SplitFileLogger, PathBuf, PathBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let primary_path = dir.path().join(LOG_FILE);
        let verbose_path = dir.path().join(DEBUG_LOG_FILE);
        let logger = SplitFileLogger::new(
            open_append(primary_path.clone()).unwrap(),
            open_append(verbose_path.clone()).unwrap(),
            max_level,
        );
        (logger, primary_path, verbose_path, dir)
    }

    #[test]
    fn warnings_and_errors_go_to_the_primary_file() {
        let (logger, primary, verbose, _dir) = logger_with_temp_files(LevelFilter::Trace);

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("something odd"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("something routine"))
                .build(),
        );
        logger.flush();

        let primary = fs::read_to_string(primary).unwrap();
        let verbose = fs::read_to_string(verbose).unwrap();
        assert!(primary.contains("something odd"));
        assert!(!primary.contains("something routine"));
        assert!(verbose.contains("something routine"));
        assert!(!verbose.contains("something odd"));
    }

    #[test]
    fn records_above_the_max_level_are_dropped() {
        let (logger, _primary, verbose, _dir) = logger_with_temp_files(LevelFilter::Info);

        logger.log(
            &Record::builder()
                .level(Level::Trace)
                .args(format_args!("chatter"))
                .build(),
        );
        logger.flush();

        let verbose = fs::read_to_string(verbose).unwrap();
        assert!(verbose.is_empty());
    }

    #[test]
    fn formatted_records_carry_level_target_and_message() {
        let line = format_record(
            &Record::builder()
                .level(Level::Warn)
                .target("tandem_client::engine")
                .args(format_args!("watch out"))
                .build(),
        );
        assert!(line.contains("WARN"));
        assert!(line.contains("tandem_client::engine"));
        assert!(line.contains("watch out"));
    }
}
