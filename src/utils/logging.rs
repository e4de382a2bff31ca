//! Logging Utilities
//!
//! File-based and console logging.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use log::{Log, Metadata, Record, Level, LevelFilter};

/// Target prefix of this crate's log records
const CRATE_TARGET: &str = "opennow_decoder";

/// Get the log file path
pub fn get_log_file_path() -> PathBuf {
    super::get_app_data_dir().join("decoder.log")
}

/// Simple file logger
pub struct FileLogger {
    file: Mutex<Option<File>>,
    console: bool,
}

impl FileLogger {
    pub fn new(console: bool) -> Self {
        Self::with_path(&get_log_file_path(), console)
    }

    pub fn with_path(path: &Path, console: bool) -> Self {
        Self {
            file: Mutex::new(Self::open_log_file(path)),
            console,
        }
    }

    fn open_log_file(path: &Path) -> Option<File> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    }
}

/// Format one log line
fn format_line(level: Level, target: &str, message: &std::fmt::Arguments) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!("[{}] {} {} - {}\n", timestamp, level, target, message)
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Our crate down to DEBUG, FFmpeg bindings and everything else WARN and up
        if metadata.target().starts_with(CRATE_TARGET) {
            metadata.level() <= Level::Debug
        } else {
            metadata.level() <= Level::Warn
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), record.target(), record.args());

        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.write_all(line.as_bytes());
            }
        }

        if self.console {
            print!("{}", line);
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.flush();
            }
        }
    }
}

fn install(logger: FileLogger, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    Ok(())
}

/// Initialize the logging system (file only)
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    install(FileLogger::new(false), LevelFilter::Info)
}

/// Initialize logging with console output; also lets per-frame DEBUG records through
pub fn init_logging_with_console() -> Result<(), log::SetLoggerError> {
    install(FileLogger::new(true), LevelFilter::Debug)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(level: Level, target: &str) -> Metadata<'_> {
        Metadata::builder().level(level).target(target).build()
    }

    #[test]
    fn test_crate_records_pass_at_debug() {
        let logger = FileLogger {
            file: Mutex::new(None),
            console: false,
        };
        assert!(logger.enabled(&metadata(Level::Debug, "opennow_decoder::media::feeder")));
        assert!(!logger.enabled(&metadata(Level::Trace, "opennow_decoder::media::feeder")));
    }

    #[test]
    fn test_foreign_records_need_warn() {
        let logger = FileLogger {
            file: Mutex::new(None),
            console: false,
        };
        assert!(logger.enabled(&metadata(Level::Warn, "ffmpeg_next")));
        assert!(!logger.enabled(&metadata(Level::Info, "ffmpeg_next")));
    }

    #[test]
    fn test_writes_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("decoder.log");
        let logger = FileLogger::with_path(&path, false);

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("opennow_decoder::media")
                .args(format_args!("decode failed"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("other_crate")
                .args(format_args!("noise"))
                .build(),
        );
        logger.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("WARN opennow_decoder::media - decode failed"));
        assert!(!content.contains("noise"));
        assert_eq!(content.lines().count(), 1);
    }
}
