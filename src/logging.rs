//! `log4rs` setup for binaries and tests driving the attack
//!
//! The library itself only emits through the `log` macros; nothing in it
//! installs a logger.
use crate::error::{AttackError, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

const CONSOLE_PATTERN: &str = "{d(%H:%M:%S)} {h({l})} {t} - {m}{n}";
const FILE_PATTERN: &str = "{d} {l} {t} - {m}{n}";

fn init(name: &str, appender: Box<dyn Append>, level: LevelFilter) -> Result<()> {
    let config = Config::builder()
        .appender(Appender::builder().build(name, appender))
        .build(Root::builder().appender(name).build(level))
        .map_err(|e| AttackError::Logging(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| AttackError::Logging(e.to_string()))?;
    Ok(())
}

/// Logs to stderr at `level` and above.
///
/// # Errors
/// If a global logger is already installed.
pub fn init_console_logger(level: LevelFilter) -> Result<()> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .target(log4rs::append::console::Target::Stderr)
        .build();
    init("stderr", Box::new(stderr), level)
}

/// Appends to the file at `path`, creating it and its parent directories.
///
/// # Errors
/// If the file cannot be opened or a global logger is already installed.
pub fn init_file_logger<P: AsRef<Path>>(path: P, level: LevelFilter) -> Result<()> {
    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(path)?;
    init("logfile", Box::new(logfile), level)
}
