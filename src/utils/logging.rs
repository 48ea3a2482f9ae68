use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use chrono::Local;
use tokio::sync::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use colored::*;

/// Logging errors
#[derive(Error, Debug)]
pub enum LogError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Logger initialization error: {0}")]
    InitError(String),
}

/// Result type for logging operations
type LogResult<T> = Result<T, LogError>;

/// Logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> LogResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "err" => Ok(LogLevel::Error),
            _ => Err(LogError::InvalidLogLevel(s.to_string())),
        }
    }
}

/// Logger logic
struct Logger {
    /// Current log level
    level: LogLevel,

    /// File for logging
    file: Option<Arc<Mutex<File>>>,

    /// Whether to log to std out or not
    stdout: bool,

    /// whether to include timestamps
    timestamps: bool,
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn colored_line(prefix: &str, level: LogLevel, module: &str, message: &str) -> String {
    let level_str = match level {
        LogLevel::Trace => level.to_string().magenta(),
        LogLevel::Debug => level.to_string().blue(),
        LogLevel::Info => level.to_string().green(),
        LogLevel::Warn => level.to_string().yellow(),
        LogLevel::Error => level.to_string().red().bold(),
    };

    format!(
        "{}[{}] [{}] {}",
        prefix,
        level_str,
        module.cyan(),
        match level {
            LogLevel::Error => message.red(),
            LogLevel::Warn => message.yellow(),
            _ => message.normal(),
        }
    )
}

impl Logger {
    /// Creates a new logger
    async fn new(level: LogLevel, log_file: Option<&str>, stdout: bool, timestamps: bool) -> LogResult<Self> {
        let file = if let Some(path) = log_file {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;

            Some(Arc::new(Mutex::new(file)))
        } else {
            None
        };

        Ok(Self {
            level,
            file,
            stdout,
            timestamps,
        })
    }

    /// Log a message
    async fn log(&self, level: LogLevel, message: &str, module: &str) -> LogResult<()> {
        if level < self.level {
            return Ok(());
        }

        let prefix = if self.timestamps {
            format!("{} ", timestamp())
        } else {
            String::new()
        };

        // Plain text for the file, colors only on the terminal
        if let Some(file) = &self.file {
            let plain = format!("{}[{}] [{}] {}\n", prefix, level, module, message);
            let mut file_guard = file.lock().await;
            file_guard.write_all(plain.as_bytes()).await?;
        }

        if self.stdout {
            println!("{}", colored_line(&prefix, level, module, message));
        }

        Ok(())
    }
}

/// Global logger
static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

/// Install the global logger; later calls keep the first configuration
pub async fn init_logging(level: LogLevel, log_file: Option<&str>, stdout: bool, timestamps: bool) -> LogResult<()> {
    if LOGGER.get().is_some() {
        return Ok(());
    }

    let logger = Logger::new(level, log_file, stdout, timestamps).await?;
    let _ = LOGGER.set(Mutex::new(logger));

    Ok(())
}

/// Initialize the logger from config string
pub async fn init_from_config(level_str: &str, log_file: Option<&str>) -> LogResult<()> {
    let level = level_str.parse::<LogLevel>()?;
    init_logging(level, log_file, true, true).await
}

/// Set the current log level
pub async fn set_level(level: LogLevel) -> LogResult<()> {
    let logger = LOGGER
        .get()
        .ok_or_else(|| LogError::InitError("Logger not initialized".to_string()))?;
    logger.lock().await.level = level;
    Ok(())
}

/// Internal log function
pub async fn log_internal(level: LogLevel, message: &str, module: &str) -> LogResult<()> {
    match LOGGER.get() {
        Some(logger) => logger.lock().await.log(level, message, module).await,
        None => {
            log_fallback(level, message, module);
            Ok(())
        }
    }
}

/// Print straight to stdout, used before init or outside a runtime
fn log_fallback(level: LogLevel, message: &str, module: &str) {
    println!("{} [{}] [{}] {}", timestamp(), level, module, message);
}

/// Route a formatted record to the logger.
///
/// Inside a tokio runtime the write is spawned so callers never wait on the
/// file; synchronous callers without a runtime get a direct stdout line.
pub fn dispatch(level: LogLevel, module: &'static str, message: String) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let _ = log_internal(level, &message, module).await;
            });
        }
        Err(_) => log_fallback(level, &message, module),
    }
}

/// Get module name from file path
pub fn get_module_name(file: &str) -> &str {
    file.rsplit(['/', '\\'])
        .next()
        .unwrap_or(file)
        .split('.')
        .next()
        .unwrap_or(file)
}

/// Log at trace levels
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::utils::logging::dispatch(
            $crate::utils::logging::LogLevel::Trace,
            $crate::utils::logging::get_module_name(file!()),
            format!($($arg)*),
        )
    };
}

/// Log at debug level
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::utils::logging::dispatch(
            $crate::utils::logging::LogLevel::Debug,
            $crate::utils::logging::get_module_name(file!()),
            format!($($arg)*),
        )
    };
}

/// Log at info level
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::utils::logging::dispatch(
            $crate::utils::logging::LogLevel::Info,
            $crate::utils::logging::get_module_name(file!()),
            format!($($arg)*),
        )
    };
}

/// Log at warn level
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::utils::logging::dispatch(
            $crate::utils::logging::LogLevel::Warn,
            $crate::utils::logging::get_module_name(file!()),
            format!($($arg)*),
        )
    };
}

/// Log at error level
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::utils::logging::dispatch(
            $crate::utils::logging::LogLevel::Error,
            $crate::utils::logging::get_module_name(file!()),
            format!($($arg)*),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_aliases() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("err".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!(matches!("loud".parse::<LogLevel>(), Err(LogError::InvalidLogLevel(_))));
    }

    #[test]
    fn strips_path_and_extension_from_module() {
        assert_eq!(get_module_name("src/reconcile/runner.rs"), "runner");
        assert_eq!(get_module_name("src\\filter\\merge.rs"), "merge");
        assert_eq!(get_module_name("main.rs"), "main");
    }

    #[test]
    fn macros_work_without_a_runtime() {
        crate::info!("plain {} call", "sync");
        crate::debug!("no runtime needed");
    }
}
