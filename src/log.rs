//! File logging for the canopy dashboard.
//!
//! The terminal belongs to the TUI, so diagnostics go to `~/.canopy/canopy.log`,
//! truncated at startup. The threshold comes from `CANOPY_LOG` when it names a
//! level, else `--debug` / `CANOPY_DEBUG=1` lower it to DEBUG.
//!
//! What goes where:
//! - ERROR: a loud pull or the push channel failed in a way the user sees
//! - WARN: recoverable trouble (silent pull failures, endpoint fallbacks, reconnects)
//! - INFO: startup, target switches, job completion
//! - DEBUG: sync bookkeeping (debounce skips, stale drops, timer start/stop)
//! - TRACE: per-frame and per-message detail

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();
static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

fn env_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Threshold for the given flag and environment values.
fn resolve_level(
    debug_flag: bool,
    env_debug: Option<String>,
    env_level: Option<String>,
) -> LogLevel {
    if let Some(level) = env_level.and_then(|v| v.parse().ok()) {
        return level;
    }
    if debug_flag || env_flag(env_debug) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

pub fn init_with_debug(debug: bool) {
    let level = resolve_level(
        debug,
        std::env::var("CANOPY_DEBUG").ok(),
        std::env::var("CANOPY_LOG").ok(),
    );
    THRESHOLD.store(level as u8, Ordering::SeqCst);

    if let Some(dir) = dirs::home_dir().map(|h| h.join(".canopy")) {
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("canopy.log");
        let _ = std::fs::write(&path, "");
        LOG_FILE.set(path).ok();
    }
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(THRESHOLD.load(Ordering::Relaxed))
}

fn append(path: &Path, level: LogLevel, msg: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
        let _ = writeln!(file, "[{}] {:<5} {}", timestamp, level.label(), msg);
    }
}

pub fn log_at(level: LogLevel, msg: &str) {
    if level > self::level() {
        return;
    }
    if let Some(path) = LOG_FILE.get() {
        append(path, level, msg);
    }
}

pub fn info(msg: &str) {
    log_at(LogLevel::Info, msg);
}

pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

#[macro_export]
macro_rules! clog {
    ($($arg:tt)*) => {
        $crate::log::info(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
