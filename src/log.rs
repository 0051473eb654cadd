//! File logging for drover.
//!
//! Log levels:
//! - ERROR: launch failures and other conditions that end a request abnormally
//! - WARN: timeouts, busy rejections, forced kills
//! - INFO: registration, spawn and exit of agent processes
//! - DEBUG: command lines, chunk counts, interpreter decisions
//! - TRACE: raw lines that could not be parsed
//!
//! Lines are tagged with the agent they concern when the macro is called
//! with an `agent:` prefix:
//!
//! ```text
//! 12:00:01.250 WARN  [backend] Request #3 timed out after 5s
//! 12:00:01.251 INFO  Fleet ready with 2 agents
//! ```
//!
//! `--debug` or `DROVER_DEBUG=1` lowers the threshold to DEBUG.
//! `DROVER_LOG=<level>` sets it explicitly and wins over both.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

/// One handle shared by every agent task, so concurrent lines never interleave.
static SINK: OnceLock<Mutex<File>> = OnceLock::new();
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

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
    const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

/// Threshold from the CLI flag and the two environment variables.
fn resolve_level(debug_flag: bool, env_debug: Option<&str>, env_level: Option<&str>) -> LogLevel {
    if let Some(level) = env_level.and_then(|v| v.parse().ok()) {
        return level;
    }
    let env_debug = env_debug.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if debug_flag || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Start logging to `~/.drover/drover.log`, truncating the previous run.
///
/// Without a home directory logging stays off.
pub fn init_with_debug(debug: bool) {
    let level = resolve_level(
        debug,
        std::env::var("DROVER_DEBUG").ok().as_deref(),
        std::env::var("DROVER_LOG").ok().as_deref(),
    );
    LEVEL.store(level as u8, Ordering::Relaxed);

    let Some(dir) = dirs::home_dir().map(|h| h.join(".drover")) else {
        return;
    };
    let _ = std::fs::create_dir_all(&dir);
    let opened = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join("drover.log"));
    if let Ok(file) = opened {
        let _ = SINK.set(Mutex::new(file));
    }
}

/// Whether a line at `level` would be written. Macros check this before
/// formatting anything.
pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= LEVEL.load(Ordering::Relaxed) && SINK.get().is_some()
}

fn format_line(timestamp: &str, level: LogLevel, agent: Option<&str>, msg: fmt::Arguments<'_>) -> String {
    match agent {
        Some(agent) => format!("{} {:<5} [{}] {}", timestamp, level.as_str(), agent, msg),
        None => format!("{} {:<5} {}", timestamp, level.as_str(), msg),
    }
}

/// Write one line. Use the `dlog!` family instead of calling this directly.
pub fn write(level: LogLevel, agent: Option<&str>, msg: fmt::Arguments<'_>) {
    let Some(sink) = SINK.get() else {
        return;
    };
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
    let line = format_line(&timestamp, level, agent, msg);
    let mut file = sink.lock().unwrap_or_else(|e| e.into_inner());
    let _ = writeln!(file, "{}", line);
}

#[doc(hidden)]
#[macro_export]
macro_rules! dlog_at {
    ($level:expr, agent: $agent:expr, $($arg:tt)+) => {
        if $crate::log::enabled($level) {
            $crate::log::write(
                $level,
                Some(::core::convert::AsRef::<str>::as_ref($agent)),
                format_args!($($arg)+),
            )
        }
    };
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::enabled($level) {
            $crate::log::write($level, None, format_args!($($arg)+))
        }
    };
}

/// INFO line, optionally tagged: `dlog!(agent: id, "Spawned pid {}", pid)`.
#[macro_export]
macro_rules! dlog {
    ($($arg:tt)+) => { $crate::dlog_at!($crate::log::LogLevel::Info, $($arg)+) };
}

#[macro_export]
macro_rules! dlog_error {
    ($($arg:tt)+) => { $crate::dlog_at!($crate::log::LogLevel::Error, $($arg)+) };
}

#[macro_export]
macro_rules! dlog_warn {
    ($($arg:tt)+) => { $crate::dlog_at!($crate::log::LogLevel::Warn, $($arg)+) };
}

/// DEBUG line, written only with `--debug`, `DROVER_DEBUG` or `DROVER_LOG`.
#[macro_export]
macro_rules! dlog_debug {
    ($($arg:tt)+) => { $crate::dlog_at!($crate::log::LogLevel::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! dlog_trace {
    ($($arg:tt)+) => { $crate::dlog_at!($crate::log::LogLevel::Trace, $($arg)+) };
}
