//! Logging
//!
//! A small structured logger for registry events. The registry is a leaf
//! runtime component, so the logger carries no sinks or formats beyond a
//! plain-text line on stderr: a level gate backed by an atomic, a target,
//! and optional key-value fields.
//!
//! Grow events are logged at debug with the old and new instance lengths
//! and the elapsed time; quiescence stalls are logged at trace.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Most verbose.
    Trace = 0,
    /// Internal state transitions.
    Debug = 1,
    /// Default.
    Info = 2,
    /// Unexpected but recoverable conditions.
    Warn = 3,
    /// Fatal-path diagnostics.
    Error = 4,
    /// No logging.
    Off = 5,
}

impl Level {
    /// Level name as printed in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    fn from_u8(v: u8) -> Level {
        match v {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }

    /// Parse a level name, case-insensitive.
    pub fn parse(s: &str) -> Option<Level> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Info
    }
}

/// A field value in a structured log line.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    /// Unsigned integer.
    Uint(u64),
    /// Signed integer.
    Int(i64),
    /// Borrowed string.
    Str(&'a str),
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
        }
    }
}

static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Set the minimum level. Process-global.
pub fn set_level(level: Level) {
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Current minimum level.
pub fn level() -> Level {
    Level::from_u8(MIN_LEVEL.load(Ordering::SeqCst))
}

/// Whether a message at `level` would be emitted.
pub fn would_log(level: Level) -> bool {
    level != Level::Off && level >= self::level()
}

/// Emit one line: `[secs.millis] LEVEL [target] message {k=v, ...}`.
pub(crate) fn emit(level: Level, target: &str, message: &str, fields: &[(&str, Value<'_>)]) {
    if !would_log(level) {
        return;
    }
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut line = format!(
        "[{}.{:03}] {:<5} [{}] {}",
        ts / 1000,
        ts % 1000,
        level.as_str(),
        target,
        message
    );
    if !fields.is_empty() {
        line.push_str(" {");
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                line.push_str(", ");
            }
            line.push_str(&format!("{}={}", key, value));
        }
        line.push('}');
    }
    let _ = writeln!(std::io::stderr(), "{}", line);
}
