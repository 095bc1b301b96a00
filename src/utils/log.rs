//! Leveled stderr logging for the toolchain.
//!
//! Use the `debug!`, `info!`, `warn!` and `error!` macros. Messages below the
//! current threshold are dropped before they are formatted. The threshold
//! defaults to [`Level::Info`] and can be changed with [`set_level`] or read from
//! the `ROMASM_LOG` environment variable via [`init_from_env`].

use std::fmt::Display;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Environment variable holding the log threshold.
pub const LOG_ENV_VAR: &str = "ROMASM_LOG";

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

/// Threshold value meaning "log nothing".
const OFF: u8 = u8::MAX;

static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);

pub static SHOW_TIMESTAMP: AtomicBool = AtomicBool::new(false);
pub static SHOW_TYPE: AtomicBool = AtomicBool::new(true);

/// Parses a threshold name. `None` inside `Some` means logging is switched off.
pub fn parse_level(name: &str) -> Option<Option<Level>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "debug" | "trace" => Some(Some(Level::Debug)),
        "info" => Some(Some(Level::Info)),
        "warn" | "warning" => Some(Some(Level::Warn)),
        "error" => Some(Some(Level::Error)),
        "off" | "none" => Some(None),
        _ => None,
    }
}

/// Sets the minimum level that gets written. `None` disables logging.
pub fn set_level(level: Option<Level>) {
    let raw = level.map(|l| l as u8).unwrap_or(OFF);
    THRESHOLD.store(raw, Ordering::Relaxed);
}

/// Reads [`LOG_ENV_VAR`] and applies it. Unknown values keep the current level.
pub fn init_from_env() {
    if let Ok(value) = std::env::var(LOG_ENV_VAR)
        && let Some(level) = parse_level(&value)
    {
        set_level(level);
    }
}

/// Returns true when messages at `level` would be written.
pub fn enabled(level: Level) -> bool {
    let threshold = THRESHOLD.load(Ordering::Relaxed);
    threshold != OFF && level as u8 >= threshold
}

/// Formats seconds since midnight UTC as `HH:MM:SS.mmm`.
fn clock(secs: u64, millis: u32) -> String {
    let day_secs = secs % 86_400;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        day_secs / 3600,
        (day_secs / 60) % 60,
        day_secs % 60,
        millis
    )
}

/// Internal logging function. Use the logging macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let mut spec = ColorSpec::new();
    match level {
        Level::Debug => {
            spec.set_fg(Some(Color::Cyan));
        }
        Level::Info => {
            spec.clear();
        }
        Level::Warn => {
            spec.set_fg(Some(Color::Yellow)).set_bold(true);
        }
        Level::Error => {
            spec.set_fg(Some(Color::Red)).set_bold(true);
        }
    }
    let _ = stderr.set_color(&spec);

    if SHOW_TIMESTAMP.load(Ordering::Relaxed) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let _ = write!(stderr, "{} ", clock(now.as_secs(), now.subsec_millis()));
    }
    if SHOW_TYPE.load(Ordering::Relaxed) {
        let _ = write!(stderr, "[{:5}] ", level);
    }
    let _ = writeln!(stderr, "{}", message);
    let _ = stderr.reset();
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) && $crate::utils::log::enabled($crate::utils::log::Level::Debug) {
            $crate::utils::log::log($crate::utils::log::Level::Debug, &format!($($arg)*));
        }
    }};
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) && $crate::utils::log::enabled($crate::utils::log::Level::Info) {
            $crate::utils::log::log($crate::utils::log::Level::Info, &format!($($arg)*));
        }
    }};
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) && $crate::utils::log::enabled($crate::utils::log::Level::Warn) {
            $crate::utils::log::log($crate::utils::log::Level::Warn, &format!($($arg)*));
        }
    }};
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) && $crate::utils::log::enabled($crate::utils::log::Level::Error) {
            $crate::utils::log::log($crate::utils::log::Level::Error, &format!($($arg)*));
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::Debug), "DEBUG");
        assert_eq!(format!("{}", Level::Warn), "WARN");
        assert_eq!(format!("{}", Level::Error), "ERROR");
    }

    #[test]
    fn parse_level_names() {
        assert_eq!(parse_level("debug"), Some(Some(Level::Debug)));
        assert_eq!(parse_level(" WARN "), Some(Some(Level::Warn)));
        assert_eq!(parse_level("off"), Some(None));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn clock_formats_time_of_day() {
        assert_eq!(clock(0, 0), "00:00:00.000");
        // 2024-01-01 13:05:09 UTC
        assert_eq!(clock(1_704_114_309, 42), "13:05:09.042");
    }
}
