use std::fs::{self, File};
use std::io::Write;

use crate::level::Level;

const STDLOG_FILE: &str = "Z0x50.log";
const DBGLOG_FILE: &str = "Debug.log";

/// Dual-sink logger: an always-on log file, a debug-build-only log file, and
/// an unconditional stdout mirror. Failing to open either file is reported
/// once to stdout and otherwise just drops that sink; it never stops the run.
pub struct Logger {
    std_log: Option<File>,
    debug_log: Option<File>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Opens `Z0x50.log` unconditionally and `Debug.log` only in debug builds,
    /// both truncated to empty, in the current working directory.
    #[must_use]
    pub fn new() -> Self {
        let std_log = match fs::File::create(STDLOG_FILE) {
            Ok(f) => Some(f),
            Err(_) => {
                println!("Failed to create log file '{STDLOG_FILE}'");
                None
            }
        };

        let debug_log = if cfg!(debug_assertions) {
            match fs::File::create(DBGLOG_FILE) {
                Ok(f) => Some(f),
                Err(_) => {
                    println!("Failed to create log file '{DBGLOG_FILE}'");
                    None
                }
            }
        } else {
            None
        };

        Self { std_log, debug_log }
    }

    /// A logger with no file sinks at all; everything still mirrors to
    /// stdout. Used where file side effects are unwanted, e.g. tests.
    #[must_use]
    pub fn muted() -> Self {
        Self { std_log: None, debug_log: None }
    }

    /// Writes `msg` with `level`'s prefix to the appropriate sink (`Debug`
    /// goes to the debug-only file, everything else to the always-on file)
    /// and unconditionally mirrors it to stdout, matching how the reference
    /// logging macros always print regardless of whether a file is open.
    pub fn log(&mut self, level: Level, msg: &str) {
        print!("{}{msg}", level.prefix());

        let sink = if level == Level::Debug { &mut self.debug_log } else { &mut self.std_log };
        if let Some(file) = sink {
            let _ = write!(file, "{}{msg}", level.prefix());
        }
    }

    /// Writes `msg` verbatim (no level prefix) to both the always-on file
    /// and stdout, mirroring the reference's unprefixed `directLog`.
    pub fn log_direct(&mut self, msg: &str) {
        print!("{msg}");
        if let Some(file) = &mut self.std_log {
            let _ = write!(file, "{msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_prefixes_are_stable() {
        assert_eq!(Level::Error.prefix(), "[ERR] ");
        assert_eq!(Level::Msg.prefix(), "[MSG] ");
        assert_eq!(Level::Warn.prefix(), "[WARN] ");
        assert_eq!(Level::Debug.prefix(), "[DEBUG] ");
    }
}
