// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only operation log writing (`log`/`debugLog`).

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use oplg_core::LedgerResult;

/// Severity tag written into `<opId>.operation.log` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parse a level name case-insensitively, the way `/operation/log`'s
    /// optional `level` field does; unrecognized names fall back to `Info`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Append one `<timestamp> [<LEVEL>] <message>` line to the main log file.
pub fn append_main(path: &Path, timestamp: &str, level: LogLevel, message: &str) -> LedgerResult<()> {
    append_line(path, &format!("{timestamp} [{}] {message}\n", level.tag()))
}

/// Append one `<timestamp> <message>` line to the debug log file. The debug
/// log carries no level tag: it is a free-form trace, not a
/// severity-classified record.
pub fn append_debug(path: &Path, timestamp: &str, message: &str) -> LedgerResult<()> {
    append_line(path, &format!("{timestamp} {message}\n"))
}

fn append_line(path: &Path, line: &str) -> LedgerResult<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
