//! Structured JSON logger
//!
//! Each event is one JSON object on one line of stderr. Keys (`event`,
//! `severity` and the caller's fields) are emitted in sorted order, so two
//! identical events always produce identical bytes. Lines below the
//! process-wide minimum severity are dropped before any formatting.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::{Map, Value};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-query detail
    Trace = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Parses a configured level name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        [
            Severity::Trace,
            Severity::Info,
            Severity::Warn,
            Severity::Error,
            Severity::Fatal,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(name))
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// Writes engine events to stderr.
///
/// Stdout is left to the host; the CLI prints query results there.
pub struct Logger;

impl Logger {
    /// Sets the process-wide minimum severity.
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = format_line(severity, event, fields);
        let mut err = io::stderr().lock();
        // A failed log write must never fail the query.
        let _ = err.write_all(line.as_bytes());
    }
}

/// Renders one newline-terminated log line.
fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut object: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect();
    object.insert("event".to_string(), Value::from(event));
    object.insert("severity".to_string(), Value::from(severity.as_str()));

    let mut line = Value::Object(object).to_string();
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("trace"), Some(Severity::Trace));
        assert_eq!(Severity::parse("WARN"), Some(Severity::Warn));
        assert_eq!(Severity::parse("verbose"), None);
        for s in [Severity::Trace, Severity::Info, Severity::Warn, Severity::Error, Severity::Fatal] {
            assert_eq!(Severity::from_u8(s as u8), s);
        }
    }

    #[test]
    fn test_line_is_json() {
        let line = format_line(Severity::Warn, "REGEX_COMPILE_FAILED", &[("pattern", "(")]);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "REGEX_COMPILE_FAILED");
        assert_eq!(parsed["severity"], "WARN");
        assert_eq!(parsed["pattern"], "(");
    }

    #[test]
    fn test_keys_sorted_regardless_of_input_order() {
        let a = format_line(Severity::Info, "PLAN_BUILT", &[("rows", "1"), ("cost", "2")]);
        let b = format_line(Severity::Info, "PLAN_BUILT", &[("cost", "2"), ("rows", "1")]);
        assert_eq!(a, b);
        assert!(a.find("\"cost\"").unwrap() < a.find("\"event\"").unwrap());
        assert!(a.find("\"rows\"").unwrap() < a.find("\"severity\"").unwrap());
    }

    #[test]
    fn test_control_characters_stay_on_one_line() {
        let line = format_line(Severity::Info, "INDEX_BUILT", &[("columns", "a \"b\"\nc")]);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["columns"], "a \"b\"\nc");
        assert_eq!(line.matches('\n').count(), 1);
    }
}
