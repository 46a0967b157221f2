//! Errors surfaced by the `dfengine` binary
//!
//! Every CLI error ends the process with a non-zero status and a
//! `DF_CLI_*` code on stderr.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::dataframe::DataframeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    /// Files or stdout
    IoError,
    /// Table file could not be turned into a dataframe
    InvalidTable,
    /// Query file is malformed
    InvalidQuery,
    /// Planner refused the query
    PlanRejected,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DF_CLI_CONFIG_ERROR",
            Self::IoError => "DF_CLI_IO_ERROR",
            Self::InvalidTable => "DF_CLI_INVALID_TABLE",
            Self::InvalidQuery => "DF_CLI_INVALID_QUERY",
            Self::PlanRejected => "DF_CLI_PLAN_REJECTED",
        }
    }
}

/// A coded CLI failure.
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_table(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidTable, msg)
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidQuery, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("malformed JSON: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<DataframeError> for CliError {
    fn from(e: DataframeError) -> Self {
        match e {
            DataframeError::Planner(p) => Self::new(CliErrorCode::PlanRejected, p.to_string()),
            other => Self::invalid_table(other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
