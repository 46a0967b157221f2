//! Planner error types
//!
//! Error codes:
//! - DF_PLAN_INVALID_COLUMN (REJECT)
//! - DF_PLAN_INVALID_INDEX (REJECT)
//! - DF_PLAN_UNSUPPORTED_OPERATOR (REJECT)
//! - DF_PLAN_INVALID_SPEC (REJECT)

use std::fmt;

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Query rejected; nothing was built
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// A spec names a column the table does not have
    DfPlanInvalidColumn,
    /// An index names a column the table does not have
    DfPlanInvalidIndex,
    /// Operator disabled by configuration
    DfPlanUnsupportedOperator,
    /// Specs contradict each other
    DfPlanInvalidSpec,
}

impl PlannerErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::DfPlanInvalidColumn => "DF_PLAN_INVALID_COLUMN",
            PlannerErrorCode::DfPlanInvalidIndex => "DF_PLAN_INVALID_INDEX",
            PlannerErrorCode::DfPlanUnsupportedOperator => "DF_PLAN_UNSUPPORTED_OPERATOR",
            PlannerErrorCode::DfPlanInvalidSpec => "DF_PLAN_INVALID_SPEC",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error with code, message and the offending column if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
    column: Option<u32>,
}

impl PlannerError {
    pub fn invalid_column(col: u32, column_count: usize) -> Self {
        Self {
            code: PlannerErrorCode::DfPlanInvalidColumn,
            message: format!("Column {} out of range (table has {})", col, column_count),
            column: Some(col),
        }
    }

    pub fn invalid_index(index: usize, col: u32) -> Self {
        Self {
            code: PlannerErrorCode::DfPlanInvalidIndex,
            message: format!("Index {} references missing column {}", index, col),
            column: Some(col),
        }
    }

    /// Create an empty-index error
    pub fn empty_index(index: usize) -> Self {
        Self {
            code: PlannerErrorCode::DfPlanInvalidIndex,
            message: format!("Index {} has no columns", index),
            column: None,
        }
    }

    pub fn regex_disabled(col: u32) -> Self {
        Self {
            code: PlannerErrorCode::DfPlanUnsupportedOperator,
            message: "Regex filters are disabled".into(),
            column: Some(col),
        }
    }

    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::DfPlanInvalidSpec,
            message: reason.into(),
            column: None,
        }
    }

    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn column(&self) -> Option<u32> {
        self.column
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
