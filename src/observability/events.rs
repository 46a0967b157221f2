//! Observable engine events
//!
//! Events are explicit and typed; each carries a fixed severity.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Planner produced a plan
    PlanBuilt,
    /// Planner refused a query
    PlanRejected,
    /// Cached plan reused
    PlanCacheHit,
    /// No usable cached plan
    PlanCacheMiss,
    /// Cursor finished executing a plan
    QueryExecuted,
    /// Regex filter pattern failed to compile
    RegexCompileFailed,
    /// Secondary index (re)built
    IndexBuilt,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PlanBuilt => "PLAN_BUILT",
            Event::PlanRejected => "PLAN_REJECTED",
            Event::PlanCacheHit => "PLAN_CACHE_HIT",
            Event::PlanCacheMiss => "PLAN_CACHE_MISS",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::RegexCompileFailed => "REGEX_COMPILE_FAILED",
            Event::IndexBuilt => "INDEX_BUILT",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::PlanBuilt | Event::PlanCacheHit | Event::PlanCacheMiss | Event::QueryExecuted => {
                Severity::Trace
            }
            Event::PlanRejected | Event::RegexCompileFailed => Severity::Warn,
            Event::IndexBuilt => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
