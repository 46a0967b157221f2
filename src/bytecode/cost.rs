//! Instruction cost models
//!
//! Costs are relative units used to compare plans; they are not times.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cost {
    /// Independent of row count.
    Fixed(f64),
    /// Scales with `log2(rows)`.
    LogPerRow(f64),
    /// Scales with `rows`.
    LinearPerRow(f64),
    /// Scales with `rows * log2(rows)`.
    LogLinearPerRow(f64),
    /// Scales with the row count left after the instruction runs.
    PostOperationLinearPerRow(f64),
}

/// Contribution of any per-row cost when the estimated row count is zero.
pub const EMPTY_INPUT_COST: f64 = 5.0;

impl Cost {
    /// Cost charged before the row estimate is updated. Post-operation
    /// costs contribute nothing here; see [`Cost::post_operation`].
    pub fn pre_operation(self, estimated_rows: u32) -> f64 {
        let rows = estimated_rows as f64;
        match self {
            Cost::Fixed(c) => c,
            Cost::LogPerRow(c) if estimated_rows > 0 => c * rows.log2(),
            Cost::LinearPerRow(c) if estimated_rows > 0 => c * rows,
            Cost::LogLinearPerRow(c) if estimated_rows > 0 => c * rows * rows.log2(),
            Cost::LogPerRow(_) | Cost::LinearPerRow(_) | Cost::LogLinearPerRow(_) => {
                EMPTY_INPUT_COST
            }
            Cost::PostOperationLinearPerRow(_) => 0.0,
        }
    }

    /// Cost charged after the row estimate is updated.
    pub fn post_operation(self, estimated_rows: u32) -> f64 {
        match self {
            Cost::PostOperationLinearPerRow(c) => c * estimated_rows as f64,
            _ => 0.0,
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            Cost::Fixed(_) => "Fixed",
            Cost::LogPerRow(_) => "LogPerRow",
            Cost::LinearPerRow(_) => "LinearPerRow",
            Cost::LogLinearPerRow(_) => "LogLinearPerRow",
            Cost::PostOperationLinearPerRow(_) => "PostOperationLinearPerRow",
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Cost::Fixed(c)
            | Cost::LogPerRow(c)
            | Cost::LinearPerRow(c)
            | Cost::LogLinearPerRow(c)
            | Cost::PostOperationLinearPerRow(c) => c,
        };
        write!(f, "{}({})", self.model_name(), c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_row_costs() {
        assert_eq!(Cost::Fixed(3.0).pre_operation(1000), 3.0);
        assert_eq!(Cost::LinearPerRow(2.0).pre_operation(8), 16.0);
        assert_eq!(Cost::LogPerRow(2.0).pre_operation(8), 6.0);
        assert_eq!(Cost::LogLinearPerRow(1.0).pre_operation(8), 24.0);
    }

    #[test]
    fn test_zero_rows_charge_constant() {
        assert_eq!(Cost::LinearPerRow(100.0).pre_operation(0), EMPTY_INPUT_COST);
        assert_eq!(Cost::LogLinearPerRow(100.0).pre_operation(0), EMPTY_INPUT_COST);
    }

    #[test]
    fn test_post_operation_only_charged_after() {
        let c = Cost::PostOperationLinearPerRow(2.0);
        assert_eq!(c.pre_operation(100), 0.0);
        assert_eq!(c.post_operation(10), 20.0);
        assert_eq!(Cost::Fixed(1.0).post_operation(10), 0.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Cost::LinearPerRow(1.5).to_string(), "LinearPerRow(1.5)");
    }
}
