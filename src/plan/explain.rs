//! Explain output
//!
//! Produces a deterministic listing of a plan: the execution parameters and
//! one line per instruction.

use std::fmt;

use serde::Serialize;

use super::query_plan::{ExecutionParams, QueryPlan};

/// One explained instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainStep {
    pub name: &'static str,
    pub cost: String,
    pub args: String,
}

/// Explained plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanExplain {
    pub params: ExecutionParams,
    pub steps: Vec<ExplainStep>,
    pub col_to_output_offset: Vec<u32>,
}

impl PlanExplain {
    pub fn from_plan(plan: &QueryPlan) -> Self {
        let steps = plan
            .bytecode
            .iter()
            .map(|bc| ExplainStep {
                name: bc.name(),
                cost: bc.cost().to_string(),
                args: bc.describe_args(),
            })
            .collect();
        Self {
            params: plan.params,
            steps,
            col_to_output_offset: plan.col_to_output_offset.clone(),
        }
    }
}

impl fmt::Display for PlanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== QUERY PLAN ===")?;
        writeln!(f, "Estimated Cost: {}", self.params.estimated_cost)?;
        writeln!(
            f,
            "Rows: max {} / estimated {}",
            self.params.max_row_count, self.params.estimated_row_count
        )?;
        writeln!(f, "Registers: {}", self.params.register_count)?;
        writeln!(f, "Output: r{} x {}", self.params.output_register, self.params.output_per_row)?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{:>3}: {} {} [{}]", i, step.name, step.args, step.cost)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Bytecode, RwHandle};

    #[test]
    fn test_explain_lists_each_instruction() {
        let plan = QueryPlan {
            bytecode: vec![Bytecode::InitRange {
                size: 3,
                dest_register: RwHandle::new(0),
            }],
            ..Default::default()
        };
        let explain = PlanExplain::from_plan(&plan);
        assert_eq!(explain.steps.len(), 1);
        assert_eq!(explain.steps[0].name, "InitRange");
        assert_eq!(explain.steps[0].cost, "Fixed(5)");
        assert!(explain.steps[0].args.contains("size: 3"));

        let text = explain.to_string();
        assert!(text.contains("InitRange"));
        let json = serde_json::to_value(&explain).unwrap();
        assert_eq!(json["steps"][0]["name"], "InitRange");
    }
}
