//! The static per-operation cost table and the fixed run budget.
//!
//! Every pipeline run starts from [`DEFAULT_BUDGET`] regardless of caller
//! input, and only algorithm-stage transformations are charged against it.

use std::collections::BTreeMap;

use bitforge_types::RAW_WRITE_OPERATION;

/// Budget every pipeline run starts with.
pub const DEFAULT_BUDGET: f64 = 1000.0;

/// Cost charged for operations absent from the table.
pub const DEFAULT_OPERATION_COST: f64 = 1.0;

/// Static per-operation cost table.
#[derive(Debug, Clone)]
pub struct CostTable {
    costs: BTreeMap<String, f64>,
    default_cost: f64,
}

impl CostTable {
    /// Build a table from explicit entries.
    pub fn new(costs: BTreeMap<String, f64>, default_cost: f64) -> Self {
        Self { costs, default_cost }
    }

    /// Cost of one invocation of `operation`.
    pub fn cost_of(&self, operation: &str) -> f64 {
        self.costs.get(operation).copied().unwrap_or(self.default_cost)
    }

    /// The explicit entries, for budget reports.
    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.costs
    }
}

impl Default for CostTable {
    fn default() -> Self {
        let mut costs = BTreeMap::new();
        costs.insert("not".to_string(), 1.0);
        costs.insert("set_all".to_string(), 1.0);
        costs.insert("clear_all".to_string(), 1.0);
        costs.insert("shift_left".to_string(), 2.0);
        costs.insert("reverse".to_string(), 2.0);
        costs.insert("fill_pattern".to_string(), 3.0);
        // Raw writes are free; they are recorded for replay, not budgeted.
        costs.insert(RAW_WRITE_OPERATION.to_string(), 0.0);
        Self { costs, default_cost: DEFAULT_OPERATION_COST }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_operations_use_table_cost() {
        let table = CostTable::default();
        assert_eq!(table.cost_of("shift_left"), 2.0);
        assert_eq!(table.cost_of(RAW_WRITE_OPERATION), 0.0);
    }

    #[test]
    fn unknown_operations_use_default_cost() {
        let table = CostTable::default();
        assert_eq!(table.cost_of("custom_op"), DEFAULT_OPERATION_COST);
    }
}
