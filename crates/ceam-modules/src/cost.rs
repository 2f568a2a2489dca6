//! Shared cost accounting.
//!
//! Costs accrue by calendar year across components and have to outlive the
//! simulation so analyses can read them back after the run. The ledger is a
//! cheap cloneable handle; a component keeps one clone, the caller keeps
//! another.

use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;

/// Yearly cost accumulator shared between components and their caller.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    by_year: Arc<Mutex<IndexMap<i32, f64>>>,
}

impl CostLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cost to a calendar year's bucket.
    pub fn add(&self, year: i32, amount: f64) {
        let mut by_year = self
            .by_year
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *by_year.entry(year).or_insert(0.0) += amount;
    }

    /// The cost recorded for one year.
    pub fn year(&self, year: i32) -> f64 {
        self.by_year
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&year)
            .copied()
            .unwrap_or(0.0)
    }

    /// Total cost across all years.
    pub fn total(&self) -> f64 {
        self.by_year
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// A snapshot of the per-year buckets.
    pub fn snapshot(&self) -> IndexMap<i32, f64> {
        self.by_year
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
