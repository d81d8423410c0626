//! Monthly summaries: the derived per-month totals of income, expenses and
//! savings.
//!
//! This module contains:
//! - The `MonthlySummary` model and the savings metrics computed from its totals
//! - Database functions that keep summaries in step with raw expense and income rows
//! - Route handlers for listing, fetching and reconciling summaries

mod core;
mod endpoints;

pub use self::core::{
    MonthlySummary, apply_expense_deltas, apply_income, create_monthly_summary_table, get_summary,
    group_by_month, set_anomaly_count,
};
pub use endpoints::{get_monthly_summaries, get_monthly_summary, reconcile_monthly_summary};
