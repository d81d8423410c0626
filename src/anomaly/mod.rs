//! Anomaly detection: asks the ML service which expenses look unusual.
//!
//! This module contains:
//! - Monthly scans in batch or per-row mode, merging verdicts onto expenses
//! - Single expense checks
//! - Route handlers for both

mod core;
mod endpoints;

pub use endpoints::{check_expense_for_anomaly, scan_month_for_anomalies};
