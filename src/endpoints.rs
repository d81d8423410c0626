//! The API endpoints URIs.
//!
//! Months in paths use the `YYYY-MM-01` format, e.g. `/monthly-summary/2026-01-01`.

/// The route for checking that the server is up.
pub const HEALTH: &str = "/health";
/// The route to create and list expenses.
pub const EXPENSES: &str = "/expenses";
/// The route to upload CSV files of expenses.
pub const IMPORT_EXPENSES: &str = "/expenses/import";
/// The route to list the expenses in a month.
pub const MONTH_EXPENSES: &str = "/expenses/month/{month}";
/// The route to record income.
pub const INCOME: &str = "/income";
/// The route to list monthly summaries.
pub const MONTHLY_SUMMARIES: &str = "/monthly-summary";
/// The route to get the summary of a month.
pub const MONTHLY_SUMMARY: &str = "/monthly-summary/{month}";
/// The route to rebuild the summary of a month from its raw rows.
pub const RECONCILE_SUMMARY: &str = "/monthly-summary/{month}/reconcile";
/// The route to get ML recommendations for a month.
pub const RECOMMENDATIONS: &str = "/analyze/recommendations/{month}";
/// The route to scan a month's expenses for anomalies.
pub const MONTHLY_ANOMALIES: &str = "/anomalies/month";
/// The route to check a single expense for anomalies.
pub const ANOMALY_CHECK: &str = "/analyze/anomaly";
/// The route to forward a prediction request to the ML service.
pub const MONTHLY_PREDICTION: &str = "/predict/monthly";

/// Replace the `{month}` parameter in `endpoint_path` with `month`.
///
/// If there is no `{month}` parameter, `endpoint_path` is returned unchanged.
pub fn format_month_endpoint(endpoint_path: &str, month: &str) -> String {
    endpoint_path.replacen("{month}", month, 1)
}
