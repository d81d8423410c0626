//! Route handlers for anomaly detection.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;

use crate::{
    Error, MonthKey,
    anomaly::core::{
        AnomalyCheckRequest, MonthlyAnomalyReport, ScanMode, detect_anomaly,
        detect_monthly_anomalies,
    },
    app_state::AnalysisState,
    ml::AnomalyVerdict,
};

/// The request body for a monthly anomaly scan.
#[derive(Debug, Deserialize)]
pub struct MonthlyScanRequest {
    /// The month to scan, in the `YYYY-MM-01` format.
    pub month: String,
    /// How to call the ML service, defaults to [ScanMode::Batch].
    #[serde(default)]
    pub mode: ScanMode,
}

/// A route handler that scans a month's expenses for anomalies.
///
/// In batch mode an ML failure yields an empty list of anomalies. In per-row
/// mode the expenses that could not be checked are listed under `failed`.
pub async fn scan_month_for_anomalies(
    State(state): State<AnalysisState>,
    payload: Result<Json<MonthlyScanRequest>, JsonRejection>,
) -> Result<Json<MonthlyAnomalyReport>, Error> {
    let Json(request) = payload?;
    let month = MonthKey::parse(&request.month)?;

    let report =
        detect_monthly_anomalies(month, request.mode, &state.db_connection, &state.ml_client)
            .await?;

    Ok(Json(report))
}

/// A route handler that checks a single expense with the ML service.
pub async fn check_expense_for_anomaly(
    State(state): State<AnalysisState>,
    payload: Result<Json<AnomalyCheckRequest>, JsonRejection>,
) -> Result<Json<AnomalyVerdict>, Error> {
    let Json(request) = payload?;

    Ok(Json(detect_anomaly(request, &state.ml_client).await?))
}
