//! Route handlers that forward savings predictions to the ML service.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde_json::Value;

use crate::{
    Error, MonthKey,
    app_state::AnalysisState,
    prediction::core::{MonthlyPredictionInput, analyze_recommendations, predict_monthly},
};

/// A route handler that returns the ML service's recommendations for a month
/// given as `YYYY-MM-01`.
pub async fn get_recommendations(
    State(state): State<AnalysisState>,
    Path(month): Path<String>,
) -> Result<Json<Value>, Error> {
    let month = MonthKey::parse(&month)?;

    let response = analyze_recommendations(month, &state.db_connection, &state.ml_client).await?;

    Ok(Json(response))
}

/// A route handler that forwards a client-supplied month of income and
/// spending to the ML service's prediction model.
pub async fn create_monthly_prediction(
    State(state): State<AnalysisState>,
    payload: Result<Json<MonthlyPredictionInput>, JsonRejection>,
) -> Result<Json<Value>, Error> {
    let Json(input) = payload?;

    Ok(Json(predict_monthly(input, &state.ml_client).await?))
}
