//! Application router configuration.

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::{
    AppState, Error,
    anomaly::{check_expense_for_anomaly, scan_month_for_anomalies},
    endpoints,
    expense::{create_expenses, get_expenses, get_expenses_for_month, import_expenses},
    income::create_income,
    logging::logging_middleware,
    prediction::{create_monthly_prediction, get_recommendations},
    summary::{get_monthly_summaries, get_monthly_summary, reconcile_monthly_summary},
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::EXPENSES, get(get_expenses).post(create_expenses))
        .route(endpoints::IMPORT_EXPENSES, post(import_expenses))
        .route(endpoints::MONTH_EXPENSES, get(get_expenses_for_month))
        .route(endpoints::INCOME, post(create_income))
        .route(endpoints::MONTHLY_SUMMARIES, get(get_monthly_summaries))
        .route(endpoints::MONTHLY_SUMMARY, get(get_monthly_summary))
        .route(endpoints::RECONCILE_SUMMARY, post(reconcile_monthly_summary))
        .route(endpoints::RECOMMENDATIONS, get(get_recommendations))
        .route(endpoints::MONTHLY_ANOMALIES, post(scan_month_for_anomalies))
        .route(endpoints::ANOMALY_CHECK, post(check_expense_for_anomaly))
        .route(endpoints::MONTHLY_PREDICTION, post(create_monthly_prediction))
        .fallback(get_404_not_found)
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_404_not_found() -> Error {
    Error::NotFound
}
