//! A personal finance tracker backend.
//!
//! This library provides a JSON REST API for recording expenses and income,
//! maintaining a per-month summary of totals and savings metrics, and
//! forwarding expense data to an external ML service for anomaly detection
//! and savings prediction.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod anomaly;
mod app_state;
mod category;
mod db;
pub mod endpoints;
mod expense;
mod income;
mod logging;
mod ml;
mod month;
mod prediction;
mod routing;
mod summary;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use category::{Category, infer_discretionary, is_valid_category};
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use ml::{MlClient, MlConfig};
pub use month::MonthKey;
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An expense in a batch failed validation.
    ///
    /// The whole batch is rejected and nothing is written.
    #[error("invalid expense entry: {0}")]
    InvalidExpense(String),

    /// An expense used a category code that is not in the category set.
    #[error("invalid category: {0}")]
    InvalidCategory(String),

    /// A month key was not in the `YYYY-MM-01` format.
    #[error("month must be in YYYY-MM-01 format, got \"{0}\"")]
    InvalidMonth(String),

    /// An income amount was not a positive number.
    #[error("invalid income amount: {0}")]
    InvalidIncome(String),

    /// An expense batch contained no expenses.
    #[error("expenses must be a non-empty array")]
    EmptyBatch,

    /// The request body could not be parsed, or a field had the wrong shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The CSV had issues that prevented it from being parsed.
    #[error("could not parse the CSV file: {0}")]
    InvalidCSV(String),

    /// There is no monthly summary for the month.
    ///
    /// Operations that read a month's income (e.g., recommendations) need at
    /// least one expense or income to have been recorded for that month.
    #[error("monthly summary not found for {0}")]
    SummaryNotFound(MonthKey),

    /// The requested resource was not found.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// The raw rows were written but the monthly summary could not be updated.
    ///
    /// The enclosing database transaction is rolled back, so neither the raw
    /// rows nor any summary changes from the request are kept.
    #[error("failed to update the monthly summary, no changes were saved: {0}")]
    SummaryUpdateFailed(String),

    /// The ML service did not respond within the configured timeout.
    #[error("ML service timed out")]
    MlTimeout,

    /// The ML service could not be reached.
    #[error("ML service unavailable: {0}")]
    MlUnavailable(String),

    /// The ML service responded with a non-2xx status code.
    #[error("ML service error {status}: {body}")]
    MlStatus {
        /// The HTTP status code of the response.
        status: u16,
        /// The response body, as text.
        body: String,
    },

    /// The ML service responded with a body that could not be decoded.
    #[error("ML service returned an invalid response: {0}")]
    MlInvalidResponse(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidRequest(rejection.body_text())
    }
}

impl Error {
    /// The HTTP status code and machine readable error code for the error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::InvalidExpense(_)
            | Error::InvalidCategory(_)
            | Error::InvalidMonth(_)
            | Error::InvalidIncome(_)
            | Error::EmptyBatch
            | Error::InvalidRequest(_)
            | Error::InvalidCSV(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Error::SummaryNotFound(_) | Error::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Error::SqlError(_) | Error::DatabaseLockError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
            Error::SummaryUpdateFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "summary_update_failed")
            }
            Error::MlTimeout
            | Error::MlUnavailable(_)
            | Error::MlStatus { .. }
            | Error::MlInvalidResponse(_) => (StatusCode::BAD_REQUEST, "ml_service_error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!("An unexpected error occurred: {}", self);
        } else {
            tracing::debug!("Request failed with {status}: {}", self);
        }

        (
            status,
            Json(json!({
                "status": "failure",
                "error": self.to_string(),
                "code": code,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use serde_json::Value;

    use crate::{Error, MonthKey};

    async fn body_json(error: Error) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests() {
        let (status, body) = body_json(Error::InvalidCategory("BOGUS".to_owned())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "failure");
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["error"], "invalid category: BOGUS");
    }

    #[tokio::test]
    async fn summary_update_failure_has_distinct_code() {
        let (status, body) = body_json(Error::SummaryUpdateFailed("disk full".to_owned())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "summary_update_failed");
    }

    #[tokio::test]
    async fn ml_errors_are_bad_requests() {
        let (status, body) = body_json(Error::MlTimeout).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ml_service_error");
    }

    #[tokio::test]
    async fn missing_summary_is_not_found() {
        let month: MonthKey = "2026-01-01".parse().unwrap();
        let (status, body) = body_json(Error::SummaryNotFound(month)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "monthly summary not found for 2026-01-01");
    }
}
