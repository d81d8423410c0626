//! Defines the endpoint for recording income.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State, rejection::JsonRejection},
    http::StatusCode,
};
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::{
    AppState, Error,
    app_state::lock_connection,
    income::core::{NewIncome, insert_income},
};

/// The state needed to record income.
#[derive(Debug, Clone)]
pub struct IncomeState {
    /// The database connection for managing income.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for IncomeState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for recording income for a month, responds with 201 on success.
pub async fn create_income(
    State(state): State<IncomeState>,
    payload: Result<Json<NewIncome>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let Json(income) = payload?;

    let connection = lock_connection(&state.db_connection)?;
    let summary = insert_income(&income, &connection)?;
    tracing::info!(
        "Recorded income of {} for {}, total income is now {}",
        income.amount,
        summary.month,
        summary.total_income
    );

    Ok((StatusCode::CREATED, Json(json!({ "status": "success" }))))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::{Value, json};

    use crate::{MonthKey, db::initialize, summary::get_summary};

    use super::{IncomeState, create_income};

    fn get_test_state() -> IncomeState {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        IncomeState {
            db_connection: Arc::new(Mutex::new(conn)),
        }
    }

    #[tokio::test]
    async fn create_income_returns_created() {
        let state = get_test_state();
        let app = Router::new()
            .route("/income", post(create_income))
            .with_state(state.clone());
        let server = TestServer::new(app).expect("Could not create test server.");

        let response = server
            .post("/income")
            .json(&json!({"amount": 1000, "month": "2026-01-01"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Value>(), json!({"status": "success"}));
        let conn = state.db_connection.lock().unwrap();
        let summary = get_summary(MonthKey::parse("2026-01-01").unwrap(), &conn)
            .unwrap()
            .unwrap();
        assert_eq!(summary.total_income, 1000.0);
    }

    #[tokio::test]
    async fn invalid_income_is_bad_request() {
        let app = Router::new()
            .route("/income", post(create_income))
            .with_state(get_test_state());
        let server = TestServer::new(app).expect("Could not create test server.");

        for body in [
            json!({"amount": -1, "month": "2026-01-01"}),
            json!({"amount": 10, "month": "2026-13-01"}),
            json!({"amount": "10", "month": "2026-01-01"}),
            json!({"month": "2026-01-01"}),
        ] {
            let response = server.post("/income").json(&body).await;

            response.assert_status_bad_request();
        }
    }
}
