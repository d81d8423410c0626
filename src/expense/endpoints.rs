//! Route handlers for creating and listing expenses.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    body::Bytes,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error, MonthKey,
    app_state::lock_connection,
    expense::{
        core::{
            Expense, ExpenseSource, InsertReceipt, NewExpense, get_all_expenses,
            get_expenses_by_month, insert_expenses,
        },
        import::parse_expense_csv,
    },
};

/// The state needed to create or list expenses.
#[derive(Debug, Clone)]
pub struct ExpenseState {
    /// The database connection for managing expenses.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ExpenseState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The object form of an expense batch, `{"expenses": [...]}`.
#[derive(Debug, Deserialize)]
struct WrappedBatch {
    expenses: Vec<NewExpense>,
}

/// Decode a batch of expenses given either as a bare array or wrapped in an
/// object.
///
/// The shape is chosen from the first non-whitespace byte so that a decode
/// error names the offending field, e.g. `[0].amount`.
fn parse_expense_batch(body: &[u8]) -> Result<Vec<NewExpense>, Error> {
    let is_array = body.iter().find(|byte| !byte.is_ascii_whitespace()) == Some(&b'[');

    if is_array {
        let Json(expenses) = Json::<Vec<NewExpense>>::from_bytes(body)?;
        Ok(expenses)
    } else {
        let Json(batch) = Json::<WrappedBatch>::from_bytes(body)?;
        Ok(batch.expenses)
    }
}

/// The response body for a successful insert.
#[derive(Debug, Serialize)]
pub struct InsertResponse {
    status: &'static str,
    #[serde(flatten)]
    receipt: InsertReceipt,
}

impl From<InsertReceipt> for InsertResponse {
    fn from(receipt: InsertReceipt) -> Self {
        Self {
            status: "success",
            receipt,
        }
    }
}

/// A route handler for storing a batch of expenses.
///
/// Responds with 201 and the number of inserted expenses, or 400 without
/// storing anything if any expense is invalid.
pub async fn create_expenses(
    State(state): State<ExpenseState>,
    body: Bytes,
) -> Result<(StatusCode, Json<InsertResponse>), Error> {
    let expenses = parse_expense_batch(&body)?;

    let connection = lock_connection(&state.db_connection)?;
    let receipt = insert_expenses(expenses, ExpenseSource::Manual, &connection)?;
    tracing::info!(
        "Inserted {} expenses across {} months",
        receipt.inserted,
        receipt.months_affected
    );

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// A route handler for storing the expenses in a CSV file.
///
/// The body must be CSV text with the header row
/// `amount,description,category,transaction_date` and optionally an
/// `is_discretionary` column. Imported expenses are validated the same way as
/// [create_expenses] and the whole file is rejected if any row is invalid.
pub async fn import_expenses(
    State(state): State<ExpenseState>,
    body: String,
) -> Result<(StatusCode, Json<InsertResponse>), Error> {
    let expenses = parse_expense_csv(&body)?;

    let connection = lock_connection(&state.db_connection)?;
    let receipt = insert_expenses(expenses, ExpenseSource::Import, &connection)?;
    tracing::info!("Imported {} expenses from CSV", receipt.inserted);

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// A route handler that lists all expenses, most recent first.
pub async fn get_expenses(State(state): State<ExpenseState>) -> Result<Json<Vec<Expense>>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    Ok(Json(get_all_expenses(&connection)?))
}

/// A route handler that lists the expenses in a month given as `YYYY-MM-01`.
///
/// Malformed months are rejected before the database is queried.
pub async fn get_expenses_for_month(
    State(state): State<ExpenseState>,
    Path(month): Path<String>,
) -> Result<Json<Vec<Expense>>, Error> {
    let month = MonthKey::parse(&month)?;
    let connection = lock_connection(&state.db_connection)?;

    Ok(Json(get_expenses_by_month(month, &connection)?))
}
