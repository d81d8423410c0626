//! Defines the income model and the database functions for recording income.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    Error, MonthKey,
    summary::{MonthlySummary, apply_income},
};

/// Income for a month as submitted by a client.
///
/// Income is append-only: recording income for a month that already has
/// income adds to the total rather than replacing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncome {
    /// The amount earned, must be a positive number.
    pub amount: f64,
    /// The month in the `YYYY-MM-01` format.
    pub month: String,
}

impl NewIncome {
    /// Check the amount and parse the month.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidIncome] if the amount is not a positive number,
    /// - or [Error::InvalidMonth] if the month is not in the `YYYY-MM-01` format.
    pub fn validate(&self) -> Result<(f64, MonthKey), Error> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(Error::InvalidIncome(format!(
                "amount must be a positive number, got {}",
                self.amount
            )));
        }

        Ok((self.amount, MonthKey::parse(&self.month)?))
    }
}

/// Record income for a month and add it to the month's summary.
///
/// The income row and the summary update are written in one database transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidIncome] or [Error::InvalidMonth] if the income is invalid,
/// - [Error::SummaryUpdateFailed] if the summary could not be updated, in
///   which case the income row is not stored either,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn insert_income(
    income: &NewIncome,
    connection: &Connection,
) -> Result<MonthlySummary, Error> {
    let (amount, month) = income.validate()?;

    let transaction = connection.unchecked_transaction()?;

    transaction.execute(
        "INSERT INTO income (amount, month) VALUES (?1, ?2)",
        (amount, month),
    )?;

    let summary = apply_income(month, amount, &transaction).map_err(|error| {
        tracing::error!("could not update monthly summary, rolling back income: {error}");
        Error::SummaryUpdateFailed(error.to_string())
    })?;

    transaction.commit()?;

    Ok(summary)
}

/// Create the income table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_income_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS income (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                amount REAL NOT NULL CHECK (amount > 0),
                month TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_income_month ON income(month);",
        (),
    )?;

    Ok(())
}
