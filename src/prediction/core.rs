//! Savings predictions and recommendations from the ML service.

use std::{collections::BTreeMap, sync::Mutex};

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    Error, MlClient, MonthKey,
    app_state::lock_connection,
    expense::{Expense, get_expenses_by_month},
    ml::PredictionRequest,
    summary::{MonthlySummary, get_summary},
};

/// Sum the amounts of `expenses` per category code.
pub fn totals_by_category<'a>(
    expenses: impl IntoIterator<Item = &'a Expense>,
) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();

    for expense in expenses {
        *totals
            .entry(expense.category_code.code().to_owned())
            .or_insert(0.0) += expense.amount;
    }

    totals
}

/// Ask the ML service for recommendations based on a month's recorded
/// income and spending per category.
///
/// The ML response is returned unmodified.
///
/// # Errors
/// Returns [Error::SummaryNotFound] if nothing has been recorded for `month`,
/// a store error if the month could not be read, or one of the ML errors if
/// the ML service fails.
pub async fn analyze_recommendations(
    month: MonthKey,
    db_connection: &Mutex<Connection>,
    ml_client: &MlClient,
) -> Result<Value, Error> {
    let (summary, expenses) = load_month(month, db_connection)?;

    let request = PredictionRequest {
        month: month.year_month(),
        income: summary.total_income,
        expenses: totals_by_category(&expenses),
    };
    tracing::debug!("Requesting recommendations for {month}: {request:?}");

    ml_client.predict(&request).await
}

fn load_month(
    month: MonthKey,
    db_connection: &Mutex<Connection>,
) -> Result<(MonthlySummary, Vec<Expense>), Error> {
    let connection = lock_connection(db_connection)?;

    let summary = get_summary(month, &connection)?.ok_or(Error::SummaryNotFound(month))?;
    let expenses = get_expenses_by_month(month, &connection)?;

    Ok((summary, expenses))
}

/// A client-supplied prediction request, forwarded to the ML service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthlyPredictionInput {
    /// The month as `YYYY-MM` or `YYYY-MM-01`.
    pub month: String,
    /// The income for the month.
    pub income: f64,
    /// The amount spent per category code.
    pub expenses: BTreeMap<String, f64>,
}

impl MonthlyPredictionInput {
    /// Check the input and convert it into the ML service's request format.
    ///
    /// # Errors
    /// Returns [Error::InvalidMonth] for a malformed month, or
    /// [Error::InvalidRequest] if the income or any expense amount is
    /// negative or not a finite number.
    pub fn into_request(self) -> Result<PredictionRequest, Error> {
        let month = if self.month.len() == 7 {
            MonthKey::parse(&format!("{}-01", self.month))
                .map_err(|_| Error::InvalidMonth(self.month.clone()))?
        } else {
            MonthKey::parse(&self.month)?
        };

        if !self.income.is_finite() || self.income < 0.0 {
            return Err(Error::InvalidRequest(format!(
                "income must be a non-negative number, got {}",
                self.income
            )));
        }

        if let Some((category, amount)) = self
            .expenses
            .iter()
            .find(|(_, amount)| !amount.is_finite() || **amount < 0.0)
        {
            return Err(Error::InvalidRequest(format!(
                "expense amount for {category} must be a non-negative number, got {amount}"
            )));
        }

        Ok(PredictionRequest {
            month: month.year_month(),
            income: self.income,
            expenses: self.expenses,
        })
    }
}

/// Forward a client-supplied prediction request to the ML service.
///
/// # Errors
/// Returns a validation error for invalid input, or one of the ML errors if
/// the ML service fails.
pub async fn predict_monthly(
    input: MonthlyPredictionInput,
    ml_client: &MlClient,
) -> Result<Value, Error> {
    let request = input.into_request()?;

    ml_client.predict(&request).await
}
