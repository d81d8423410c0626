//! Defines the core data models, validation and database queries for expenses.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{Date, macros::format_description};

use crate::{
    Category, Error, MonthKey,
    summary::{apply_expense_deltas, group_by_month},
};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("date pattern is a valid regex")
});

// ============================================================================
// MODELS
// ============================================================================

/// Database identifier for an expense.
pub type ExpenseId = i64;

/// How an expense entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseSource {
    /// Entered through the API.
    Manual,
    /// Imported from a CSV file.
    Import,
}

impl ExpenseSource {
    fn as_str(&self) -> &'static str {
        match self {
            ExpenseSource::Manual => "manual",
            ExpenseSource::Import => "import",
        }
    }
}

impl ToSql for ExpenseSource {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ExpenseSource {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "manual" => Ok(ExpenseSource::Manual),
            "import" => Ok(ExpenseSource::Import),
            other => Err(FromSqlError::Other(
                format!("unknown expense source \"{other}\"").into(),
            )),
        }
    }
}

/// Money spent on a given day. Expenses are never updated or deleted once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// The ID of the expense.
    pub id: ExpenseId,
    /// The amount spent, always positive.
    pub amount: f64,
    /// What the money was spent on.
    pub description: String,
    /// The category of the expense.
    pub category_code: Category,
    /// Whether the expense was optional spending.
    pub is_discretionary: bool,
    /// When the money was spent.
    #[serde(with = "iso_date")]
    pub transaction_date: Date,
    /// How the expense entered the system.
    pub source: ExpenseSource,
}

/// An unvalidated expense as submitted by a client.
///
/// Call [NewExpense::validate] before storing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    /// The amount spent, must be a positive number.
    pub amount: f64,
    /// What the money was spent on, must not be blank.
    pub description: String,
    /// A category code such as `"FOOD"`.
    #[serde(alias = "category_code")]
    pub category: String,
    /// The date in the `YYYY-MM-DD` format.
    pub transaction_date: String,
    /// Overrides the discretionary flag that would otherwise be inferred from
    /// the category.
    #[serde(default)]
    pub is_discretionary: Option<bool>,
}

/// An expense that has passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedExpense {
    /// The amount spent, positive and finite.
    pub amount: f64,
    /// What the money was spent on, trimmed and non-empty.
    pub description: String,
    /// The category of the expense.
    pub category: Category,
    /// Whether the expense was optional spending.
    pub is_discretionary: bool,
    /// When the money was spent.
    pub transaction_date: Date,
}

impl NewExpense {
    /// Check the expense's fields and convert them to their typed forms.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidExpense] if the amount is not a positive number, the
    ///   description is blank, or the date is not a real `YYYY-MM-DD` date,
    /// - or [Error::InvalidCategory] if the category code is unknown.
    pub fn validate(self) -> Result<ValidatedExpense, Error> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(Error::InvalidExpense(format!(
                "amount must be a positive number, got {}",
                self.amount
            )));
        }

        let description = self.description.trim();
        if description.is_empty() {
            return Err(Error::InvalidExpense(
                "description must not be empty".to_owned(),
            ));
        }

        let transaction_date = parse_transaction_date(&self.transaction_date)?;
        let category: Category = self.category.parse()?;
        let is_discretionary = self
            .is_discretionary
            .unwrap_or_else(|| category.is_discretionary());

        Ok(ValidatedExpense {
            amount: self.amount,
            description: description.to_owned(),
            category,
            is_discretionary,
            transaction_date,
        })
    }
}

fn parse_transaction_date(text: &str) -> Result<Date, Error> {
    let invalid = || {
        Error::InvalidExpense(format!(
            "transaction_date must be a YYYY-MM-DD date, got \"{text}\""
        ))
    };

    if !DATE_PATTERN.is_match(text) {
        return Err(invalid());
    }

    Date::parse(text, format_description!("[year]-[month]-[day]")).map_err(|_| invalid())
}

/// The outcome of inserting a batch of expenses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InsertReceipt {
    /// The number of expenses stored.
    pub inserted: usize,
    /// The number of distinct months whose summaries were updated.
    pub months_affected: usize,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const EXPENSE_COLUMNS: &str =
    "id, amount, description, category_code, is_discretionary, transaction_date, source";

/// Validate and store a batch of expenses, then add them to their months' summaries.
///
/// Every expense is validated before anything is written, so one invalid
/// expense rejects the whole batch. The expense rows and the summary updates
/// are written in one database transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::EmptyBatch] if `expenses` is empty,
/// - [Error::InvalidExpense] or [Error::InvalidCategory] if any expense is invalid,
/// - [Error::SummaryUpdateFailed] if a summary could not be updated, in which
///   case no expenses are stored either,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn insert_expenses(
    expenses: Vec<NewExpense>,
    source: ExpenseSource,
    connection: &Connection,
) -> Result<InsertReceipt, Error> {
    if expenses.is_empty() {
        return Err(Error::EmptyBatch);
    }

    let rows = expenses
        .into_iter()
        .map(NewExpense::validate)
        .collect::<Result<Vec<_>, _>>()?;

    let transaction = connection.unchecked_transaction()?;

    {
        let mut statement = transaction.prepare(
            "INSERT INTO expense
                (amount, description, category_code, is_discretionary, transaction_date, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for row in &rows {
            statement.execute((
                row.amount,
                &row.description,
                row.category,
                row.is_discretionary,
                row.transaction_date,
                source,
            ))?;
        }
    }

    let deltas = group_by_month(rows.iter().map(|row| (row.transaction_date, row.amount)));
    apply_expense_deltas(&deltas, &transaction).map_err(|error| {
        tracing::error!("could not update monthly summaries, rolling back expenses: {error}");
        Error::SummaryUpdateFailed(error.to_string())
    })?;

    transaction.commit()?;

    Ok(InsertReceipt {
        inserted: rows.len(),
        months_affected: deltas.len(),
    })
}

/// Retrieve every expense, most recent first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_all_expenses(connection: &Connection) -> Result<Vec<Expense>, Error> {
    connection
        .prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense ORDER BY transaction_date DESC, id DESC"
        ))?
        .query_map([], map_expense_row)?
        .map(|expense_result| expense_result.map_err(Error::SqlError))
        .collect()
}

/// Retrieve the expenses dated within `month`, most recent first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_expenses_by_month(
    month: MonthKey,
    connection: &Connection,
) -> Result<Vec<Expense>, Error> {
    connection
        .prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE transaction_date >= ?1 AND transaction_date <= ?2
             ORDER BY transaction_date DESC, id DESC"
        ))?
        .query_map(
            (month.first_day(), month.last_day()),
            map_expense_row,
        )?
        .map(|expense_result| expense_result.map_err(Error::SqlError))
        .collect()
}

/// Get the total number of expenses in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_expenses(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM expense;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Create the expense table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_expense_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS expense (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                amount REAL NOT NULL CHECK (amount > 0),
                description TEXT NOT NULL,
                category_code TEXT NOT NULL,
                is_discretionary INTEGER NOT NULL,
                transaction_date TEXT NOT NULL,
                source TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_expense_transaction_date ON expense(transaction_date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Expense].
pub fn map_expense_row(row: &Row) -> Result<Expense, rusqlite::Error> {
    Ok(Expense {
        id: row.get(0)?,
        amount: row.get(1)?,
        description: row.get(2)?,
        category_code: row.get(3)?,
        is_discretionary: row.get(4)?,
        transaction_date: row.get(5)?,
        source: row.get(6)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
