//! Defines the monthly summary model and the database functions that keep it
//! consistent with the raw expense and income rows.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, MonthKey};

// ============================================================================
// MODELS
// ============================================================================

/// The derived totals and savings metrics for one calendar month.
///
/// A summary is a cache of aggregates over the expense and income tables. It
/// is created by the first expense or income recorded for a month and updated
/// by every later insert for that month. Summaries are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// The month the summary covers.
    pub month: MonthKey,
    /// The sum of all income recorded for the month.
    pub total_income: f64,
    /// The sum of all expenses dated within the month.
    pub total_expense: f64,
    /// `total_income - total_expense`.
    pub savings: f64,
    /// Savings as a percentage of income, 0 when there is no income.
    pub savings_rate: f64,
    /// Expenses as a percentage of income, 0 when there is no income.
    pub expense_ratio: f64,
    /// The number of expenses flagged by the most recent complete anomaly scan.
    pub anomaly_count: u32,
}

/// The fields of a [MonthlySummary] that are computed from its totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryMetrics {
    /// `total_income - total_expense`.
    pub savings: f64,
    /// Savings as a percentage of income, rounded to 2 decimal places.
    pub savings_rate: f64,
    /// Expenses as a percentage of income, rounded to 2 decimal places.
    pub expense_ratio: f64,
}

impl SummaryMetrics {
    /// Compute the savings metrics for a month's totals.
    ///
    /// The rates are clamped to 0 when `total_income <= 0` instead of being
    /// infinite, NaN or negative.
    pub fn from_totals(total_income: f64, total_expense: f64) -> Self {
        let savings = total_income - total_expense;

        if total_income <= 0.0 {
            return Self {
                savings,
                savings_rate: 0.0,
                expense_ratio: 0.0,
            };
        }

        Self {
            savings,
            savings_rate: round_to_hundredths(savings / total_income * 100.0),
            expense_ratio: round_to_hundredths(total_expense / total_income * 100.0),
        }
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// An optional, inclusive range of months.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummaryRange {
    /// The earliest month to include.
    pub from: Option<MonthKey>,
    /// The latest month to include.
    pub to: Option<MonthKey>,
}

/// Sum `amounts` by the month their date falls in.
pub fn group_by_month(amounts: impl IntoIterator<Item = (Date, f64)>) -> BTreeMap<MonthKey, f64> {
    let mut totals = BTreeMap::new();

    for (date, amount) in amounts {
        *totals.entry(MonthKey::of(date)).or_insert(0.0) += amount;
    }

    totals
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const SUMMARY_COLUMNS: &str =
    "month, total_income, total_expense, savings, savings_rate, expense_ratio, anomaly_count";

/// Add the per-month expense totals in `deltas` to the monthly summaries.
///
/// Months are processed one at a time in chronological order. Each month's
/// totals are incremented in the database rather than read and written back,
/// so concurrent writers cannot lose each other's updates.
///
/// The caller should run this in the same database transaction as the insert
/// of the expenses that produced `deltas`.
///
/// # Errors
/// Returns an [Error::SqlError] if a summary could not be read or written.
pub fn apply_expense_deltas(
    deltas: &BTreeMap<MonthKey, f64>,
    connection: &Connection,
) -> Result<(), Error> {
    for (month, expense_delta) in deltas {
        let summary = add_to_month(*month, 0.0, *expense_delta, connection)?;
        tracing::debug!(
            "Added {expense_delta} to expenses for {month}, total expense is now {}",
            summary.total_expense
        );
    }

    Ok(())
}

/// Add `amount` to the income total of `month`'s summary.
///
/// The expense total and anomaly count are left untouched.
///
/// # Errors
/// Returns an [Error::SqlError] if the summary could not be read or written.
pub fn apply_income(
    month: MonthKey,
    amount: f64,
    connection: &Connection,
) -> Result<MonthlySummary, Error> {
    add_to_month(month, amount, 0.0, connection)
}

/// Increment a month's totals, creating the summary if needed, then recompute
/// its derived metrics from the stored totals.
fn add_to_month(
    month: MonthKey,
    income_delta: f64,
    expense_delta: f64,
    connection: &Connection,
) -> Result<MonthlySummary, Error> {
    let (total_income, total_expense): (f64, f64) = connection
        .prepare(
            "INSERT INTO monthly_summary
                (month, total_income, total_expense, savings, savings_rate, expense_ratio, anomaly_count)
             VALUES (?1, ?2, ?3, 0, 0, 0, 0)
             ON CONFLICT(month) DO UPDATE SET
                total_income = total_income + excluded.total_income,
                total_expense = total_expense + excluded.total_expense
             RETURNING total_income, total_expense",
        )?
        .query_row((month, income_delta, expense_delta), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    write_metrics(
        month,
        SummaryMetrics::from_totals(total_income, total_expense),
        connection,
    )
}

fn write_metrics(
    month: MonthKey,
    metrics: SummaryMetrics,
    connection: &Connection,
) -> Result<MonthlySummary, Error> {
    let summary = connection
        .prepare(&format!(
            "UPDATE monthly_summary
             SET savings = ?2, savings_rate = ?3, expense_ratio = ?4
             WHERE month = ?1
             RETURNING {SUMMARY_COLUMNS}"
        ))?
        .query_row(
            (
                month,
                metrics.savings,
                metrics.savings_rate,
                metrics.expense_ratio,
            ),
            map_summary_row,
        )?;

    Ok(summary)
}

/// Retrieve the summary for `month`, or `None` if nothing has been recorded for it.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_summary(
    month: MonthKey,
    connection: &Connection,
) -> Result<Option<MonthlySummary>, Error> {
    let summary = connection
        .prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM monthly_summary WHERE month = ?1"
        ))?
        .query_row([month], map_summary_row)
        .optional()?;

    Ok(summary)
}

/// Retrieve the summaries within `range`, ordered by month ascending.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_summaries(
    range: SummaryRange,
    connection: &Connection,
) -> Result<Vec<MonthlySummary>, Error> {
    connection
        .prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM monthly_summary
             WHERE (?1 IS NULL OR month >= ?1) AND (?2 IS NULL OR month <= ?2)
             ORDER BY month ASC"
        ))?
        .query_map((range.from, range.to), map_summary_row)?
        .map(|summary_result| summary_result.map_err(Error::SqlError))
        .collect()
}

/// Recompute `month`'s totals from the raw expense and income rows.
///
/// The anomaly count of an existing summary is kept.
///
/// # Errors
/// This function will return a:
/// - [Error::SummaryNotFound] if the month has no summary and no raw rows,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn reconcile_summary(
    month: MonthKey,
    connection: &Connection,
) -> Result<MonthlySummary, Error> {
    let transaction = connection.unchecked_transaction()?;

    let (expense_count, total_expense): (u32, f64) = transaction.query_row(
        "SELECT COUNT(id), COALESCE(SUM(amount), 0.0) FROM expense
         WHERE transaction_date >= ?1 AND transaction_date <= ?2",
        (month.first_day(), month.last_day()),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let (income_count, total_income): (u32, f64) = transaction.query_row(
        "SELECT COUNT(id), COALESCE(SUM(amount), 0.0) FROM income WHERE month = ?1",
        [month],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if expense_count == 0 && income_count == 0 && get_summary(month, &transaction)?.is_none() {
        return Err(Error::SummaryNotFound(month));
    }

    let metrics = SummaryMetrics::from_totals(total_income, total_expense);
    let summary = transaction
        .prepare(&format!(
            "INSERT INTO monthly_summary
                (month, total_income, total_expense, savings, savings_rate, expense_ratio, anomaly_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
             ON CONFLICT(month) DO UPDATE SET
                total_income = excluded.total_income,
                total_expense = excluded.total_expense,
                savings = excluded.savings,
                savings_rate = excluded.savings_rate,
                expense_ratio = excluded.expense_ratio
             RETURNING {SUMMARY_COLUMNS}"
        ))?
        .query_row(
            (
                month,
                total_income,
                total_expense,
                metrics.savings,
                metrics.savings_rate,
                metrics.expense_ratio,
            ),
            map_summary_row,
        )?;

    transaction.commit()?;

    Ok(summary)
}

/// Store the result of an anomaly scan on `month`'s summary.
///
/// Returns `false` without creating a summary if `month` does not have one.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn set_anomaly_count(
    month: MonthKey,
    anomaly_count: u32,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_updated = connection.execute(
        "UPDATE monthly_summary SET anomaly_count = ?2 WHERE month = ?1",
        (month, anomaly_count),
    )?;

    Ok(rows_updated > 0)
}

/// Create the monthly summary table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_monthly_summary_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS monthly_summary (
                month TEXT PRIMARY KEY,
                total_income REAL NOT NULL DEFAULT 0,
                total_expense REAL NOT NULL DEFAULT 0,
                savings REAL NOT NULL DEFAULT 0,
                savings_rate REAL NOT NULL DEFAULT 0,
                expense_ratio REAL NOT NULL DEFAULT 0,
                anomaly_count INTEGER NOT NULL DEFAULT 0
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [MonthlySummary].
pub fn map_summary_row(row: &Row) -> Result<MonthlySummary, rusqlite::Error> {
    Ok(MonthlySummary {
        month: row.get(0)?,
        total_income: row.get(1)?,
        total_expense: row.get(2)?,
        savings: row.get(3)?,
        savings_rate: row.get(4)?,
        expense_ratio: row.get(5)?,
        anomaly_count: row.get(6)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod database_tests {
    use std::collections::BTreeMap;

    use rusqlite::Connection;

    use crate::{Error, MonthKey, db::initialize};

    use super::{
        SummaryRange, apply_expense_deltas, apply_income, get_summaries, get_summary,
        reconcile_summary, set_anomaly_count,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn month(text: &str) -> MonthKey {
        MonthKey::parse(text).unwrap()
    }

    #[test]
    fn first_expense_creates_summary() {
        let conn = get_test_connection();
        let deltas = BTreeMap::from([(month("2026-01-01"), 100.0)]);

        apply_expense_deltas(&deltas, &conn).unwrap();

        let summary = get_summary(month("2026-01-01"), &conn).unwrap().unwrap();
        assert_eq!(summary.total_income, 0.0);
        assert_eq!(summary.total_expense, 100.0);
        assert_eq!(summary.savings, -100.0);
        assert_eq!(summary.savings_rate, 0.0);
        assert_eq!(summary.expense_ratio, 0.0);
        assert_eq!(summary.anomaly_count, 0);
    }

    #[test]
    fn later_expenses_accumulate() {
        let conn = get_test_connection();
        apply_income(month("2026-01-01"), 1000.0, &conn).unwrap();

        for amount in [100.0, 150.0, 50.0] {
            apply_expense_deltas(&BTreeMap::from([(month("2026-01-01"), amount)]), &conn)
                .unwrap();
        }

        let summary = get_summary(month("2026-01-01"), &conn).unwrap().unwrap();
        assert_eq!(summary.total_income, 1000.0);
        assert_eq!(summary.total_expense, 300.0);
        assert_eq!(summary.savings, 700.0);
        assert_eq!(summary.savings_rate, 70.0);
        assert_eq!(summary.expense_ratio, 30.0);
    }

    #[test]
    fn income_accumulates_and_keeps_expense_and_anomaly_count() {
        let conn = get_test_connection();
        apply_expense_deltas(&BTreeMap::from([(month("2026-01-01"), 100.0)]), &conn).unwrap();
        set_anomaly_count(month("2026-01-01"), 2, &conn).unwrap();

        apply_income(month("2026-01-01"), 600.0, &conn).unwrap();
        let summary = apply_income(month("2026-01-01"), 400.0, &conn).unwrap();

        assert_eq!(summary.total_income, 1000.0);
        assert_eq!(summary.total_expense, 100.0);
        assert_eq!(summary.savings, 900.0);
        assert_eq!(summary.savings_rate, 90.0);
        assert_eq!(summary.expense_ratio, 10.0);
        assert_eq!(summary.anomaly_count, 2);
    }

    #[test]
    fn get_missing_summary_returns_none() {
        let conn = get_test_connection();

        assert_eq!(get_summary(month("2026-01-01"), &conn), Ok(None));
    }

    #[test]
    fn get_summaries_filters_and_orders_by_month() {
        let conn = get_test_connection();
        for key in ["2026-03-01", "2026-01-01", "2026-02-01", "2025-12-01"] {
            apply_income(month(key), 10.0, &conn).unwrap();
        }

        let all = get_summaries(SummaryRange::default(), &conn).unwrap();
        let months: Vec<String> = all.iter().map(|s| s.month.to_string()).collect();
        assert_eq!(
            months,
            ["2025-12-01", "2026-01-01", "2026-02-01", "2026-03-01"]
        );

        let range = SummaryRange {
            from: Some(month("2026-01-01")),
            to: Some(month("2026-02-01")),
        };
        let filtered = get_summaries(range, &conn).unwrap();
        let months: Vec<String> = filtered.iter().map(|s| s.month.to_string()).collect();
        assert_eq!(months, ["2026-01-01", "2026-02-01"]);
    }

    #[test]
    fn reconcile_rebuilds_totals_from_raw_rows() {
        let conn = get_test_connection();
        conn.execute(
            "INSERT INTO expense (amount, description, category_code, is_discretionary, transaction_date, source)
             VALUES (40.0, 'lunch', 'FOOD', 1, '2026-01-05', 'manual'),
                    (60.0, 'bus', 'TRANSPORT', 0, '2026-01-31', 'manual'),
                    (999.0, 'next month', 'OTHER', 0, '2026-02-01', 'manual')",
            (),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO income (amount, month) VALUES (500.0, '2026-01-01')",
            (),
        )
        .unwrap();
        // Simulate a summary that has drifted from the raw rows.
        apply_expense_deltas(&BTreeMap::from([(month("2026-01-01"), 12345.0)]), &conn).unwrap();
        set_anomaly_count(month("2026-01-01"), 1, &conn).unwrap();

        let summary = reconcile_summary(month("2026-01-01"), &conn).unwrap();

        assert_eq!(summary.total_income, 500.0);
        assert_eq!(summary.total_expense, 100.0);
        assert_eq!(summary.savings, 400.0);
        assert_eq!(summary.savings_rate, 80.0);
        assert_eq!(summary.expense_ratio, 20.0);
        assert_eq!(summary.anomaly_count, 1);
    }

    #[test]
    fn reconcile_empty_month_fails() {
        let conn = get_test_connection();

        let result = reconcile_summary(month("2026-01-01"), &conn);

        assert_eq!(result, Err(Error::SummaryNotFound(month("2026-01-01"))));
    }

    #[test]
    fn set_anomaly_count_does_not_create_summary() {
        let conn = get_test_connection();

        let updated = set_anomaly_count(month("2026-01-01"), 3, &conn).unwrap();

        assert!(!updated);
        assert_eq!(get_summary(month("2026-01-01"), &conn), Ok(None));
    }
}
