//! Database schema initialization.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{
    Error, expense::create_expense_table, income::create_income_table,
    summary::create_monthly_summary_table,
};

/// Create the tables and indexes for the application's domain models.
///
/// Safe to call on an existing database, tables that already exist are left as is.
///
/// # Errors
/// Returns an [Error::SqlError] if any table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_expense_table(&transaction)?;
    create_income_table(&transaction)?;
    create_monthly_summary_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
