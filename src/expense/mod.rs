//! Expense management.
//!
//! This module contains everything related to expenses:
//! - The `Expense` model and `NewExpense` validation
//! - Database functions for storing and querying expenses by month
//! - Route handlers for creating, importing and listing expenses

mod core;
mod endpoints;
mod import;

pub use self::core::{Expense, ExpenseId, create_expense_table, get_expenses_by_month};
pub use endpoints::{create_expenses, get_expenses, get_expenses_for_month, import_expenses};

#[cfg(test)]
pub use self::core::{ExpenseSource, NewExpense, insert_expenses};
