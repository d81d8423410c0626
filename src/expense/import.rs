//! Parses expenses from CSV text.

use crate::{Error, expense::core::NewExpense};

/// Parses CSV text into unvalidated expenses.
///
/// Expects a header row naming the columns `amount`, `description`,
/// `category` (or `category_code`) and `transaction_date`, plus an optional
/// `is_discretionary` column whose cells may be left empty. Surrounding
/// whitespace in cells is ignored.
///
/// Returns `Error::InvalidCSV` naming the first row that could not be read.
pub fn parse_expense_csv(text: &str) -> Result<Vec<NewExpense>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    reader
        .deserialize::<NewExpense>()
        .enumerate()
        .map(|(index, result)| {
            // Row 1 is the header.
            result.map_err(|error| Error::InvalidCSV(format!("row {}: {error}", index + 2)))
        })
        .collect()
}
