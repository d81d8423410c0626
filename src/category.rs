//! The expense categories and which of them count as discretionary spending.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::Error;

/// The category of an expense.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Groceries, eating out.
    Food,
    /// Fuel, public transport, taxis.
    Transport,
    /// Clothing, electronics and other retail.
    Shopping,
    /// Power, water, internet, phone.
    Utilities,
    /// Streaming, events, hobbies.
    Entertainment,
    /// Medical and pharmacy costs.
    Health,
    /// Anything that does not fit the other categories.
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 7] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Utilities,
        Category::Entertainment,
        Category::Health,
        Category::Other,
    ];

    /// The category code used in the API and the database, e.g. `"FOOD"`.
    pub fn code(&self) -> &'static str {
        match self {
            Category::Food => "FOOD",
            Category::Transport => "TRANSPORT",
            Category::Shopping => "SHOPPING",
            Category::Utilities => "UTILITIES",
            Category::Entertainment => "ENTERTAINMENT",
            Category::Health => "HEALTH",
            Category::Other => "OTHER",
        }
    }

    /// Whether spending in this category is optional rather than essential.
    pub fn is_discretionary(&self) -> bool {
        matches!(
            self,
            Category::Food | Category::Shopping | Category::Entertainment
        )
    }
}

/// Whether `code` names one of the known categories.
///
/// Codes are case sensitive, `"food"` is not a valid category.
pub fn is_valid_category(code: &str) -> bool {
    code.parse::<Category>().is_ok()
}

/// Whether an expense in the category `code` is discretionary.
///
/// Unknown codes are treated as essential spending.
pub fn infer_discretionary(code: &str) -> bool {
    code.parse::<Category>()
        .map(|category| category.is_discretionary())
        .unwrap_or(false)
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.code() == s)
            .ok_or_else(|| Error::InvalidCategory(s.to_owned()))
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}
