//! The month key used to group expenses, income and summaries by calendar month.

use std::{fmt::Display, str::FromStr, sync::LazyLock};

use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Date, macros::format_description};

use crate::Error;

static MONTH_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-(0[1-9]|1[0-2])-01$").expect("month key pattern is a valid regex")
});

/// A calendar month, represented by its first day, e.g. `2026-01-01`.
///
/// Serializes to and from the `YYYY-MM-01` string form, and is stored in the
/// database as that same text so range comparisons on text work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey(Date);

impl MonthKey {
    /// Parse a month key from the `YYYY-MM-01` format.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidMonth] if `text` does not match `YYYY-MM-01`
    /// with a month between 01 and 12.
    pub fn parse(text: &str) -> Result<Self, Error> {
        if !MONTH_KEY_PATTERN.is_match(text) {
            return Err(Error::InvalidMonth(text.to_owned()));
        }

        Date::parse(text, format_description!("[year]-[month]-[day]"))
            .map(Self)
            .map_err(|_| Error::InvalidMonth(text.to_owned()))
    }

    /// The month that `date` falls in.
    pub fn of(date: Date) -> Self {
        Self(date.replace_day(1).expect("day 1 is valid for every month"))
    }

    /// The first day of the month.
    pub fn first_day(&self) -> Date {
        self.0
    }

    /// The last day of the month, i.e. the inclusive end of this month's date range.
    pub fn last_day(&self) -> Date {
        let (year, month) = (self.0.year(), self.0.month());

        self.0
            .replace_day(time::util::days_in_year_month(year, month))
            .unwrap_or(self.0)
    }

    /// The month formatted as `YYYY-MM`, as expected by the ML prediction endpoint.
    pub fn year_month(&self) -> String {
        format!("{:04}-{:02}", self.0.year(), self.0.month() as u8)
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-01", self.year_month())
    }
}

impl FromStr for MonthKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonthKey::parse(s)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        MonthKey::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl ToSql for MonthKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for MonthKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MonthKey::parse(text).map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}
