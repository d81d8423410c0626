//! Recording income for a month.

mod core;
mod endpoint;

pub use self::core::create_income_table;
pub use endpoint::create_income;
