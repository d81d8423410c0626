//! Savings predictions: builds the ML prediction payload from a month's stored
//! income and spending, or forwards a client-supplied one.

mod core;
mod endpoints;

pub use endpoints::{create_monthly_prediction, get_recommendations};
