//! Route handlers for reading and reconciling monthly summaries.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error, MonthKey,
    app_state::lock_connection,
    summary::core::{MonthlySummary, SummaryRange, get_summaries, get_summary, reconcile_summary},
};

/// The state needed to read or reconcile summaries.
#[derive(Debug, Clone)]
pub struct SummaryState {
    /// The database connection for managing summaries.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for SummaryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The query parameters for listing summaries, both in the `YYYY-MM-01` format.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryRangeQuery {
    /// The earliest month to include.
    pub from: Option<String>,
    /// The latest month to include.
    pub to: Option<String>,
}

impl SummaryRangeQuery {
    fn parse(&self) -> Result<SummaryRange, Error> {
        let parse_optional = |text: &Option<String>| {
            text.as_deref()
                .filter(|text| !text.is_empty())
                .map(MonthKey::parse)
                .transpose()
        };

        Ok(SummaryRange {
            from: parse_optional(&self.from)?,
            to: parse_optional(&self.to)?,
        })
    }
}

/// A route handler that lists the summaries between the optional `from` and
/// `to` months, ordered by month.
pub async fn get_monthly_summaries(
    State(state): State<SummaryState>,
    Query(query): Query<SummaryRangeQuery>,
) -> Result<Json<Vec<MonthlySummary>>, Error> {
    let range = query.parse()?;
    let connection = lock_connection(&state.db_connection)?;

    Ok(Json(get_summaries(range, &connection)?))
}

/// A route handler that returns the summary for a month, or `null` if nothing
/// has been recorded for that month.
pub async fn get_monthly_summary(
    State(state): State<SummaryState>,
    Path(month): Path<String>,
) -> Result<Json<Option<MonthlySummary>>, Error> {
    let month = MonthKey::parse(&month)?;
    let connection = lock_connection(&state.db_connection)?;

    Ok(Json(get_summary(month, &connection)?))
}

/// A route handler that rebuilds a month's summary from its raw expense and
/// income rows.
pub async fn reconcile_monthly_summary(
    State(state): State<SummaryState>,
    Path(month): Path<String>,
) -> Result<Json<MonthlySummary>, Error> {
    let month = MonthKey::parse(&month)?;
    let connection = lock_connection(&state.db_connection)?;

    let summary = reconcile_summary(month, &connection)?;
    tracing::info!(
        "Reconciled summary for {month}: income {}, expense {}",
        summary.total_income,
        summary.total_expense
    );

    Ok(Json(summary))
}
