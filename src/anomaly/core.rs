//! Anomaly detection over stored expenses using the external ML service.

use std::{collections::HashMap, sync::Mutex};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    Error, MlClient, MonthKey,
    app_state::lock_connection,
    expense::{Expense, ExpenseId, get_expenses_by_month},
    ml::{AnomalyFeatures, AnomalyVerdict, BatchAnomalyItem, BatchAnomalyResult},
    summary::set_anomaly_count,
};

// ============================================================================
// MODELS
// ============================================================================

/// How a monthly scan asks the ML service about a month's expenses.
///
/// The two modes differ in how they handle ML failures:
/// - `Batch` sends every expense in one request. If the request fails the
///   scan reports zero anomalies and the failure is only logged.
/// - `PerRow` sends one request per expense. A failed request puts that
///   expense in the report's `failed` list and the scan continues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// One request for the whole month.
    #[default]
    Batch,
    /// One request per expense.
    PerRow,
}

/// An expense the ML service flagged, with the verdict merged in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalousExpense {
    /// The stored expense.
    #[serde(flatten)]
    pub expense: Expense,
    /// The ML service's verdict.
    #[serde(flatten)]
    pub verdict: AnomalyVerdict,
}

/// An expense that could not be checked during a per-row scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCheck {
    /// The ID of the expense.
    pub expense_id: ExpenseId,
    /// Why the check failed.
    pub error: String,
}

/// The result of scanning a month's expenses for anomalies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAnomalyReport {
    /// The month that was scanned.
    pub month: MonthKey,
    /// How the scan was performed.
    pub mode: ScanMode,
    /// The number of expenses in the month.
    pub total_expenses: usize,
    /// The number of expenses flagged as suspicious.
    pub anomaly_count: usize,
    /// The flagged expenses.
    pub anomalies: Vec<AnomalousExpense>,
    /// The expenses that could not be checked, only reported for per-row scans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<FailedCheck>>,
    /// Whether every expense received a verdict.
    #[serde(skip)]
    pub complete: bool,
}

/// Accepts `true`/`false` or `1`/`0` for the discretionary flag.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DiscretionaryFlag {
    /// A JSON boolean.
    Bool(bool),
    /// A JSON number, must be 0 or 1.
    Number(i64),
}

/// A single expense to check, as submitted by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnomalyCheckRequest {
    /// The amount spent.
    pub amount: f64,
    /// The category code.
    pub category_code: String,
    /// Whether the expense was optional spending.
    pub is_discretionary: DiscretionaryFlag,
    /// The date of the expense.
    pub transaction_date: String,
}

impl AnomalyCheckRequest {
    /// Check the request and normalize it into the features the ML service expects.
    ///
    /// # Errors
    /// Returns [Error::InvalidRequest] if the amount is not finite or the
    /// discretionary flag is a number other than 0 or 1.
    pub fn into_features(self) -> Result<AnomalyFeatures, Error> {
        if !self.amount.is_finite() {
            return Err(Error::InvalidRequest(
                "amount must be a finite number".to_owned(),
            ));
        }

        let is_discretionary = match self.is_discretionary {
            DiscretionaryFlag::Bool(flag) => u8::from(flag),
            DiscretionaryFlag::Number(number @ (0 | 1)) => number as u8,
            DiscretionaryFlag::Number(number) => {
                return Err(Error::InvalidRequest(format!(
                    "is_discretionary must be a boolean, 0 or 1, got {number}"
                )));
            }
        };

        Ok(AnomalyFeatures {
            amount: self.amount,
            category_code: self.category_code,
            is_discretionary,
            transaction_date: self.transaction_date,
        })
    }
}

impl From<&Expense> for AnomalyFeatures {
    fn from(expense: &Expense) -> Self {
        Self {
            amount: expense.amount,
            category_code: expense.category_code.code().to_owned(),
            is_discretionary: u8::from(expense.is_discretionary),
            transaction_date: expense.transaction_date.to_string(),
        }
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Check a single expense with the ML service.
///
/// # Errors
/// Returns [Error::InvalidRequest] for an invalid request, or one of the ML
/// errors if the ML service fails or times out.
pub async fn detect_anomaly(
    request: AnomalyCheckRequest,
    ml_client: &MlClient,
) -> Result<AnomalyVerdict, Error> {
    let features = request.into_features()?;

    ml_client.detect_anomaly(&features).await
}

/// Scan the expenses of `month` for anomalies.
///
/// If every expense received a verdict, the anomaly count is stored on the
/// month's summary. A scan with ML failures leaves the stored count as is.
///
/// # Errors
/// Returns [Error::SqlError] or [Error::DatabaseLockError] if the expenses
/// could not be read or the anomaly count could not be stored. ML failures
/// are reported in the returned report instead, according to `mode`.
pub async fn detect_monthly_anomalies(
    month: MonthKey,
    mode: ScanMode,
    db_connection: &Mutex<Connection>,
    ml_client: &MlClient,
) -> Result<MonthlyAnomalyReport, Error> {
    let expenses = load_expenses(month, db_connection)?;

    let report = match mode {
        ScanMode::Batch => scan_batch(month, expenses, ml_client).await,
        ScanMode::PerRow => scan_per_row(month, expenses, ml_client).await,
    };

    if report.complete {
        store_anomaly_count(month, report.anomaly_count, db_connection)?;
    }

    tracing::info!(
        "Scanned {} expenses for {month}: {} anomalies, complete: {}",
        report.total_expenses,
        report.anomaly_count,
        report.complete
    );

    Ok(report)
}

fn load_expenses(month: MonthKey, db_connection: &Mutex<Connection>) -> Result<Vec<Expense>, Error> {
    let connection = lock_connection(db_connection)?;
    get_expenses_by_month(month, &connection)
}

fn store_anomaly_count(
    month: MonthKey,
    anomaly_count: usize,
    db_connection: &Mutex<Connection>,
) -> Result<(), Error> {
    let connection = lock_connection(db_connection)?;
    let anomaly_count = u32::try_from(anomaly_count).unwrap_or(u32::MAX);

    if !set_anomaly_count(month, anomaly_count, &connection)? {
        tracing::debug!("No summary for {month}, anomaly count not stored");
    }

    Ok(())
}

async fn scan_batch(
    month: MonthKey,
    expenses: Vec<Expense>,
    ml_client: &MlClient,
) -> MonthlyAnomalyReport {
    let total_expenses = expenses.len();
    let mut complete = true;

    let results = if expenses.is_empty() {
        Vec::new()
    } else {
        let items: Vec<BatchAnomalyItem> = expenses
            .iter()
            .map(|expense| BatchAnomalyItem {
                id: expense.id.to_string(),
                features: expense.into(),
            })
            .collect();

        match ml_client.detect_anomalies_batch(&items).await {
            Ok(results) => results,
            Err(error) => {
                tracing::error!("ML batch failed for {month}, reporting no anomalies: {error}");
                complete = false;
                Vec::new()
            }
        }
    };

    let anomalies = merge_verdicts(expenses, results);

    MonthlyAnomalyReport {
        month,
        mode: ScanMode::Batch,
        total_expenses,
        anomaly_count: anomalies.len(),
        anomalies,
        failed: None,
        complete,
    }
}

async fn scan_per_row(
    month: MonthKey,
    expenses: Vec<Expense>,
    ml_client: &MlClient,
) -> MonthlyAnomalyReport {
    let total_expenses = expenses.len();
    let mut anomalies = Vec::new();
    let mut failed = Vec::new();

    for expense in expenses {
        match ml_client.detect_anomaly(&AnomalyFeatures::from(&expense)).await {
            Ok(verdict) if verdict.suspicious => {
                anomalies.push(AnomalousExpense { expense, verdict });
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!("ML check failed for expense {}: {error}", expense.id);
                failed.push(FailedCheck {
                    expense_id: expense.id,
                    error: error.to_string(),
                });
            }
        }
    }

    MonthlyAnomalyReport {
        month,
        mode: ScanMode::PerRow,
        total_expenses,
        anomaly_count: anomalies.len(),
        anomalies,
        complete: failed.is_empty(),
        failed: Some(failed),
    }
}

/// Attach the suspicious verdicts in `results` to their expenses by ID.
///
/// Expenses without a suspicious verdict are dropped, as are verdicts for IDs
/// that are not in `expenses`. The order of `expenses` is kept.
pub fn merge_verdicts(
    expenses: Vec<Expense>,
    results: Vec<BatchAnomalyResult>,
) -> Vec<AnomalousExpense> {
    let mut verdicts: HashMap<String, AnomalyVerdict> = HashMap::new();

    for result in results {
        if result.verdict.suspicious {
            verdicts.insert(result.id, result.verdict);
        }
    }

    let anomalies: Vec<AnomalousExpense> = expenses
        .into_iter()
        .filter_map(|expense| {
            verdicts
                .remove(&expense.id.to_string())
                .map(|verdict| AnomalousExpense { expense, verdict })
        })
        .collect();

    for id in verdicts.keys() {
        tracing::warn!("ML service flagged unknown expense ID {id}");
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axum::{Json, Router, http::StatusCode, routing::post};
    use rusqlite::Connection;
    use serde_json::{Value, json};
    use time::macros::date;

    use crate::{
        Category, Error, MonthKey,
        db::initialize,
        expense::{Expense, ExpenseSource, NewExpense, insert_expenses},
        ml::{AnomalyVerdict, BatchAnomalyResult},
        summary::{get_summary, set_anomaly_count},
        test_utils::{spawn_test_ml_service, test_ml_client},
    };

    use super::{
        AnomalyCheckRequest, DiscretionaryFlag, ScanMode, detect_monthly_anomalies,
        merge_verdicts,
    };

    fn get_test_connection() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        insert_expenses(
            vec![
                new_expense(50.0, "FOOD", "2026-01-03"),
                new_expense(5000.0, "SHOPPING", "2026-01-10"),
                new_expense(80.0, "TRANSPORT", "2026-01-20"),
                new_expense(9.0, "OTHER", "2026-02-01"),
            ],
            ExpenseSource::Manual,
            &conn,
        )
        .unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn new_expense(amount: f64, category: &str, transaction_date: &str) -> NewExpense {
        NewExpense {
            amount,
            description: format!("{category} expense"),
            category: category.to_owned(),
            transaction_date: transaction_date.to_owned(),
            is_discretionary: None,
        }
    }

    fn january() -> MonthKey {
        MonthKey::parse("2026-01-01").unwrap()
    }

    fn verdict(suspicious: bool) -> AnomalyVerdict {
        AnomalyVerdict {
            suspicious,
            risk_score: if suspicious { 0.9 } else { 0.1 },
            ml_score: 0.0,
            reason: "test".to_owned(),
        }
    }

    /// Flags every expense over 1000 in a batch request.
    fn batch_ml_service() -> Router {
        Router::new().route(
            "/anomaly-detect-batch",
            post(|Json(body): Json<Value>| async move {
                let results: Vec<Value> = body["expenses"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|expense| {
                        let suspicious = expense["amount"].as_f64().unwrap() > 1000.0;
                        let (risk_score, reason) = if suspicious {
                            (0.95, "Unusually large purchase")
                        } else {
                            (0.05, "Normal")
                        };
                        json!({
                            "id": expense["id"].clone(),
                            "suspicious": suspicious,
                            "risk_score": risk_score,
                            "ml_score": -0.3,
                            "reason": reason
                        })
                    })
                    .collect();
                Json(json!({ "results": results }))
            }),
        )
    }

    #[tokio::test]
    async fn batch_scan_merges_verdicts_onto_expenses() {
        let db = get_test_connection();
        let ml = test_ml_client(
            spawn_test_ml_service(batch_ml_service()).await,
            Duration::from_secs(5),
        );

        let report = detect_monthly_anomalies(january(), ScanMode::Batch, &db, &ml)
            .await
            .unwrap();

        assert_eq!(report.total_expenses, 3);
        assert_eq!(report.anomaly_count, 1);
        assert!(report.complete);
        assert_eq!(report.failed, None);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.expense.amount, 5000.0);
        assert_eq!(anomaly.expense.category_code, Category::Shopping);
        assert_eq!(anomaly.verdict.reason, "Unusually large purchase");

        let conn = db.lock().unwrap();
        let summary = get_summary(january(), &conn).unwrap().unwrap();
        assert_eq!(summary.anomaly_count, 1);
    }

    #[tokio::test]
    async fn batch_scan_timeout_reports_no_anomalies() {
        let db = get_test_connection();
        set_anomaly_count(january(), 4, &db.lock().unwrap()).unwrap();
        let app = Router::new().route(
            "/anomaly-detect-batch",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "results": [] }))
            }),
        );
        let ml = test_ml_client(
            spawn_test_ml_service(app).await,
            Duration::from_millis(100),
        );

        let report = detect_monthly_anomalies(january(), ScanMode::Batch, &db, &ml)
            .await
            .unwrap();

        assert_eq!(report.total_expenses, 3);
        assert_eq!(report.anomaly_count, 0);
        assert!(report.anomalies.is_empty());
        assert!(!report.complete);

        let conn = db.lock().unwrap();
        let summary = get_summary(january(), &conn).unwrap().unwrap();
        assert_eq!(summary.anomaly_count, 4, "degraded scan must not overwrite the count");
    }

    #[tokio::test]
    async fn per_row_scan_isolates_failures() {
        let db = get_test_connection();
        let app = Router::new().route(
            "/anomaly-detect",
            post(|Json(body): Json<Value>| async move {
                let amount = body["amount"].as_f64().unwrap();
                if amount < 60.0 {
                    return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "boom"})));
                }
                let suspicious = amount > 1000.0;
                (
                    StatusCode::OK,
                    Json(json!({
                        "suspicious": suspicious,
                        "risk_score": 0.5,
                        "ml_score": 0.1,
                        "reason": "checked"
                    })),
                )
            }),
        );
        let ml = test_ml_client(spawn_test_ml_service(app).await, Duration::from_secs(5));

        let report = detect_monthly_anomalies(january(), ScanMode::PerRow, &db, &ml)
            .await
            .unwrap();

        assert_eq!(report.total_expenses, 3);
        assert_eq!(report.anomaly_count, 1);
        assert_eq!(report.anomalies[0].expense.amount, 5000.0);
        let failed = report.failed.unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.contains("500"), "got {}", failed[0].error);
        assert!(!report.complete);
    }

    #[tokio::test]
    async fn per_row_scan_timeout_fails_every_row() {
        let db = get_test_connection();
        let app = Router::new().route(
            "/anomaly-detect",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let ml = test_ml_client(
            spawn_test_ml_service(app).await,
            Duration::from_millis(100),
        );

        let report = detect_monthly_anomalies(january(), ScanMode::PerRow, &db, &ml)
            .await
            .unwrap();

        assert_eq!(report.anomaly_count, 0);
        let failed = report.failed.unwrap();
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().all(|check| check.error == Error::MlTimeout.to_string()));
    }

    #[tokio::test]
    async fn empty_month_skips_ml_service() {
        let db = get_test_connection();
        // Nothing listens here, so any call would fail and mark the scan incomplete.
        let ml = test_ml_client("http://127.0.0.1:9".to_owned(), Duration::from_millis(100));

        let report = detect_monthly_anomalies(
            MonthKey::parse("2026-03-01").unwrap(),
            ScanMode::Batch,
            &db,
            &ml,
        )
        .await
        .unwrap();

        assert_eq!(report.total_expenses, 0);
        assert!(report.complete);
    }

    #[test]
    fn merge_ignores_unknown_and_unsuspicious_results() {
        let expense = |id, amount| Expense {
            id,
            amount,
            description: "x".to_owned(),
            category_code: Category::Other,
            is_discretionary: false,
            transaction_date: date!(2026 - 01 - 01),
            source: ExpenseSource::Manual,
        };
        let results = vec![
            BatchAnomalyResult {
                id: "1".to_owned(),
                verdict: verdict(false),
            },
            BatchAnomalyResult {
                id: "2".to_owned(),
                verdict: verdict(true),
            },
            BatchAnomalyResult {
                id: "99".to_owned(),
                verdict: verdict(true),
            },
        ];

        let anomalies = merge_verdicts(vec![expense(1, 10.0), expense(2, 20.0)], results);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].expense.id, 2);
        assert!(anomalies[0].verdict.suspicious);
    }

    #[test]
    fn anomaly_report_serializes_flat_expenses() {
        let report = super::MonthlyAnomalyReport {
            month: january(),
            mode: ScanMode::Batch,
            total_expenses: 1,
            anomaly_count: 1,
            anomalies: merge_verdicts(
                vec![Expense {
                    id: 3,
                    amount: 5000.0,
                    description: "TV".to_owned(),
                    category_code: Category::Shopping,
                    is_discretionary: true,
                    transaction_date: date!(2026 - 01 - 10),
                    source: ExpenseSource::Manual,
                }],
                vec![BatchAnomalyResult {
                    id: "3".to_owned(),
                    verdict: verdict(true),
                }],
            ),
            failed: None,
            complete: true,
        };

        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["month"], "2026-01-01");
        assert_eq!(value["mode"], "batch");
        assert_eq!(value["anomalies"][0]["id"], 3);
        assert_eq!(value["anomalies"][0]["transaction_date"], "2026-01-10");
        assert_eq!(value["anomalies"][0]["suspicious"], true);
        assert!(value.get("failed").is_none());
        assert!(value.get("complete").is_none());
    }

    #[test]
    fn check_request_normalizes_discretionary_flag() {
        let request = |flag| AnomalyCheckRequest {
            amount: 10.0,
            category_code: "FOOD".to_owned(),
            is_discretionary: flag,
            transaction_date: "2026-01-01".to_owned(),
        };

        assert_eq!(
            request(DiscretionaryFlag::Bool(true))
                .into_features()
                .unwrap()
                .is_discretionary,
            1
        );
        assert_eq!(
            request(DiscretionaryFlag::Number(0))
                .into_features()
                .unwrap()
                .is_discretionary,
            0
        );
        assert!(matches!(
            request(DiscretionaryFlag::Number(2)).into_features(),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn check_request_accepts_bool_or_number_json() {
        let from_bool: AnomalyCheckRequest = serde_json::from_value(json!({
            "amount": 10, "category_code": "FOOD", "is_discretionary": true, "transaction_date": "2026-01-01"
        }))
        .unwrap();
        let from_number: AnomalyCheckRequest = serde_json::from_value(json!({
            "amount": 10, "category_code": "FOOD", "is_discretionary": 1, "transaction_date": "2026-01-01"
        }))
        .unwrap();

        assert_eq!(from_bool.is_discretionary, DiscretionaryFlag::Bool(true));
        assert_eq!(from_number.is_discretionary, DiscretionaryFlag::Number(1));
    }
}
