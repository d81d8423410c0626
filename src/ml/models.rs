//! Request and response bodies of the external ML service.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// The features of one expense, as expected by the anomaly model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFeatures {
    /// The amount spent.
    pub amount: f64,
    /// The category code, e.g. `"FOOD"`.
    pub category_code: String,
    /// `1` for discretionary spending, `0` otherwise.
    pub is_discretionary: u8,
    /// The date in the `YYYY-MM-DD` format.
    pub transaction_date: String,
}

/// The anomaly model's verdict on one expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    /// Whether the expense looks unusual.
    pub suspicious: bool,
    /// The combined risk score.
    pub risk_score: f64,
    /// The raw score from the model.
    pub ml_score: f64,
    /// A human readable explanation of the verdict.
    pub reason: String,
}

/// One expense in a batch anomaly request, keyed by its ID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchAnomalyItem {
    /// The expense ID, as a string.
    pub id: String,
    /// The expense's features.
    #[serde(flatten)]
    pub features: AnomalyFeatures,
}

#[derive(Debug, Serialize)]
pub(super) struct BatchAnomalyRequest<'a> {
    pub(super) expenses: &'a [BatchAnomalyItem],
}

#[derive(Debug, Deserialize)]
pub(super) struct BatchAnomalyResponse {
    pub(super) results: Vec<BatchAnomalyResult>,
}

/// The verdict on one expense of a batch anomaly request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchAnomalyResult {
    /// The ID of the expense the verdict is for.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// The verdict.
    #[serde(flatten)]
    pub verdict: AnomalyVerdict,
}

/// The input to the savings prediction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// The month in the `YYYY-MM` format.
    pub month: String,
    /// The income for the month.
    pub income: f64,
    /// The total spent per category code.
    pub expenses: BTreeMap<String, f64>,
}

/// The ML service echoes IDs back as given, but tolerate numeric IDs too.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AnomalyFeatures, BatchAnomalyItem, BatchAnomalyResult};

    #[test]
    fn batch_item_flattens_features() {
        let item = BatchAnomalyItem {
            id: "7".to_owned(),
            features: AnomalyFeatures {
                amount: 12.5,
                category_code: "FOOD".to_owned(),
                is_discretionary: 1,
                transaction_date: "2026-01-05".to_owned(),
            },
        };

        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "id": "7",
                "amount": 12.5,
                "category_code": "FOOD",
                "is_discretionary": 1,
                "transaction_date": "2026-01-05"
            })
        );
    }

    #[test]
    fn batch_result_accepts_numeric_id() {
        let result: BatchAnomalyResult = serde_json::from_value(json!({
            "id": 7,
            "suspicious": true,
            "risk_score": 0.9,
            "ml_score": -0.2,
            "reason": "High amount"
        }))
        .unwrap();

        assert_eq!(result.id, "7");
        assert!(result.verdict.suspicious);
    }
}
