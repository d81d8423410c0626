//! The HTTP client for the external ML service.

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    Error,
    ml::models::{
        AnomalyFeatures, AnomalyVerdict, BatchAnomalyItem, BatchAnomalyRequest,
        BatchAnomalyResponse, BatchAnomalyResult, PredictionRequest,
    },
};

const ANOMALY_PATH: &str = "/anomaly-detect";
const BATCH_ANOMALY_PATH: &str = "/anomaly-detect-batch";
const PREDICT_PATH: &str = "/predict";

/// Where to find the ML service and how long to wait for it.
#[derive(Debug, Clone)]
pub struct MlConfig {
    /// The base URL, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Sent in the `x-api-key` header when set.
    pub api_key: Option<String>,
    /// How long to wait for a response before failing with [Error::MlTimeout].
    pub timeout: Duration,
}

/// A client for the ML service's anomaly detection and prediction endpoints.
///
/// Calls are never retried. Every failure is reported as one of
/// [Error::MlTimeout], [Error::MlUnavailable], [Error::MlStatus] or
/// [Error::MlInvalidResponse].
#[derive(Debug, Clone)]
pub struct MlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MlClient {
    /// Create a client from `config`.
    ///
    /// # Errors
    /// Returns [Error::MlUnavailable] if the HTTP client could not be built.
    pub fn new(config: MlConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| Error::MlUnavailable(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key,
        })
    }

    /// Ask the anomaly model whether a single expense looks unusual.
    pub async fn detect_anomaly(&self, features: &AnomalyFeatures) -> Result<AnomalyVerdict, Error> {
        self.post_json(ANOMALY_PATH, features).await
    }

    /// Ask the anomaly model for a verdict on each expense in `items`.
    pub async fn detect_anomalies_batch(
        &self,
        items: &[BatchAnomalyItem],
    ) -> Result<Vec<BatchAnomalyResult>, Error> {
        let response: BatchAnomalyResponse = self
            .post_json(BATCH_ANOMALY_PATH, &BatchAnomalyRequest { expenses: items })
            .await?;

        Ok(response.results)
    }

    /// Ask the prediction model for savings predictions and advice.
    ///
    /// The response is passed through as-is.
    pub async fn predict(&self, request: &PredictionRequest) -> Result<Value, Error> {
        self.post_json(PREDICT_PATH, request).await
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!("Calling ML service at {url}");

        let mut request = self.http.post(&url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await.map_err(|error| {
            tracing::warn!("ML request to {url} failed: {error}");
            classify_error(error)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("ML service at {url} responded with {status}: {body}");
            return Err(Error::MlStatus {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<R>().await.map_err(|error| {
            tracing::warn!("Could not decode ML response from {url}: {error}");
            if error.is_timeout() {
                Error::MlTimeout
            } else {
                Error::MlInvalidResponse(error.to_string())
            }
        })
    }
}

fn classify_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::MlTimeout
    } else {
        Error::MlUnavailable(error.to_string())
    }
}
