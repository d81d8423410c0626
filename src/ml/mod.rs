//! The external ML service: anomaly detection and savings prediction.

mod client;
mod models;

pub use client::{MlClient, MlConfig};
pub use models::{
    AnomalyFeatures, AnomalyVerdict, BatchAnomalyItem, BatchAnomalyResult, PredictionRequest,
};
