//! Service request/response envelopes exchanged over NATS

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::BatchResult;
use crate::engine::HealthReport;
use crate::error::{EngineError, FieldIssue};
use crate::types::prediction::{PatientPrediction, PatientRiskPrediction};

/// Incoming request, tagged by `op`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServiceRequest {
    /// All three risk types for one patient
    Predict { patient: Value },
    /// A single risk type for one patient
    PredictOne { risk_type: String, patient: Value },
    /// Up to 100 patients
    PredictBatch { patients: Vec<Value> },
    Health,
}

impl ServiceRequest {
    pub fn op(&self) -> &'static str {
        match self {
            ServiceRequest::Predict { .. } => "predict",
            ServiceRequest::PredictOne { .. } => "predict_one",
            ServiceRequest::PredictBatch { .. } => "predict_batch",
            ServiceRequest::Health => "health",
        }
    }
}

/// Successful response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Patient(PatientPrediction),
    Risk(PatientRiskPrediction),
    Batch(BatchResult),
    Health(HealthReport),
}

/// Error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable error tag, e.g. `validation`
    pub kind: String,
    pub message: String,
    /// Offending fields, for validation errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldIssue>,
}

impl ErrorReport {
    /// Report for a payload that is not a valid request
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self {
            kind: "malformed_request".to_string(),
            message: reason.to_string(),
            issues: Vec::new(),
        }
    }
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        let issues = match err {
            EngineError::Validation { issues } => issues.clone(),
            _ => Vec::new(),
        };
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            issues,
        }
    }
}

/// Outcome of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok { result: ResponseBody },
    Error { error: ErrorReport },
}

/// Reply published for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: ResponseStatus,
}

impl ServiceResponse {
    pub fn ok(result: ResponseBody) -> Self {
        Self::with_status(ResponseStatus::Ok { result })
    }

    pub fn error(error: ErrorReport) -> Self {
        Self::with_status(ResponseStatus::Error { error })
    }

    fn with_status(status: ResponseStatus) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, ResponseStatus::Ok { .. })
    }

    /// Error kind, if this is an error response
    pub fn error_kind(&self) -> Option<&str> {
        match &self.status {
            ResponseStatus::Error { error } => Some(&error.kind),
            ResponseStatus::Ok { .. } => None,
        }
    }
}
