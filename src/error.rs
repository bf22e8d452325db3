//! Error taxonomy of the prediction engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::prediction::{RiskLevel, RiskType};

/// What is wrong with one raw input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum FieldProblem {
    Missing,
    WrongType { expected: String },
    OutOfRange { min: f64, max: f64, found: f64 },
}

/// One offending field of a rejected patient input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    #[serde(flatten)]
    pub problem: FieldProblem,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, problem: FieldProblem) -> Self {
        Self {
            field: field.into(),
            problem,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{}: missing", self.field),
            FieldProblem::WrongType { expected } => {
                write!(f, "{}: expected {}", self.field, expected)
            }
            FieldProblem::OutOfRange { min, max, found } => {
                write!(f, "{}: {} outside {}..={}", self.field, found, min, max)
            }
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the engine
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    /// Caller-caused: every offending field of one patient input
    #[error("invalid patient input: {}", join_issues(.issues))]
    Validation { issues: Vec<FieldIssue> },

    /// Fatal at startup: a risk type's artifact set is missing or corrupt
    #[error("failed to load model for {risk_type}: {reason}")]
    ModelLoad { risk_type: String, reason: String },

    /// Caller-caused: unrecognized risk-type identifier
    #[error("unknown risk type '{identifier}' (expected one of: sepsis, gestational_hypertension, postpartum_hemorrhage)")]
    UnknownRiskType { identifier: String },

    /// Internal consistency violation while scoring
    #[error("inference failed for {risk_type}: {reason}")]
    Inference { risk_type: RiskType, reason: String },

    /// Programming defect: the recommendation table lacks an entry
    #[error("no recommendation for ({risk_type}, {level})")]
    RecommendationMissing { risk_type: RiskType, level: RiskLevel },

    /// Caller-caused: batch exceeds the patient ceiling
    #[error("batch of {size} patients exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

impl EngineError {
    /// Stable snake_case tag, matching the serialized `kind`
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::ModelLoad { .. } => "model_load",
            EngineError::UnknownRiskType { .. } => "unknown_risk_type",
            EngineError::Inference { .. } => "inference",
            EngineError::RecommendationMissing { .. } => "recommendation_missing",
            EngineError::BatchTooLarge { .. } => "batch_too_large",
        }
    }

    /// Whether the failure was caused by the request rather than the server
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation { .. }
                | EngineError::UnknownRiskType { .. }
                | EngineError::BatchTooLarge { .. }
        )
    }

    pub(crate) fn model_load(risk_type: impl fmt::Display, reason: impl fmt::Display) -> Self {
        EngineError::ModelLoad {
            risk_type: risk_type.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
