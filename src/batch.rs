//! Batch processing with per-patient failure isolation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::PredictionEngine;
use crate::error::{EngineError, EngineResult};
use crate::types::prediction::{LevelCounts, PatientPrediction, RiskLevel, RiskType};

/// Maximum number of patients accepted in one batch
pub const MAX_BATCH_SIZE: usize = 100;

/// What happened to one batch entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success { prediction: PatientPrediction },
    Failed { error: EngineError },
    /// Skipped because the batch deadline passed first
    NotAttempted,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success { .. })
    }

    pub fn prediction(&self) -> Option<&PatientPrediction> {
        match self {
            BatchOutcome::Success { prediction } => Some(prediction),
            _ => None,
        }
    }
}

/// One result tagged with the index of its input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// Aggregates over the successful entries of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total_patients: usize,
    pub successful: usize,
    pub failed: usize,
    pub not_attempted: usize,
    /// Patients per overall risk level
    pub overall_levels: LevelCounts,
    /// `overall_levels` as percentages of successful entries
    pub level_percentages: BTreeMap<RiskLevel, f64>,
    /// Patients requiring special attention
    pub urgent_cases: usize,
    /// `urgent_cases` as a percentage of successful entries
    pub urgent_percentage: f64,
    /// Patients with a `high` prediction, per risk type
    pub high_risk_by_type: BTreeMap<RiskType, usize>,
}

impl BatchStatistics {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let mut stats = Self {
            total_patients: entries.len(),
            successful: 0,
            failed: 0,
            not_attempted: 0,
            overall_levels: LevelCounts::default(),
            level_percentages: RiskLevel::ALL.iter().map(|l| (*l, 0.0)).collect(),
            urgent_cases: 0,
            urgent_percentage: 0.0,
            high_risk_by_type: RiskType::ALL.iter().map(|rt| (*rt, 0)).collect(),
        };

        for entry in entries {
            match &entry.outcome {
                BatchOutcome::Success { prediction } => {
                    stats.successful += 1;
                    stats
                        .overall_levels
                        .record(prediction.summary.overall_risk_level);
                    if prediction.summary.requires_special_attention {
                        stats.urgent_cases += 1;
                    }
                    for risk in &prediction.predictions {
                        if risk.risk_level == RiskLevel::High {
                            *stats.high_risk_by_type.entry(risk.risk_type).or_insert(0) += 1;
                        }
                    }
                }
                BatchOutcome::Failed { .. } => stats.failed += 1,
                BatchOutcome::NotAttempted => stats.not_attempted += 1,
            }
        }

        if stats.successful > 0 {
            let successful = stats.successful as f64;
            stats.urgent_percentage = stats.urgent_cases as f64 / successful * 100.0;
            for level in RiskLevel::ALL {
                stats.level_percentages.insert(
                    level,
                    stats.overall_levels.get(level) as f64 / successful * 100.0,
                );
            }
        }

        stats
    }
}

/// Ordered entries plus their statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
    pub statistics: BatchStatistics,
}

/// Validate and predict every input in order.
///
/// Oversized batches are rejected before any entry is touched. Once
/// `deadline` has passed no further entry is started; the rest are marked
/// not attempted.
pub fn process_batch(
    engine: &PredictionEngine,
    inputs: &[Value],
    deadline: Option<Instant>,
) -> EngineResult<BatchResult> {
    if inputs.len() > MAX_BATCH_SIZE {
        warn!(size = inputs.len(), max = MAX_BATCH_SIZE, "Batch rejected");
        return Err(EngineError::BatchTooLarge {
            size: inputs.len(),
            max: MAX_BATCH_SIZE,
        });
    }

    let mut entries = Vec::with_capacity(inputs.len());
    let mut expired = false;

    for (index, raw) in inputs.iter().enumerate() {
        if !expired && deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(index = index, total = inputs.len(), "Batch deadline exceeded");
            expired = true;
        }

        let outcome = if expired {
            BatchOutcome::NotAttempted
        } else {
            match engine.validate(raw).and_then(|f| engine.predict_all(&f)) {
                Ok(prediction) => BatchOutcome::Success { prediction },
                Err(error) => {
                    debug!(index = index, error = %error, "Batch entry failed");
                    BatchOutcome::Failed { error }
                }
            }
        };

        entries.push(BatchEntry { index, outcome });
    }

    let statistics = BatchStatistics::from_entries(&entries);

    info!(
        total = statistics.total_patients,
        successful = statistics.successful,
        failed = statistics.failed,
        not_attempted = statistics.not_attempted,
        urgent = statistics.urgent_cases,
        "Batch processed"
    );

    Ok(BatchResult {
        entries,
        statistics,
    })
}
