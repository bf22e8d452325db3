//! Patient-level aggregation of the three per-risk predictions

use crate::types::prediction::{LevelCounts, PatientSummary, RiskLevel, RiskPrediction};

/// Build the summary for one patient.
///
/// `predictions` must be in presentation order (sepsis, gestational
/// hypertension, postpartum hemorrhage); equal probabilities resolve to the
/// earliest entry.
pub fn summarize(predictions: &[RiskPrediction; 3]) -> PatientSummary {
    let mut level_counts = LevelCounts::default();
    for prediction in predictions {
        level_counts.record(prediction.risk_level);
    }

    let overall_risk_level = predictions
        .iter()
        .map(|p| p.risk_level)
        .max()
        .unwrap_or(RiskLevel::VeryLow);

    let mut highest = &predictions[0];
    for prediction in &predictions[1..] {
        if prediction.probability > highest.probability {
            highest = prediction;
        }
    }

    PatientSummary {
        overall_risk_level,
        level_counts,
        requires_special_attention: overall_risk_level == RiskLevel::High,
        highest_risk_type: highest.risk_type,
        highest_probability: highest.probability,
    }
}
