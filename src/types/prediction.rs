//! Risk prediction data structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::types::patient::PatientFeatures;

/// The three obstetric outcomes scored by the engine.
///
/// Declaration order is the fixed presentation order used by the
/// orchestrator and as the tie-break for the highest-probability entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    Sepsis,
    GestationalHypertension,
    PostpartumHemorrhage,
}

impl RiskType {
    /// All risk types in presentation order
    pub const ALL: [RiskType; 3] = [
        RiskType::Sepsis,
        RiskType::GestationalHypertension,
        RiskType::PostpartumHemorrhage,
    ];

    /// Wire identifier, also the artifact file stem
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::Sepsis => "sepsis",
            RiskType::GestationalHypertension => "gestational_hypertension",
            RiskType::PostpartumHemorrhage => "postpartum_hemorrhage",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            RiskType::Sepsis => 0,
            RiskType::GestationalHypertension => 1,
            RiskType::PostpartumHemorrhage => 2,
        }
    }
}

impl fmt::Display for RiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskType::ALL
            .into_iter()
            .find(|rt| rt.as_str() == s)
            .ok_or_else(|| EngineError::UnknownRiskType {
                identifier: s.to_string(),
            })
    }
}

/// Four-tier risk classification, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Moderate,
    High,
}

/// Lower bounds of the risk tiers, highest first. Anything below the last
/// bound is `VeryLow`. Shared by every risk type.
pub const RISK_TIERS: [(f64, RiskLevel); 3] = [
    (0.70, RiskLevel::High),
    (0.50, RiskLevel::Moderate),
    (0.30, RiskLevel::Low),
];

impl RiskLevel {
    /// All levels, lowest first
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::VeryLow,
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
    ];

    /// Determine risk level from a probability; a value on a boundary
    /// belongs to the higher tier.
    pub fn from_probability(probability: f64) -> Self {
        RISK_TIERS
            .iter()
            .find(|(lower, _)| probability >= *lower)
            .map(|(_, level)| *level)
            .unwrap_or(RiskLevel::VeryLow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::VeryLow => "very_low",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            RiskLevel::VeryLow => 0,
            RiskLevel::Low => 1,
            RiskLevel::Moderate => 2,
            RiskLevel::High => 3,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-tier confidence classification, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// Confidence tiers, highest first. A probability qualifies for a tier when
/// it is at least the bound or at most `1 - bound`, i.e. when it sits that
/// far from the 0.5 midpoint in either direction.
pub const CONFIDENCE_TIERS: [(f64, ConfidenceLevel); 2] = [
    (0.80, ConfidenceLevel::High),
    (0.60, ConfidenceLevel::Medium),
];

impl ConfidenceLevel {
    /// Determine confidence from how extreme a probability is
    pub fn from_probability(probability: f64) -> Self {
        CONFIDENCE_TIERS
            .iter()
            .find(|(bound, _)| probability >= *bound || probability <= 1.0 - *bound)
            .map(|(_, level)| *level)
            .unwrap_or(ConfidenceLevel::Low)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one patient against one model bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPrediction {
    /// Scored outcome
    pub risk_type: RiskType,

    /// Probability of the elevated-risk class (0.0 - 1.0)
    pub probability: f64,

    /// Risk tier derived from the probability
    pub risk_level: RiskLevel,

    /// Confidence tier derived from the probability
    pub confidence_level: ConfidenceLevel,

    /// Clinical guidance for (risk type, risk level)
    pub recommendation: String,
}

/// Number of predictions (or patients) at each risk level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCounts {
    pub very_low: usize,
    pub low: usize,
    pub moderate: usize,
    pub high: usize,
}

impl LevelCounts {
    pub fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::VeryLow => self.very_low += 1,
            RiskLevel::Low => self.low += 1,
            RiskLevel::Moderate => self.moderate += 1,
            RiskLevel::High => self.high += 1,
        }
    }

    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::VeryLow => self.very_low,
            RiskLevel::Low => self.low,
            RiskLevel::Moderate => self.moderate,
            RiskLevel::High => self.high,
        }
    }

    pub fn total(&self) -> usize {
        self.very_low + self.low + self.moderate + self.high
    }
}

/// Patient-level roll-up of the three per-risk predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    /// Maximum risk level among the predictions
    pub overall_risk_level: RiskLevel,
    /// Predictions at each level
    pub level_counts: LevelCounts,
    /// True iff the overall level is `high`
    pub requires_special_attention: bool,
    /// Risk type with the highest probability
    pub highest_risk_type: RiskType,
    /// That highest probability
    pub highest_probability: f64,
}

/// Full result for one patient: the validated input, the three predictions
/// in presentation order and their summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientPrediction {
    pub patient: PatientFeatures,
    pub predictions: Vec<RiskPrediction>,
    pub summary: PatientSummary,
}

/// Single-risk result echoed together with the validated input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRiskPrediction {
    pub patient: PatientFeatures,
    #[serde(flatten)]
    pub prediction: RiskPrediction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_from_probability() {
        assert_eq!(RiskLevel::from_probability(0.1), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_probability(0.35), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.55), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.95), RiskLevel::High);
    }

    #[test]
    fn test_risk_level_boundaries_go_to_higher_tier() {
        assert_eq!(RiskLevel::from_probability(0.70), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.6999999), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.50), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.4999999), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.30), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.2999999), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_probability(0.0), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_probability(1.0), RiskLevel::High);
    }

    #[test]
    fn test_confidence_boundaries() {
        assert_eq!(ConfidenceLevel::from_probability(0.80), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_probability(0.7999999), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_probability(0.60), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_probability(0.5999999), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_probability(0.5), ConfidenceLevel::Low);
    }

    #[test]
    fn test_confidence_is_symmetric_around_midpoint() {
        assert_eq!(ConfidenceLevel::from_probability(0.05), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_probability(0.3), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_probability(0.45), ConfidenceLevel::Low);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(RiskLevel::VeryLow < RiskLevel::Low);
        assert!(RiskLevel::Moderate < RiskLevel::High);
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert_eq!(RiskLevel::ALL.iter().max(), Some(&RiskLevel::High));
    }

    #[test]
    fn test_risk_type_parsing() {
        assert_eq!(
            "gestational_hypertension".parse::<RiskType>().unwrap(),
            RiskType::GestationalHypertension
        );
        let err = "preeclampsia".parse::<RiskType>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownRiskType { .. }));
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&RiskLevel::VeryLow).unwrap();
        assert_eq!(json, "\"very_low\"");
        let json = serde_json::to_string(&RiskType::PostpartumHemorrhage).unwrap();
        assert_eq!(json, "\"postpartum_hemorrhage\"");
    }

    #[test]
    fn test_level_counts() {
        let mut counts = LevelCounts::default();
        counts.record(RiskLevel::High);
        counts.record(RiskLevel::High);
        counts.record(RiskLevel::Low);
        assert_eq!(counts.get(RiskLevel::High), 2);
        assert_eq!(counts.get(RiskLevel::Moderate), 0);
        assert_eq!(counts.total(), 3);
    }
}
