//! Risk scorer: one feature vector against one model bundle

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::recommendations::RecommendationTable;
use crate::models::registry::ModelBundle;
use crate::types::patient::PatientFeatures;
use crate::types::prediction::{ConfidenceLevel, RiskLevel, RiskPrediction};

/// Turns a bundle's raw probability into a categorized prediction.
///
/// Scoring is pure: no I/O, no shared mutable state, and identical inputs
/// give bit-identical outputs.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    recommendations: RecommendationTable,
}

impl RiskScorer {
    pub fn new(recommendations: RecommendationTable) -> Self {
        Self { recommendations }
    }

    /// Scorer backed by the shipped recommendation texts
    pub fn standard() -> EngineResult<Self> {
        Ok(Self::new(RecommendationTable::standard()?))
    }

    pub fn recommendations(&self) -> &RecommendationTable {
        &self.recommendations
    }

    /// Score one patient against one bundle
    pub fn score(
        &self,
        features: &PatientFeatures,
        bundle: &ModelBundle,
    ) -> EngineResult<RiskPrediction> {
        let risk_type = bundle.risk_type();
        let scaled = bundle.scaler().transform(&features.to_vector());

        let probability = bundle
            .classifier()
            .positive_probability(&scaled)
            .map_err(|e| EngineError::Inference {
                risk_type,
                reason: format!("{:#}", e),
            })?;

        // Out-of-range output means a broken artifact; never clamp it.
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(EngineError::Inference {
                risk_type,
                reason: format!("classifier returned probability {} outside [0, 1]", probability),
            });
        }

        let risk_level = RiskLevel::from_probability(probability);
        let confidence_level = ConfidenceLevel::from_probability(probability);
        let recommendation = self.recommendations.lookup(risk_type, risk_level).to_string();

        debug!(
            risk_type = %risk_type,
            probability = probability,
            risk_level = %risk_level,
            confidence = %confidence_level,
            backend = bundle.backend_name(),
            "Risk scored"
        );

        Ok(RiskPrediction {
            risk_type,
            probability,
            risk_level,
            confidence_level,
            recommendation,
        })
    }
}
