//! Prediction orchestrator
//!
//! Owns a shared, read-only [`Registry`] and runs validation, scoring and
//! aggregation for single patients and batches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::batch::{self, BatchResult};
use crate::error::EngineResult;
use crate::feature_extractor::FeatureExtractor;
use crate::models::aggregator::summarize;
use crate::models::inference::RiskScorer;
use crate::models::registry::{ModelInfo, Registry};
use crate::types::patient::PatientFeatures;
use crate::types::prediction::{PatientPrediction, RiskPrediction, RiskType};

/// Load the registry from a models directory (one ONNX thread)
pub fn initialize<P: AsRef<Path>>(models_dir: P) -> EngineResult<Registry> {
    initialize_with_threads(models_dir, 1)
}

/// Load the registry with a specific number of ONNX threads
pub fn initialize_with_threads<P: AsRef<Path>>(
    models_dir: P,
    onnx_threads: usize,
) -> EngineResult<Registry> {
    Registry::load_with_threads(models_dir, onnx_threads)
}

/// Liveness report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub loaded_risk_types: BTreeSet<RiskType>,
    pub models: Vec<ModelInfo>,
}

/// Stateless prediction front end over a loaded registry.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct PredictionEngine {
    registry: Arc<Registry>,
    scorer: RiskScorer,
    extractor: FeatureExtractor,
}

impl PredictionEngine {
    pub fn new(registry: Arc<Registry>) -> EngineResult<Self> {
        let scorer = RiskScorer::standard()?;

        info!(
            risk_types = ?registry.loaded_risk_types(),
            "Prediction engine ready"
        );

        Ok(Self {
            registry,
            scorer,
            extractor: FeatureExtractor::new(),
        })
    }

    /// Validate raw patient input, reporting every offending field
    pub fn validate(&self, raw: &Value) -> EngineResult<PatientFeatures> {
        self.extractor.validate(raw)
    }

    /// Score every risk type in presentation order and summarize
    pub fn predict_all(&self, features: &PatientFeatures) -> EngineResult<PatientPrediction> {
        let predictions = [
            self.predict_risk(features, RiskType::ALL[0])?,
            self.predict_risk(features, RiskType::ALL[1])?,
            self.predict_risk(features, RiskType::ALL[2])?,
        ];
        let summary = summarize(&predictions);

        debug!(
            overall = %summary.overall_risk_level,
            highest = %summary.highest_risk_type,
            special_attention = summary.requires_special_attention,
            "Patient predicted"
        );

        Ok(PatientPrediction {
            patient: *features,
            predictions: predictions.into(),
            summary,
        })
    }

    /// Score one risk type given by its identifier
    pub fn predict_one(
        &self,
        features: &PatientFeatures,
        risk_type: &str,
    ) -> EngineResult<RiskPrediction> {
        let bundle = self.registry.bundle_for(risk_type)?;
        self.scorer.score(features, bundle)
    }

    /// Score one risk type
    pub fn predict_risk(
        &self,
        features: &PatientFeatures,
        risk_type: RiskType,
    ) -> EngineResult<RiskPrediction> {
        self.scorer.score(features, self.registry.bundle(risk_type))
    }

    /// Validate and predict up to [`batch::MAX_BATCH_SIZE`] raw inputs
    pub fn predict_batch(&self, inputs: &[Value]) -> EngineResult<BatchResult> {
        batch::process_batch(self, inputs, None)
    }

    /// Like [`predict_batch`](Self::predict_batch), but stops starting new
    /// entries once `deadline` has passed
    pub fn predict_batch_until(
        &self,
        inputs: &[Value],
        deadline: Option<Instant>,
    ) -> EngineResult<BatchResult> {
        batch::process_batch(self, inputs, deadline)
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            loaded_risk_types: self.registry.loaded_risk_types(),
            models: self.registry.bundles().iter().map(|b| b.info()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::registry::tests::registry;
    use crate::types::prediction::RiskLevel;
    use serde_json::json;

    fn engine() -> PredictionEngine {
        PredictionEngine::new(Arc::new(registry(3600.0, 7386.0, 1300.0))).unwrap()
    }

    fn features(engine: &PredictionEngine) -> PatientFeatures {
        engine
            .validate(&json!({
                "maternalAge": 35,
                "parity": 2,
                "prenatalVisits": 6,
                "gestationWeeks": 38.0,
                "priorHypertension": 1,
                "gestationalDiabetes": 0,
                "priorCesarean": 1,
                "multiplePregnancy": 0
            }))
            .unwrap()
    }

    #[test]
    fn test_predict_all_order_and_summary() {
        let engine = engine();
        let patient = features(&engine);
        let result = engine.predict_all(&patient).unwrap();
        assert_eq!(result.patient, patient);

        let order: Vec<RiskType> = result.predictions.iter().map(|p| p.risk_type).collect();
        assert_eq!(order, RiskType::ALL);

        let max_level = result
            .predictions
            .iter()
            .map(|p| p.risk_level)
            .max()
            .unwrap();
        assert_eq!(result.summary.overall_risk_level, max_level);
        assert_eq!(result.summary.overall_risk_level, RiskLevel::High);
        assert!(result.summary.requires_special_attention);
        assert_eq!(
            result.summary.highest_risk_type,
            RiskType::GestationalHypertension
        );
    }

    #[test]
    fn test_predict_one_matches_predict_all() {
        let engine = engine();
        let features = features(&engine);
        let all = engine.predict_all(&features).unwrap();

        for prediction in &all.predictions {
            let single = engine
                .predict_one(&features, prediction.risk_type.as_str())
                .unwrap();
            assert_eq!(&single, prediction);
        }
    }

    #[test]
    fn test_predict_one_unknown_risk_type() {
        let engine = engine();
        let err = engine
            .predict_one(&features(&engine), "preeclampsia")
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::UnknownRiskType {
                identifier: "preeclampsia".to_string()
            }
        );
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_health_lists_all_risk_types() {
        let health = engine().health();
        assert_eq!(
            health.loaded_risk_types,
            RiskType::ALL.into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(health.models.len(), 3);
    }

    #[test]
    fn test_validate_reports_every_field() {
        let err = engine()
            .validate(&json!({"maternalAge": 5, "parity": "two"}))
            .unwrap_err();
        match err {
            EngineError::Validation { issues } => assert_eq!(issues.len(), 8),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
