//! Process-wide, read-only store of the three model bundles

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

use crate::error::{EngineError, EngineResult};
use crate::models::classifier::Classifier;
use crate::models::loader::{ModelLoader, ModelMetadata};
use crate::models::scaler::StandardScaler;
use crate::types::patient::FEATURE_ORDER;
use crate::types::prediction::RiskType;

/// Classifier, scaler and metadata of one risk type. Immutable once built.
pub struct ModelBundle {
    risk_type: RiskType,
    metadata: ModelMetadata,
    scaler: StandardScaler,
    classifier: Box<dyn Classifier>,
}

impl ModelBundle {
    /// Assemble a bundle, refusing artifacts that disagree with the engine:
    /// a different risk type, feature order, or an invalid threshold/scaler.
    pub fn new(
        risk_type: RiskType,
        metadata: ModelMetadata,
        scaler: StandardScaler,
        classifier: Box<dyn Classifier>,
    ) -> EngineResult<Self> {
        if metadata.risk_type != risk_type.as_str() {
            return Err(EngineError::model_load(
                risk_type,
                format!("metadata declares risk type '{}'", metadata.risk_type),
            ));
        }
        if metadata.feature_order != FEATURE_ORDER {
            return Err(EngineError::model_load(
                risk_type,
                format!(
                    "feature order {:?} does not match {:?}",
                    metadata.feature_order, FEATURE_ORDER
                ),
            ));
        }
        if !(0.0..=1.0).contains(&metadata.decision_threshold) {
            return Err(EngineError::model_load(
                risk_type,
                format!(
                    "decision threshold {} is outside [0, 1]",
                    metadata.decision_threshold
                ),
            ));
        }
        scaler
            .check()
            .map_err(|e| EngineError::model_load(risk_type, format!("{:#}", e)))?;

        Ok(Self {
            risk_type,
            metadata,
            scaler,
            classifier,
        })
    }

    pub fn risk_type(&self) -> RiskType {
        self.risk_type
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn backend_name(&self) -> &str {
        self.classifier.backend_name()
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            risk_type: self.risk_type,
            algorithm_name: self.metadata.algorithm_name.clone(),
            version: self.metadata.version.clone(),
            decision_threshold: self.metadata.decision_threshold,
        }
    }
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("risk_type", &self.risk_type)
            .field("metadata", &self.metadata)
            .field("backend", &self.classifier.backend_name())
            .finish()
    }
}

/// Public description of a loaded bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub risk_type: RiskType,
    pub algorithm_name: String,
    pub version: String,
    pub decision_threshold: f64,
}

/// Exactly one bundle per risk type
#[derive(Debug)]
pub struct Registry {
    sepsis: ModelBundle,
    gestational_hypertension: ModelBundle,
    postpartum_hemorrhage: ModelBundle,
}

impl Registry {
    /// Load all artifact sets from a directory (1 ONNX thread)
    pub fn load<P: AsRef<Path>>(models_dir: P) -> EngineResult<Self> {
        Self::load_with_threads(models_dir, 1)
    }

    /// Load all artifact sets with a specific ONNX thread count
    pub fn load_with_threads<P: AsRef<Path>>(
        models_dir: P,
        onnx_threads: usize,
    ) -> EngineResult<Self> {
        let loader = ModelLoader::with_threads(models_dir, onnx_threads);
        Self::from_bundles(loader.load_all()?)
    }

    /// Build from already loaded bundles; each risk type must appear once.
    pub fn from_bundles(bundles: Vec<ModelBundle>) -> EngineResult<Self> {
        let mut slots: [Option<ModelBundle>; 3] = [None, None, None];

        for bundle in bundles {
            let risk_type = bundle.risk_type();
            let slot = &mut slots[risk_type.index()];
            if slot.is_some() {
                return Err(EngineError::model_load(risk_type, "duplicate bundle"));
            }
            *slot = Some(bundle);
        }

        let [sepsis, gestational_hypertension, postpartum_hemorrhage] = slots;
        let missing = |risk_type: RiskType| EngineError::model_load(risk_type, "bundle missing");

        Ok(Self {
            sepsis: sepsis.ok_or_else(|| missing(RiskType::Sepsis))?,
            gestational_hypertension: gestational_hypertension
                .ok_or_else(|| missing(RiskType::GestationalHypertension))?,
            postpartum_hemorrhage: postpartum_hemorrhage
                .ok_or_else(|| missing(RiskType::PostpartumHemorrhage))?,
        })
    }

    pub fn bundle(&self, risk_type: RiskType) -> &ModelBundle {
        match risk_type {
            RiskType::Sepsis => &self.sepsis,
            RiskType::GestationalHypertension => &self.gestational_hypertension,
            RiskType::PostpartumHemorrhage => &self.postpartum_hemorrhage,
        }
    }

    /// Look a bundle up by its wire identifier
    pub fn bundle_for(&self, identifier: &str) -> EngineResult<&ModelBundle> {
        let risk_type: RiskType = identifier.parse()?;
        Ok(self.bundle(risk_type))
    }

    /// Bundles in presentation order
    pub fn bundles(&self) -> [&ModelBundle; 3] {
        RiskType::ALL.map(|rt| self.bundle(rt))
    }

    pub fn loaded_risk_types(&self) -> BTreeSet<RiskType> {
        self.bundles().iter().map(|b| b.risk_type()).collect()
    }
}

/// One-time initialization barrier for the registry.
///
/// The first caller performs the load; concurrent callers block until it
/// finishes and all callers observe the same outcome. A failed load is
/// remembered and never retried.
#[derive(Default)]
pub struct RegistryCell {
    slot: OnceLock<EngineResult<Arc<Registry>>>,
}

impl RegistryCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `models_dir` on first use
    pub fn get_or_load<P: AsRef<Path>>(
        &self,
        models_dir: P,
        onnx_threads: usize,
    ) -> EngineResult<Arc<Registry>> {
        self.get_or_init_with(|| Registry::load_with_threads(models_dir, onnx_threads))
    }

    /// Run `init` on first use
    pub fn get_or_init_with<F>(&self, init: F) -> EngineResult<Arc<Registry>>
    where
        F: FnOnce() -> EngineResult<Registry>,
    {
        self.slot
            .get_or_init(|| match init() {
                Ok(registry) => {
                    info!(
                        risk_types = ?registry.loaded_risk_types(),
                        "Model registry initialized"
                    );
                    Ok(Arc::new(registry))
                }
                Err(e) => {
                    error!(error = %e, "Model registry initialization failed");
                    Err(e)
                }
            })
            .clone()
    }

    /// Outcome of the initialization, if it has run
    pub fn get(&self) -> Option<EngineResult<Arc<Registry>>> {
        self.slot.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.slot.get(), Some(Ok(_)))
    }
}
