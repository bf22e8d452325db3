//! Model artifact loader
//!
//! For every risk type `<rt>` the models directory holds:
//!
//! - `<rt>.metadata.json`: risk type, algorithm, version, decision threshold,
//!   feature order and model format
//! - `<rt>.scaler.json`: fitted scaler parameters
//! - `<rt>.model.json` (tree ensembles) or `<rt>.onnx` (ONNX models)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::{EngineError, EngineResult};
use crate::models::classifier::{Classifier, TreeEnsemble};
use crate::models::registry::ModelBundle;
use crate::models::scaler::StandardScaler;
use crate::types::prediction::RiskType;

/// Serialized classifier format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// JSON export of one or more fitted decision trees
    #[default]
    TreeEnsemble,
    /// ONNX graph, requires the `onnx` feature
    Onnx,
}

impl ModelFormat {
    fn file_suffix(&self) -> &'static str {
        match self {
            ModelFormat::TreeEnsemble => "model.json",
            ModelFormat::Onnx => "onnx",
        }
    }
}

/// Metadata record written by the training process next to each model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub risk_type: String,
    pub algorithm_name: String,
    pub version: String,
    /// Cutoff used during training-time evaluation. Informational only.
    pub decision_threshold: f64,
    pub feature_order: Vec<String>,
    #[serde(default)]
    pub model_format: ModelFormat,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
}

/// Loader for the artifact sets of all risk types
pub struct ModelLoader {
    models_dir: PathBuf,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a loader for a models directory (1 ONNX thread)
    pub fn new<P: AsRef<Path>>(models_dir: P) -> Self {
        Self::with_threads(models_dir, 1)
    }

    /// Create a loader with a specific number of ONNX threads
    pub fn with_threads<P: AsRef<Path>>(models_dir: P, onnx_threads: usize) -> Self {
        Self {
            models_dir: models_dir.as_ref().to_path_buf(),
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Path of one artifact of a risk type
    pub fn artifact_path(&self, risk_type: RiskType, suffix: &str) -> PathBuf {
        self.models_dir
            .join(format!("{}.{}", risk_type.as_str(), suffix))
    }

    /// Load the bundle of a single risk type
    pub fn load_bundle(&self, risk_type: RiskType) -> EngineResult<ModelBundle> {
        let metadata: ModelMetadata = self.read_json(risk_type, "metadata.json")?;
        let scaler: StandardScaler = self.read_json(risk_type, "scaler.json")?;

        let classifier = self.load_classifier(risk_type, metadata.model_format)?;

        let bundle = ModelBundle::new(risk_type, metadata, scaler, classifier)?;

        info!(
            risk_type = %risk_type,
            algorithm = %bundle.metadata().algorithm_name,
            version = %bundle.metadata().version,
            decision_threshold = bundle.metadata().decision_threshold,
            backend = bundle.backend_name(),
            "Model bundle loaded"
        );

        Ok(bundle)
    }

    /// Load the bundles of every risk type; the first failure aborts.
    pub fn load_all(&self) -> EngineResult<Vec<ModelBundle>> {
        if !self.models_dir.is_dir() {
            let err = EngineError::model_load(
                "all",
                format!("models directory {} does not exist", self.models_dir.display()),
            );
            error!(error = %err, "Model directory check failed");
            return Err(err);
        }

        let mut bundles = Vec::with_capacity(RiskType::ALL.len());
        for risk_type in RiskType::ALL {
            match self.load_bundle(risk_type) {
                Ok(bundle) => bundles.push(bundle),
                Err(e) => {
                    error!(risk_type = %risk_type, error = %e, "Failed to load model bundle");
                    return Err(e);
                }
            }
        }

        info!(
            count = bundles.len(),
            "Loaded {} model bundles from {}",
            bundles.len(),
            self.models_dir.display()
        );

        Ok(bundles)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        risk_type: RiskType,
        suffix: &str,
    ) -> EngineResult<T> {
        let path = self.artifact_path(risk_type, suffix);
        let text = fs::read_to_string(&path).map_err(|e| {
            EngineError::model_load(risk_type, format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            EngineError::model_load(risk_type, format!("corrupt {}: {}", path.display(), e))
        })
    }

    fn load_classifier(
        &self,
        risk_type: RiskType,
        format: ModelFormat,
    ) -> EngineResult<Box<dyn Classifier>> {
        let path = self.artifact_path(risk_type, format.file_suffix());

        match format {
            ModelFormat::TreeEnsemble => {
                let text = fs::read_to_string(&path).map_err(|e| {
                    EngineError::model_load(
                        risk_type,
                        format!("cannot read {}: {}", path.display(), e),
                    )
                })?;
                let ensemble = TreeEnsemble::from_json(&text).map_err(|e| {
                    EngineError::model_load(risk_type, format!("{}: {:#}", path.display(), e))
                })?;
                Ok(Box::new(ensemble))
            }
            ModelFormat::Onnx => self.load_onnx(risk_type, &path),
        }
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, risk_type: RiskType, path: &Path) -> EngineResult<Box<dyn Classifier>> {
        if !path.exists() {
            return Err(EngineError::model_load(
                risk_type,
                format!("model file {} not found", path.display()),
            ));
        }
        let classifier =
            crate::models::onnx::OnnxClassifier::load(path, risk_type.as_str(), self.onnx_threads)
                .map_err(|e| EngineError::model_load(risk_type, format!("{:#}", e)))?;
        Ok(Box::new(classifier))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, risk_type: RiskType, path: &Path) -> EngineResult<Box<dyn Classifier>> {
        Err(EngineError::model_load(
            risk_type,
            format!(
                "{} is an ONNX model but this build lacks the `onnx` feature (onnx_threads={})",
                path.display(),
                self.onnx_threads
            ),
        ))
    }
}
