//! ONNX Runtime classifier backend

use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::path::Path;
use std::sync::{Mutex, Once};
use tracing::{debug, info};

use crate::models::classifier::Classifier;
use crate::types::patient::FEATURE_COUNT;

static ORT_INIT: Once = Once::new();

/// Exported classifier (e.g. skl2onnx DecisionTreeClassifier) run through
/// ONNX Runtime.
///
/// `Session::run` takes `&mut self`, so the session sits behind a mutex and
/// scoring against one ONNX bundle is serialized. The JSON tree backend has
/// no such lock; prefer it where concurrent scoring throughput matters.
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Load an ONNX model from file
    pub fn load<P: AsRef<Path>>(path: P, name: &str, onnx_threads: usize) -> Result<Self> {
        let path = path.as_ref();

        ORT_INIT.call_once(|| {
            if let Err(e) = ort::init().commit() {
                tracing::warn!(error = %e, "ONNX Runtime environment setup failed");
            }
        });

        info!(model = %name, path = %path.display(), threads = onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "ONNX model loaded"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// Positive-class probability from a tensor or seq(map) output
    fn extract_probability(&self, outputs: &ort::session::SessionOutputs) -> Result<f64> {
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow::anyhow!("output '{}' missing", self.output_name))?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let classes = dims.last().copied().unwrap_or(0);
            return match (classes, data) {
                (c, [_, p1, ..]) if c >= 2 => Ok(f64::from(*p1)),
                (1, [p]) => Ok(f64::from(*p)),
                _ => Err(anyhow::anyhow!("unexpected probability tensor shape {:?}", dims)),
            };
        }

        // skl2onnx emits seq(map(int64, float)) unless zipmap is disabled
        if DynSequenceValueType::can_downcast(&output.dtype()) {
            let allocator = Allocator::default();
            let sequence = output
                .downcast_ref::<DynSequenceValueType>()
                .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;
            let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
            let first = maps
                .first()
                .ok_or_else(|| anyhow::anyhow!("Empty probability sequence"))?;
            let pairs = first.try_extract_key_values::<i64, f32>()?;
            if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 1) {
                debug!(model = %self.name, prob = *p, "Extracted from seq(map)");
                return Ok(f64::from(*p));
            }
            return Err(anyhow::anyhow!("no class 1 entry in probability map"));
        }

        Err(anyhow::anyhow!(
            "output '{}' is neither a tensor nor a sequence of maps",
            self.output_name
        ))
    }
}

impl Classifier for OnnxClassifier {
    fn positive_probability(&self, scaled: &[f64; FEATURE_COUNT]) -> Result<f64> {
        use ort::value::Tensor;

        let input: Vec<f32> = scaled.iter().map(|&v| v as f32).collect();
        let shape = vec![1_i64, FEATURE_COUNT as i64];
        let input_tensor =
            Tensor::from_array((shape, input)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        self.extract_probability(&outputs)
    }

    fn backend_name(&self) -> &str {
        "onnx"
    }
}
