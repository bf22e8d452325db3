//! Model artifacts, scoring and aggregation

pub mod aggregator;
pub mod classifier;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod recommendations;
pub mod registry;
pub mod scaler;

pub use aggregator::summarize;
pub use classifier::{Classifier, DecisionTree, TreeEnsemble};
pub use inference::RiskScorer;
pub use loader::{ModelFormat, ModelLoader, ModelMetadata};
pub use recommendations::RecommendationTable;
pub use registry::{ModelBundle, ModelInfo, Registry, RegistryCell};
pub use scaler::StandardScaler;
