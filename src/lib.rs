//! Obstetric Risk Engine Library
//!
//! Scores sepsis, gestational hypertension and postpartum hemorrhage risk
//! from eight clinical features using pre-trained classifiers, classifies
//! each probability into risk and confidence tiers, and aggregates the
//! results per patient and per batch.

pub mod batch;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod feature_extractor;
pub mod handler;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod types;

pub use batch::{BatchResult, MAX_BATCH_SIZE};
pub use config::AppConfig;
pub use engine::{initialize, HealthReport, PredictionEngine};
pub use error::{EngineError, EngineResult};
pub use feature_extractor::FeatureExtractor;
pub use models::registry::{Registry, RegistryCell};
pub use types::{
    patient::PatientFeatures,
    prediction::{ConfidenceLevel, PatientPrediction, RiskLevel, RiskPrediction, RiskType},
};
