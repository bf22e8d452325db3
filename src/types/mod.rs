//! Type definitions for the obstetric risk engine

pub mod patient;
pub mod prediction;
pub mod request;

pub use patient::PatientFeatures;
pub use prediction::{ConfidenceLevel, PatientPrediction, RiskLevel, RiskPrediction, RiskType};
pub use request::{ServiceRequest, ServiceResponse};
