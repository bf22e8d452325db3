//! Validation and vectorization of raw patient input.
//!
//! Raw input is a JSON object with eight named values. Validation is
//! all-or-nothing: either every field is present, well-typed and in range
//! and a [`PatientFeatures`] is produced, or a single
//! [`EngineError::Validation`] lists every offending field.

use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult, FieldIssue, FieldProblem};
use crate::types::patient::{
    FieldKind, FieldSpec, PatientFeatures, FEATURE_COUNT, FEATURE_ORDER, FIELD_SPECS,
};

/// Turns raw patient input into validated features and model vectors.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw JSON value, which must be an object.
    pub fn validate(&self, raw: &Value) -> EngineResult<PatientFeatures> {
        match raw.as_object() {
            Some(map) => self.validate_map(map),
            None => Err(EngineError::Validation {
                issues: vec![FieldIssue::new(
                    "patient",
                    FieldProblem::WrongType {
                        expected: "object".to_string(),
                    },
                )],
            }),
        }
    }

    /// Validate the eight named values of one patient.
    pub fn validate_map(&self, raw: &Map<String, Value>) -> EngineResult<PatientFeatures> {
        let mut issues = Vec::new();
        let mut values = [0.0; FEATURE_COUNT];

        for (slot, spec) in values.iter_mut().zip(&FIELD_SPECS) {
            let value = raw
                .get(spec.name)
                .or_else(|| raw.get(spec.alias))
                .filter(|v| !v.is_null());

            match coerce(spec, value) {
                Ok(v) => *slot = v,
                Err(problem) => issues.push(FieldIssue::new(spec.name, problem)),
            }
        }

        if !issues.is_empty() {
            return Err(EngineError::Validation { issues });
        }

        Ok(PatientFeatures::from_checked(values))
    }

    /// Extract the model input vector from validated features.
    ///
    /// Order matches [`FEATURE_ORDER`], the order every model was trained on.
    pub fn extract(&self, features: &PatientFeatures) -> [f64; FEATURE_COUNT] {
        features.to_vector()
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in vector order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_ORDER
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Coerce one field to its declared type, returned in vector form
/// (flags as 0.0 / 1.0)
fn coerce(spec: &FieldSpec, value: Option<&Value>) -> Result<f64, FieldProblem> {
    let value = value.ok_or(FieldProblem::Missing)?;

    match spec.kind {
        FieldKind::Integer { min, max } => {
            let n = integral(value).ok_or_else(|| FieldProblem::WrongType {
                expected: "integer".to_string(),
            })?;
            in_range(n, min as f64, max as f64)?;
            Ok(n)
        }
        FieldKind::Real { min, max } => {
            let n = value.as_f64().ok_or_else(|| FieldProblem::WrongType {
                expected: "number".to_string(),
            })?;
            in_range(n, min, max)?;
            Ok(n)
        }
        FieldKind::Flag => match value {
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => {
                let n = n.as_f64().unwrap_or(f64::NAN);
                if n == 0.0 || n == 1.0 {
                    Ok(n)
                } else {
                    Err(FieldProblem::OutOfRange {
                        min: 0.0,
                        max: 1.0,
                        found: n,
                    })
                }
            }
            _ => Err(FieldProblem::WrongType {
                expected: "0 or 1".to_string(),
            }),
        },
    }
}

/// JSON integers and integral floats (35 or 35.0), but not 35.5 or "35"
fn integral(value: &Value) -> Option<f64> {
    let n = value.as_f64()?;
    (n.fract() == 0.0).then_some(n)
}

fn in_range(n: f64, min: f64, max: f64) -> Result<(), FieldProblem> {
    if n >= min && n <= max {
        Ok(())
    } else {
        Err(FieldProblem::OutOfRange { min, max, found: n })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_patient() -> Value {
        json!({
            "maternalAge": 35,
            "parity": 2,
            "prenatalVisits": 6,
            "gestationWeeks": 38.0,
            "priorHypertension": 1,
            "gestationalDiabetes": 0,
            "priorCesarean": 1,
            "multiplePregnancy": 0
        })
    }

    fn issue_fields(err: EngineError) -> Vec<String> {
        match err {
            EngineError::Validation { issues } => issues.into_iter().map(|i| i.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::new();
        let features = extractor.validate(&sample_patient()).unwrap();

        let vector = extractor.extract(&features);

        assert_eq!(vector.len(), extractor.feature_count());
        assert_eq!(vector, [35.0, 2.0, 6.0, 38.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 8);
        assert_eq!(extractor.feature_names().len(), 8);
        assert_eq!(extractor.feature_names()[3], "gestationWeeks");
    }

    #[test]
    fn test_reports_every_offending_field() {
        let mut raw = sample_patient();
        raw["maternalAge"] = json!(5);
        raw["gestationWeeks"] = json!(50.5);
        raw["priorCesarean"] = json!(2);
        raw.as_object_mut().unwrap().remove("parity");

        let err = FeatureExtractor::new().validate(&raw).unwrap_err();

        assert_eq!(
            issue_fields(err),
            vec!["maternalAge", "parity", "gestationWeeks", "priorCesarean"]
        );
    }

    #[test]
    fn test_out_of_range_details() {
        let mut raw = sample_patient();
        raw["maternalAge"] = json!(5);

        let err = FeatureExtractor::new().validate(&raw).unwrap_err();
        match err {
            EngineError::Validation { issues } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(
                    issues[0].problem,
                    FieldProblem::OutOfRange {
                        min: 15.0,
                        max: 60.0,
                        found: 5.0
                    }
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let mut raw = sample_patient();
        raw["maternalAge"] = json!(60);
        raw["parity"] = json!(0);
        raw["prenatalVisits"] = json!(20);
        raw["gestationWeeks"] = json!(4.0);
        assert!(FeatureExtractor::new().validate(&raw).is_ok());

        raw["gestationWeeks"] = json!(45.01);
        assert!(FeatureExtractor::new().validate(&raw).is_err());
    }

    #[test]
    fn test_wrong_types() {
        let mut raw = sample_patient();
        raw["maternalAge"] = json!("35");
        raw["parity"] = json!(2.5);
        raw["multiplePregnancy"] = json!("no");

        let err = FeatureExtractor::new().validate(&raw).unwrap_err();
        match err {
            EngineError::Validation { issues } => {
                assert_eq!(issues.len(), 3);
                assert!(issues
                    .iter()
                    .all(|i| matches!(i.problem, FieldProblem::WrongType { .. })));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_coercions_and_aliases() {
        let raw = json!({
            "maternal_age": 28.0,
            "parity": 0,
            "prenatal_visits": 9,
            "gestation_weeks": 39,
            "prior_hypertension": false,
            "gestational_diabetes": true,
            "prior_cesarean": 0,
            "multiple_pregnancy": 0
        });

        let features = FeatureExtractor::new().validate(&raw).unwrap();

        assert_eq!(features.maternal_age(), 28);
        assert_eq!(features.gestation_weeks(), 39.0);
        assert!(features.gestational_diabetes());
        assert!(!features.prior_hypertension());
    }

    #[test]
    fn test_null_counts_as_missing() {
        let mut raw = sample_patient();
        raw["parity"] = Value::Null;

        let err = FeatureExtractor::new().validate(&raw).unwrap_err();
        match err {
            EngineError::Validation { issues } => {
                assert_eq!(issues[0].problem, FieldProblem::Missing);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_non_object_input() {
        let err = FeatureExtractor::new().validate(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(issue_fields(err), vec!["patient"]);
    }
}
