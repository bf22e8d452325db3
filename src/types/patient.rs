//! Patient clinical features used as model input

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::feature_extractor::FeatureExtractor;

/// Number of clinical features fed to every model
pub const FEATURE_COUNT: usize = 8;

/// Feature vector order. Scalers and classifiers are trained against this
/// exact order; it only changes together with a retraining.
pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "maternalAge",
    "parity",
    "prenatalVisits",
    "gestationWeeks",
    "priorHypertension",
    "gestationalDiabetes",
    "priorCesarean",
    "multiplePregnancy",
];

/// Declared type and validity range of one input field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Integer { min: i64, max: i64 },
    Real { min: f64, max: f64 },
    Flag,
}

/// Input field declaration: wire name, accepted alias, kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub alias: &'static str,
    pub kind: FieldKind,
}

/// Field declarations in feature order
pub const FIELD_SPECS: [FieldSpec; FEATURE_COUNT] = [
    FieldSpec {
        name: "maternalAge",
        alias: "maternal_age",
        kind: FieldKind::Integer { min: 15, max: 60 },
    },
    FieldSpec {
        name: "parity",
        alias: "parity",
        kind: FieldKind::Integer { min: 0, max: 20 },
    },
    FieldSpec {
        name: "prenatalVisits",
        alias: "prenatal_visits",
        kind: FieldKind::Integer { min: 0, max: 20 },
    },
    FieldSpec {
        name: "gestationWeeks",
        alias: "gestation_weeks",
        kind: FieldKind::Real { min: 4.0, max: 45.0 },
    },
    FieldSpec {
        name: "priorHypertension",
        alias: "prior_hypertension",
        kind: FieldKind::Flag,
    },
    FieldSpec {
        name: "gestationalDiabetes",
        alias: "gestational_diabetes",
        kind: FieldKind::Flag,
    },
    FieldSpec {
        name: "priorCesarean",
        alias: "prior_cesarean",
        kind: FieldKind::Flag,
    },
    FieldSpec {
        name: "multiplePregnancy",
        alias: "multiple_pregnancy",
        kind: FieldKind::Flag,
    },
];

/// Validated clinical features of one obstetric patient.
///
/// Only obtainable through [`FeatureExtractor::validate`] (or serde, which
/// goes through the same validation), so every instance holds all eight
/// fields within range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Map<String, Value>")]
pub struct PatientFeatures {
    maternal_age: u32,
    parity: u32,
    prenatal_visits: u32,
    gestation_weeks: f64,
    #[serde(serialize_with = "flag_as_int")]
    prior_hypertension: bool,
    #[serde(serialize_with = "flag_as_int")]
    gestational_diabetes: bool,
    #[serde(serialize_with = "flag_as_int")]
    prior_cesarean: bool,
    #[serde(serialize_with = "flag_as_int")]
    multiple_pregnancy: bool,
}

fn flag_as_int<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*flag))
}

fn flag_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

impl PatientFeatures {
    pub fn maternal_age(&self) -> u32 {
        self.maternal_age
    }

    pub fn parity(&self) -> u32 {
        self.parity
    }

    pub fn prenatal_visits(&self) -> u32 {
        self.prenatal_visits
    }

    pub fn gestation_weeks(&self) -> f64 {
        self.gestation_weeks
    }

    pub fn prior_hypertension(&self) -> bool {
        self.prior_hypertension
    }

    pub fn gestational_diabetes(&self) -> bool {
        self.gestational_diabetes
    }

    pub fn prior_cesarean(&self) -> bool {
        self.prior_cesarean
    }

    pub fn multiple_pregnancy(&self) -> bool {
        self.multiple_pregnancy
    }

    /// Build from a vector whose every entry already passed its field check
    pub(crate) fn from_checked(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            maternal_age: values[0] as u32,
            parity: values[1] as u32,
            prenatal_visits: values[2] as u32,
            gestation_weeks: values[3],
            prior_hypertension: values[4] == 1.0,
            gestational_diabetes: values[5] == 1.0,
            prior_cesarean: values[6] == 1.0,
            multiple_pregnancy: values[7] == 1.0,
        }
    }

    /// Numeric vector in [`FEATURE_ORDER`]
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.maternal_age),
            f64::from(self.parity),
            f64::from(self.prenatal_visits),
            self.gestation_weeks,
            flag_value(self.prior_hypertension),
            flag_value(self.gestational_diabetes),
            flag_value(self.prior_cesarean),
            flag_value(self.multiple_pregnancy),
        ]
    }
}

impl TryFrom<Map<String, Value>> for PatientFeatures {
    type Error = EngineError;

    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        FeatureExtractor::new().validate_map(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_specs_follow_feature_order() {
        let names: Vec<&str> = FIELD_SPECS.iter().map(|s| s.name).collect();
        assert_eq!(names, FEATURE_ORDER);
    }

    #[test]
    fn test_patient_serialization() {
        let patient: PatientFeatures = serde_json::from_value(json!({
            "maternalAge": 35,
            "parity": 2,
            "prenatalVisits": 6,
            "gestationWeeks": 38.0,
            "priorHypertension": 1,
            "gestationalDiabetes": 0,
            "priorCesarean": 1,
            "multiplePregnancy": 0
        }))
        .unwrap();

        let json = serde_json::to_value(&patient).unwrap();
        assert_eq!(json["maternalAge"], 35);
        assert_eq!(json["priorHypertension"], 1);
        assert_eq!(json["multiplePregnancy"], 0);

        let back: PatientFeatures = serde_json::from_value(json).unwrap();
        assert_eq!(back, patient);
    }

    #[test]
    fn test_deserialization_validates() {
        let result: Result<PatientFeatures, _> = serde_json::from_value(json!({
            "maternalAge": 5,
            "parity": 2
        }));
        assert!(result.is_err());
    }
}
