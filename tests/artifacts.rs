//! Registry initialization against missing and corrupt artifact sets

use obstetric_risk_engine::{initialize, EngineError, RegistryCell};
use std::fs;
use std::path::{Path, PathBuf};

fn shipped_models() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
}

/// Copy of the shipped artifacts that a test may damage
fn models_copy() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in fs::read_dir(shipped_models()).unwrap() {
        let path = entry.unwrap().path();
        fs::copy(&path, dir.path().join(path.file_name().unwrap())).unwrap();
    }
    dir
}

fn load_error(dir: &Path) -> (String, String) {
    match initialize(dir).unwrap_err() {
        EngineError::ModelLoad { risk_type, reason } => (risk_type, reason),
        other => panic!("expected model load error, got {:?}", other),
    }
}

#[test]
fn test_copy_loads() {
    let dir = models_copy();
    assert!(initialize(dir.path()).is_ok());
}

#[test]
fn test_missing_artifact_set() {
    let dir = models_copy();
    for suffix in ["metadata.json", "scaler.json", "model.json"] {
        fs::remove_file(dir.path().join(format!("postpartum_hemorrhage.{}", suffix))).unwrap();
    }

    let (risk_type, _) = load_error(dir.path());
    assert_eq!(risk_type, "postpartum_hemorrhage");
}

#[test]
fn test_missing_scaler() {
    let dir = models_copy();
    fs::remove_file(dir.path().join("sepsis.scaler.json")).unwrap();

    let (risk_type, reason) = load_error(dir.path());
    assert_eq!(risk_type, "sepsis");
    assert!(reason.contains("sepsis.scaler.json"));
}

#[test]
fn test_corrupt_model() {
    let dir = models_copy();
    fs::write(dir.path().join("gestational_hypertension.model.json"), "{\"trees\": [").unwrap();

    let (risk_type, _) = load_error(dir.path());
    assert_eq!(risk_type, "gestational_hypertension");
}

#[test]
fn test_reordered_features_are_refused() {
    let dir = models_copy();
    let path = dir.path().join("sepsis.metadata.json");
    let mut metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let order = metadata["feature_order"].as_array_mut().unwrap();
    order.swap(0, 1);
    fs::write(&path, metadata.to_string()).unwrap();

    let (risk_type, reason) = load_error(dir.path());
    assert_eq!(risk_type, "sepsis");
    assert!(reason.contains("feature order"));
}

#[test]
fn test_invalid_scaler_is_refused() {
    let dir = models_copy();
    fs::write(
        dir.path().join("postpartum_hemorrhage.scaler.json"),
        r#"{"mean": [0, 0, 0, 0, 0, 0, 0, 0], "scale": [1, 1, 1, 0, 1, 1, 1, 1]}"#,
    )
    .unwrap();

    let (risk_type, _) = load_error(dir.path());
    assert_eq!(risk_type, "postpartum_hemorrhage");
}

#[test]
fn test_onnx_format_requires_feature() {
    let dir = models_copy();
    let path = dir.path().join("sepsis.metadata.json");
    let text = fs::read_to_string(&path)
        .unwrap()
        .replace("tree_ensemble", "onnx");
    fs::write(&path, text).unwrap();

    let (risk_type, _) = load_error(dir.path());
    assert_eq!(risk_type, "sepsis");
}

#[test]
fn test_failed_cell_never_becomes_servable() {
    let dir = models_copy();
    fs::remove_file(dir.path().join("sepsis.model.json")).unwrap();

    let cell = RegistryCell::new();
    assert!(cell.get_or_load(dir.path(), 1).is_err());
    assert!(!cell.is_ready());

    // Repairing the directory does not trigger a reload
    fs::copy(
        shipped_models().join("sepsis.model.json"),
        dir.path().join("sepsis.model.json"),
    )
    .unwrap();
    assert!(cell.get_or_load(dir.path(), 1).is_err());
    assert!(!cell.is_ready());
}
