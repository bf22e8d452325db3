//! Request dispatch: one `ServiceRequest` in, one `ServiceResponse` out.
//!
//! Synchronous and transport-free; the serving loop only moves bytes.

use std::time::Instant;
use tracing::{debug, error, warn};

use crate::engine::PredictionEngine;
use crate::error::EngineResult;
use crate::types::prediction::{PatientRiskPrediction, RiskType};
use crate::types::request::{ErrorReport, ResponseBody, ServiceRequest, ServiceResponse};

/// Decode a raw payload and handle it
pub fn handle_payload(
    engine: &PredictionEngine,
    payload: &[u8],
    deadline: Option<Instant>,
) -> ServiceResponse {
    match serde_json::from_slice::<ServiceRequest>(payload) {
        Ok(request) => handle_request(engine, request, deadline),
        Err(e) => {
            warn!(error = %e, "Malformed request");
            ServiceResponse::error(ErrorReport::malformed(e))
        }
    }
}

/// Handle a decoded request. `deadline` applies to batch requests only.
pub fn handle_request(
    engine: &PredictionEngine,
    request: ServiceRequest,
    deadline: Option<Instant>,
) -> ServiceResponse {
    let op = request.op();

    match dispatch(engine, request, deadline) {
        Ok(body) => {
            debug!(op = op, "Request handled");
            ServiceResponse::ok(body)
        }
        Err(err) => {
            if err.is_caller_error() {
                warn!(op = op, kind = err.kind(), error = %err, "Request rejected");
            } else {
                error!(op = op, kind = err.kind(), error = %err, "Request failed");
            }
            ServiceResponse::error(ErrorReport::from(&err))
        }
    }
}

fn dispatch(
    engine: &PredictionEngine,
    request: ServiceRequest,
    deadline: Option<Instant>,
) -> EngineResult<ResponseBody> {
    match request {
        ServiceRequest::Predict { patient } => {
            let features = engine.validate(&patient)?;
            Ok(ResponseBody::Patient(engine.predict_all(&features)?))
        }
        ServiceRequest::PredictOne { risk_type, patient } => {
            // Unknown risk types are reported even when the patient is invalid
            let risk_type = risk_type.parse::<RiskType>()?;
            let features = engine.validate(&patient)?;
            let prediction = engine.predict_risk(&features, risk_type)?;
            Ok(ResponseBody::Risk(PatientRiskPrediction {
                patient: features,
                prediction,
            }))
        }
        ServiceRequest::PredictBatch { patients } => Ok(ResponseBody::Batch(
            engine.predict_batch_until(&patients, deadline)?,
        )),
        ServiceRequest::Health => Ok(ResponseBody::Health(engine.health())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::tests::registry;
    use crate::types::prediction::RiskLevel;
    use crate::types::request::ResponseStatus;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn engine() -> PredictionEngine {
        PredictionEngine::new(Arc::new(registry(3600.0, 7386.0, 1300.0))).unwrap()
    }

    fn patient() -> Value {
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

    fn body(response: ServiceResponse) -> ResponseBody {
        match response.status {
            ResponseStatus::Ok { result } => result,
            ResponseStatus::Error { error } => panic!("unexpected error: {:?}", error),
        }
    }

    #[test]
    fn test_predict() {
        let response = handle_request(
            &engine(),
            ServiceRequest::Predict { patient: patient() },
            None,
        );
        match body(response) {
            ResponseBody::Patient(prediction) => {
                assert_eq!(prediction.patient.maternal_age(), 35);
                assert_eq!(prediction.predictions.len(), 3);
                assert_eq!(prediction.summary.overall_risk_level, RiskLevel::High);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_predict_one() {
        let response = handle_request(
            &engine(),
            ServiceRequest::PredictOne {
                risk_type: "postpartum_hemorrhage".to_string(),
                patient: patient(),
            },
            None,
        );
        match body(response) {
            ResponseBody::Risk(reply) => {
                assert_eq!(reply.prediction.risk_type, RiskType::PostpartumHemorrhage);
                assert_eq!(reply.prediction.risk_level, RiskLevel::VeryLow);
                assert_eq!(reply.patient.maternal_age(), 35);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_risk_type() {
        let response = handle_request(
            &engine(),
            ServiceRequest::PredictOne {
                risk_type: "anemia".to_string(),
                patient: json!({}),
            },
            None,
        );
        assert_eq!(response.error_kind(), Some("unknown_risk_type"));
    }

    #[test]
    fn test_validation_error_lists_issues() {
        let response = handle_request(
            &engine(),
            ServiceRequest::Predict {
                patient: json!({"maternalAge": 5}),
            },
            None,
        );
        match response.status {
            ResponseStatus::Error { error } => {
                assert_eq!(error.kind, "validation");
                assert_eq!(error.issues.len(), 8);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_too_large() {
        let response = handle_request(
            &engine(),
            ServiceRequest::PredictBatch {
                patients: vec![patient(); 101],
            },
            None,
        );
        assert_eq!(response.error_kind(), Some("batch_too_large"));
    }

    #[test]
    fn test_health() {
        let response = handle_payload(&engine(), br#"{"op": "health"}"#, None);
        match body(response) {
            ResponseBody::Health(report) => assert_eq!(report.loaded_risk_types.len(), 3),
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload() {
        let response = handle_payload(&engine(), b"not json", None);
        assert_eq!(response.error_kind(), Some("malformed_request"));
    }
}
