//! Test Request Producer
//!
//! Generates random patients and sends them to the engine as prediction
//! requests over NATS, logging each reply.
//!
//! Usage: test-producer [nats_url] [subject] [count] [invalid_rate] [delay_ms] [batch_size]

use anyhow::Context;
use obstetric_risk_engine::types::request::{
    ResponseBody, ResponseStatus, ServiceRequest, ServiceResponse,
};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Random patient generator
struct PatientGenerator {
    rng: rand::rngs::ThreadRng,
    generated: u64,
}

impl PatientGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            generated: 0,
        }
    }

    /// A patient whose every field is within range
    fn generate_valid(&mut self) -> Value {
        self.generated += 1;
        let weeks: f64 = self.rng.gen_range(20.0..42.0);

        json!({
            "maternalAge": self.rng.gen_range(16..46),
            "parity": self.rng.gen_range(0..6),
            "prenatalVisits": self.rng.gen_range(0..13),
            "gestationWeeks": (weeks * 10.0).round() / 10.0,
            "priorHypertension": u8::from(self.rng.gen_bool(0.15)),
            "gestationalDiabetes": u8::from(self.rng.gen_bool(0.08)),
            "priorCesarean": u8::from(self.rng.gen_bool(0.25)),
            "multiplePregnancy": u8::from(self.rng.gen_bool(0.03)),
        })
    }

    /// A patient with one field broken
    fn generate_invalid(&mut self) -> Value {
        let mut patient = self.generate_valid();
        let broken = match self.rng.gen_range(0..4) {
            0 => ("maternalAge", json!(self.rng.gen_range(1..15))),
            1 => ("gestationWeeks", json!(self.rng.gen_range(46.0..60.0))),
            2 => ("parity", json!("several")),
            _ => ("priorCesarean", Value::Null),
        };
        if let Some(fields) = patient.as_object_mut() {
            fields.insert(broken.0.to_string(), broken.1);
        }
        patient
    }

    fn generate(&mut self, invalid_rate: f64) -> Value {
        if self.rng.gen_bool(invalid_rate) {
            self.generate_invalid()
        } else {
            self.generate_valid()
        }
    }

    /// Next request: a single patient, or a batch when `batch_size > 0`
    fn next_request(&mut self, invalid_rate: f64, batch_size: usize) -> ServiceRequest {
        if batch_size == 0 {
            ServiceRequest::Predict {
                patient: self.generate(invalid_rate),
            }
        } else {
            ServiceRequest::PredictBatch {
                patients: (0..batch_size).map(|_| self.generate(invalid_rate)).collect(),
            }
        }
    }
}

fn log_reply(response: &ServiceResponse) {
    match &response.status {
        ResponseStatus::Ok {
            result: ResponseBody::Patient(prediction),
        } => info!(
            request_id = %response.request_id,
            overall = %prediction.summary.overall_risk_level,
            highest = %prediction.summary.highest_risk_type,
            probability = prediction.summary.highest_probability,
            "Patient scored"
        ),
        ResponseStatus::Ok {
            result: ResponseBody::Batch(batch),
        } => info!(
            request_id = %response.request_id,
            successful = batch.statistics.successful,
            failed = batch.statistics.failed,
            urgent = batch.statistics.urgent_cases,
            "Batch scored"
        ),
        ResponseStatus::Ok { .. } => info!(request_id = %response.request_id, "Reply received"),
        ResponseStatus::Error { error } => warn!(
            request_id = %response.request_id,
            kind = %error.kind,
            message = %error.message,
            "Request rejected"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Request Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("obstetric.predict");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let invalid_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);
    let batch_size: usize = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(0);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        invalid_rate = invalid_rate,
        delay_ms = delay_ms,
        batch_size = batch_size,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, invalid_rate, delay_ms, batch_size).await;
        }
    };

    let mut generator = PatientGenerator::new();
    let mut ok_count = 0u64;
    let mut error_count = 0u64;

    for i in 0..count {
        let request = generator.next_request(invalid_rate, batch_size);
        let payload = serde_json::to_vec(&request)?;

        let reply = client
            .request(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("Request {} to {} failed", i + 1, subject))?;
        let response: ServiceResponse =
            serde_json::from_slice(&reply.payload).context("Undecodable reply")?;

        if response.is_ok() {
            ok_count += 1;
        } else {
            error_count += 1;
        }
        log_reply(&response);

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} patients, {} ok, {} rejected)",
        count, generator.generated, ok_count, error_count
    );

    Ok(())
}

async fn run_dry_mode(
    count: u64,
    invalid_rate: f64,
    delay_ms: u64,
    batch_size: usize,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = PatientGenerator::new();

    for i in 0..count {
        let request = generator.next_request(invalid_rate, batch_size);
        let json = serde_json::to_string_pretty(&request)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
