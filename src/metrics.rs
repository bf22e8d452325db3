//! Serving metrics: request counts, latency, risk distribution.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

use crate::batch::{BatchOutcome, BatchResult};
use crate::types::prediction::{LevelCounts, PatientPrediction, RiskType};
use crate::types::request::{ResponseBody, ResponseStatus, ServiceResponse};

/// Maximum number of latency samples kept
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector shared by all workers
pub struct EngineMetrics {
    /// Requests handled, successful or not
    pub requests_handled: AtomicU64,
    /// Requests answered with an error
    pub requests_failed: AtomicU64,
    /// Patients that received a full prediction
    pub patients_predicted: AtomicU64,
    /// Patients flagged for special attention
    pub urgent_patients: AtomicU64,
    /// Batch requests processed
    pub batches_processed: AtomicU64,
    /// Errors by kind
    errors_by_kind: RwLock<BTreeMap<String, u64>>,
    /// Risk levels per risk type
    levels_by_type: RwLock<BTreeMap<RiskType, LevelCounts>>,
    /// Request handling times (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Probability distribution in 0.1-wide buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            requests_handled: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            patients_predicted: AtomicU64::new(0),
            urgent_patients: AtomicU64::new(0),
            batches_processed: AtomicU64::new(0),
            errors_by_kind: RwLock::new(BTreeMap::new()),
            levels_by_type: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one handled request
    pub fn record_request(&self, elapsed: Duration, error_kind: Option<&str>) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);

        if let Some(kind) = error_kind {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut by_kind) = self.errors_by_kind.write() {
                *by_kind.entry(kind.to_string()).or_insert(0) += 1;
            }
        }

        if let Ok(mut times) = self.latencies.write() {
            times.push(elapsed.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    /// Record one patient's full prediction
    pub fn record_patient(&self, prediction: &PatientPrediction) {
        self.patients_predicted.fetch_add(1, Ordering::Relaxed);
        if prediction.summary.requires_special_attention {
            self.urgent_patients.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut levels) = self.levels_by_type.write() {
            for risk in &prediction.predictions {
                levels.entry(risk.risk_type).or_default().record(risk.risk_level);
            }
        }

        if let Ok(mut buckets) = self.probability_buckets.write() {
            for risk in &prediction.predictions {
                buckets[bucket_index(risk.probability)] += 1;
            }
        }
    }

    /// Record a processed batch; its successful entries are recorded as
    /// patients
    pub fn record_batch(&self, result: &BatchResult) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        for prediction in result.entries.iter().filter_map(|e| e.outcome.prediction()) {
            self.record_patient(prediction);
        }
        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            for entry in &result.entries {
                if let BatchOutcome::Failed { error } = &entry.outcome {
                    *by_kind.entry(error.kind().to_string()).or_insert(0) += 1;
                }
            }
        }
    }

    /// Record a reply produced by the handler
    pub fn record_response(&self, response: &ServiceResponse, elapsed: Duration) {
        match &response.status {
            ResponseStatus::Ok {
                result: ResponseBody::Patient(prediction),
            } => self.record_patient(prediction),
            ResponseStatus::Ok {
                result: ResponseBody::Batch(batch),
            } => self.record_batch(batch),
            _ => {}
        }
        self.record_request(elapsed, response.error_kind());
    }

    /// Request latency percentiles
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    pub fn errors_by_kind(&self) -> BTreeMap<String, u64> {
        self.errors_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn levels_by_type(&self) -> BTreeMap<RiskType, LevelCounts> {
        self.levels_by_type
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    /// Requests per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_handled.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Log a summary of everything collected so far
    pub fn print_summary(&self) {
        let handled = self.requests_handled.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let patients = self.patients_predicted.load(Ordering::Relaxed);
        let batches = self.batches_processed.load(Ordering::Relaxed);
        let urgent = self.urgent_patients.load(Ordering::Relaxed);
        let urgent_rate = if patients > 0 {
            urgent as f64 / patients as f64 * 100.0
        } else {
            0.0
        };
        let latency = self.latency_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          OBSTETRIC RISK ENGINE - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Handled: {:>8}  │  Throughput: {:>6.1} req/s      ║",
            handled,
            self.throughput()
        );
        info!(
            "║ Requests Failed:  {:>8}  │  Patients: {:>8}             ║",
            failed, patients
        );
        info!(
            "║ Batches:          {:>8}  │                                ║",
            batches
        );
        info!(
            "║ Special Attention: {:>7}  │  Rate: {:>6.1}%                  ║",
            urgent, urgent_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}       ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Levels by Type (very_low/low/moderate/high):            ║");
        for (risk_type, counts) in self.levels_by_type() {
            info!(
                "║   {:26} {:>6} {:>6} {:>6} {:>6}",
                risk_type.as_str(),
                counts.very_low,
                counts.low,
                counts.moderate,
                counts.high
            );
        }

        let errors = self.errors_by_kind();
        if !errors.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Errors by Kind:                                              ║");
            for (kind, count) in &errors {
                info!("║   {:24}: {:>6}", kind, count);
            }
        }

        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Probability Distribution:                                    ║");
        let distribution = self.probability_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_index(probability: f64) -> usize {
    ((probability * 10.0) as usize).min(9)
}

/// Request latency statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics summary logger
pub struct MetricsReporter {
    metrics: Arc<EngineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<EngineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Run the reporting loop forever
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prediction::{
        ConfidenceLevel, PatientSummary, RiskLevel, RiskPrediction,
    };

    fn patient(probabilities: [f64; 3]) -> PatientPrediction {
        let predictions: Vec<RiskPrediction> = RiskType::ALL
            .iter()
            .zip(probabilities)
            .map(|(rt, p)| RiskPrediction {
                risk_type: *rt,
                probability: p,
                risk_level: RiskLevel::from_probability(p),
                confidence_level: ConfidenceLevel::from_probability(p),
                recommendation: String::new(),
            })
            .collect();
        let overall = predictions.iter().map(|p| p.risk_level).max().unwrap();

        PatientPrediction {
            patient: serde_json::from_value(serde_json::json!({
                "maternalAge": 30,
                "parity": 1,
                "prenatalVisits": 8,
                "gestationWeeks": 39.0,
                "priorHypertension": 0,
                "gestationalDiabetes": 0,
                "priorCesarean": 0,
                "multiplePregnancy": 0
            }))
            .unwrap(),
            summary: PatientSummary {
                overall_risk_level: overall,
                level_counts: LevelCounts::default(),
                requires_special_attention: overall == RiskLevel::High,
                highest_risk_type: RiskType::Sepsis,
                highest_probability: 0.0,
            },
            predictions,
        }
    }

    #[test]
    fn test_request_recording() {
        let metrics = EngineMetrics::new();

        metrics.record_request(Duration::from_micros(100), None);
        metrics.record_request(Duration::from_micros(300), Some("validation"));
        metrics.record_request(Duration::from_micros(200), Some("validation"));

        assert_eq!(metrics.requests_handled.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.errors_by_kind().get("validation"), Some(&2));

        let latency = metrics.latency_stats();
        assert_eq!(latency.count, 3);
        assert_eq!(latency.mean_us, 200);
        assert_eq!(latency.p50_us, 200);
        assert_eq!(latency.max_us, 300);
    }

    #[test]
    fn test_patient_recording() {
        let metrics = EngineMetrics::new();

        metrics.record_patient(&patient([0.36, 0.7386, 0.13]));
        metrics.record_patient(&patient([0.1, 0.2, 1.0]));

        assert_eq!(metrics.patients_predicted.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.urgent_patients.load(Ordering::Relaxed), 2);

        let levels = metrics.levels_by_type();
        assert_eq!(levels[&RiskType::GestationalHypertension].high, 1);
        assert_eq!(levels[&RiskType::GestationalHypertension].very_low, 1);
        assert_eq!(levels[&RiskType::PostpartumHemorrhage].high, 1);

        let distribution = metrics.probability_distribution();
        assert_eq!(distribution.iter().sum::<u64>(), 6);
        assert_eq!(distribution[9], 1); // probability 1.0 lands in the top bucket
        assert_eq!(distribution[7], 1);
    }

    #[test]
    fn test_response_recording() {
        let metrics = EngineMetrics::new();

        metrics.record_response(
            &ServiceResponse::ok(ResponseBody::Patient(patient([0.8, 0.1, 0.1]))),
            Duration::from_micros(50),
        );
        metrics.record_response(
            &ServiceResponse::error(crate::types::request::ErrorReport::malformed("eof")),
            Duration::from_micros(10),
        );

        assert_eq!(metrics.requests_handled.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.patients_predicted.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.errors_by_kind().get("malformed_request"), Some(&1));
    }

    #[test]
    fn test_empty_latency_stats() {
        assert_eq!(EngineMetrics::new().latency_stats(), LatencyStats::default());
    }
}
