//! Obstetric Risk Engine - Main Entry Point
//!
//! Loads the model registry, then serves prediction requests received over
//! NATS, replying on each request's reply subject.

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use obstetric_risk_engine::{
    batch::MAX_BATCH_SIZE,
    config::{AppConfig, LoggingConfig},
    consumer::RequestConsumer,
    engine::PredictionEngine,
    handler,
    metrics::{EngineMetrics, MetricsReporter},
    models::registry::RegistryCell,
    producer::ResponsePublisher,
    types::prediction::{CONFIDENCE_TIERS, RISK_TIERS},
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        format!("obstetric_risk_engine={}", logging.level)
            .parse()
            .context("Invalid logging level")?,
    );

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Next item of `stream`, or `None` once it ends or `shutdown` resolves
async fn next_or_shutdown<S, F>(stream: &mut S, shutdown: &mut F) -> Option<S::Item>
where
    S: Stream + Unpin,
    F: Future + Unpin,
{
    tokio::select! {
        item = stream.next() => {
            if item.is_none() {
                warn!("Subscription closed");
            }
            item
        }
        _ = shutdown => {
            info!("Shutdown requested");
            None
        }
    }
}

/// A worker permit, or `None` if `shutdown` resolves while the pool is full
async fn acquire_or_shutdown<F>(
    semaphore: &Arc<Semaphore>,
    shutdown: &mut F,
) -> Result<Option<OwnedSemaphorePermit>>
where
    F: Future + Unpin,
{
    tokio::select! {
        permit = semaphore.clone().acquire_owned() => {
            Ok(Some(permit.context("Worker pool closed")?))
        }
        _ = shutdown => {
            info!("Shutdown requested while waiting for a worker");
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Obstetric Risk Engine");
    info!(
        risk_tiers = ?RISK_TIERS,
        confidence_tiers = ?CONFIDENCE_TIERS,
        max_batch_size = MAX_BATCH_SIZE,
        "Classification policy"
    );

    // Load every bundle before accepting traffic; a failure is final
    let cell = RegistryCell::new();
    let registry = match cell.get_or_load(&config.models.models_dir, config.models.onnx_threads) {
        Ok(registry) => registry,
        Err(e) => {
            error!(
                models_dir = %config.models.models_dir,
                error = %e,
                "Model registry failed to initialize, refusing to serve"
            );
            std::process::exit(1);
        }
    };

    let engine = Arc::new(PredictionEngine::new(registry)?);
    let metrics = Arc::new(EngineMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subject);
    let publisher = ResponsePublisher::new(client.clone());

    let num_workers = config.pipeline.workers.max(1);
    let batch_timeout = match config.pipeline.batch_timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    info!(
        workers = num_workers,
        batch_timeout_ms = config.pipeline.batch_timeout_ms,
        subject = %consumer.subject(),
        "Starting request loop"
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let handled_count = Arc::new(AtomicU64::new(0));

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let mut subscription = consumer.subscribe().await?;

    // One signal future for the whole loop so a SIGINT is never dropped
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let Some(message) = next_or_shutdown(&mut subscription, &mut shutdown).await else {
            break;
        };
        let Some(permit) = acquire_or_shutdown(&semaphore, &mut shutdown).await? else {
            break;
        };

        let engine = engine.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let handled_count = handled_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();
            let deadline = batch_timeout.map(|t| start_time + t);

            let response = handler::handle_payload(&engine, &message.payload, deadline);
            let elapsed = start_time.elapsed();
            metrics.record_response(&response, elapsed);

            match message.reply {
                Some(reply) => {
                    if let Err(e) = publisher.publish(reply, &response).await {
                        error!(
                            request_id = %response.request_id,
                            error = %e,
                            "Failed to publish response"
                        );
                    }
                }
                None => debug!(
                    request_id = %response.request_id,
                    ok = response.is_ok(),
                    "Request without reply subject handled"
                ),
            }

            let count = handled_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                info!(
                    handled = count,
                    throughput = format!("{:.1} req/s", metrics.throughput()),
                    avg_latency_us = metrics.latency_stats().mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    // Wait for in-flight requests
    let _ = semaphore.acquire_many(num_workers as u32).await;
    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush NATS connection");
    }

    info!("Engine shutting down...");
    metrics.print_summary();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_next_delivers_items_until_shutdown() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut shutdown = rx;
        let mut stream = futures::stream::iter(vec![1, 2]).chain(futures::stream::pending());

        assert_eq!(next_or_shutdown(&mut stream, &mut shutdown).await, Some(1));
        assert_eq!(next_or_shutdown(&mut stream, &mut shutdown).await, Some(2));

        tx.send(()).unwrap();
        assert_eq!(next_or_shutdown(&mut stream, &mut shutdown).await, None);
    }

    #[tokio::test]
    async fn test_signal_raised_between_polls_is_kept() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut shutdown = rx;
        let mut stream = futures::stream::pending::<u32>();

        // Raised while nothing is waiting on it
        tx.send(()).unwrap();
        assert_eq!(next_or_shutdown(&mut stream, &mut shutdown).await, None);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_full_pool() {
        let semaphore = Arc::new(Semaphore::new(1));
        let (tx, rx) = oneshot::channel::<()>();
        let mut shutdown = rx;

        let held = acquire_or_shutdown(&semaphore, &mut shutdown).await.unwrap();
        assert!(held.is_some());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
        });
        let waiting = acquire_or_shutdown(&semaphore, &mut shutdown).await.unwrap();
        assert!(waiting.is_none());
    }

    #[tokio::test]
    async fn test_ended_stream_stops_loop() {
        let (_tx, rx) = oneshot::channel::<()>();
        let mut shutdown = rx;
        let mut stream = futures::stream::iter(Vec::<u32>::new());
        assert_eq!(next_or_shutdown(&mut stream, &mut shutdown).await, None);
    }
}
