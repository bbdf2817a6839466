//! Risk Scoring Engine - Main Entry Point
//!
//! Consumes transactions from NATS, scores them against the behavioral rule
//! engine and the learned scorer, and publishes risk assessments. Feedback
//! labels arrive on their own subject and feed the online model update.
//! Supports parallel transaction processing for high throughput.

use anyhow::Result;
use futures::StreamExt;
use risk_scoring_engine::{
    config::AppConfig,
    consumer::{FeedbackConsumer, TransactionConsumer},
    engine::RiskEngine,
    kv::RedisStore,
    metrics::MetricsReporter,
    producer::DecisionProducer,
    sink::MemorySink,
    RiskError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("risk_scoring_engine=info".parse()?),
        )
        .init();

    info!("Starting Risk Scoring Engine");

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");
    info!(
        "Fraud threshold: {:.2}, fusion weights: rules {:.2} / model {:.2}, ML model enabled: {}",
        config.scoring.fraud_threshold,
        config.scoring.weights.rule_weight,
        config.scoring.weights.model_weight,
        config.model.enable_ml_model
    );

    // Connect the behavioral window store
    let kv = Arc::new(RedisStore::connect(&config.redis.url).await?);
    info!("Connected to Redis at {}", config.redis.url);

    // The record sink is in-process; durable storage sits behind the
    // external transport in this deployment.
    let sink = Arc::new(MemorySink::new());

    // Assemble the engine
    let engine = Arc::new(RiskEngine::new(&config, kv, sink));
    let metrics = engine.metrics();

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let feedback_consumer = FeedbackConsumer::new(client.clone(), &config.nats.feedback_subject);
    let producer = Arc::new(DecisionProducer::new(client.clone(), &config.nats.decision_subject));

    let num_workers = config.pipeline.workers;
    let deadline = Duration::from_millis(config.pipeline.timeout_ms);
    info!(
        "Starting scoring loop with {} parallel workers, {}ms deadline",
        num_workers, config.pipeline.timeout_ms
    );
    info!("Listening on subject: {}", config.nats.transaction_subject);
    info!("Publishing assessments to: {}", config.nats.decision_subject);

    // Start metrics reporter (prints summary every 30 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 30);
        reporter.start().await;
    });

    // Feedback loop: labels apply one at a time, they are model writes.
    let feedback_engine = engine.clone();
    let mut feedback_sub = feedback_consumer.subscribe().await?;
    tokio::spawn(async move {
        while let Some(message) = feedback_sub.next().await {
            match FeedbackConsumer::decode(&message.payload) {
                Ok(report) => {
                    match feedback_engine
                        .report_fraud(&report.transaction_id, report.was_actually_fraud)
                        .await
                    {
                        Ok(()) => info!(
                            transaction_id = %report.transaction_id,
                            was_fraud = report.was_actually_fraud,
                            "Feedback applied"
                        ),
                        Err(RiskError::NotFound(id)) => {
                            warn!(transaction_id = %id, "Feedback for unknown transaction")
                        }
                        Err(e) => error!(
                            transaction_id = %report.transaction_id,
                            error = %e,
                            "Feedback failed"
                        ),
                    }
                }
                Err(e) => warn!(error = %e, "Feedback rejected at intake"),
            }
        }
    });

    // Semaphore to limit concurrent scoring tasks
    let semaphore = Arc::new(Semaphore::new(num_workers));

    // Process transactions in parallel
    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let engine = engine.clone();
        let producer = producer.clone();

        tokio::spawn(async move {
            match TransactionConsumer::decode(&message.payload) {
                Ok(transaction) => {
                    let user_id = transaction.user_id.clone();

                    match engine.score_with_deadline(transaction, deadline).await {
                        Ok(assessment) => {
                            if let Err(e) = producer.publish(&assessment).await {
                                error!(
                                    transaction_id = %assessment.transaction_id,
                                    error = %e,
                                    "Failed to publish assessment"
                                );
                            } else {
                                debug!(
                                    transaction_id = %assessment.transaction_id,
                                    risk_score = assessment.risk_score,
                                    is_high_risk = assessment.is_high_risk,
                                    "Assessment published"
                                );
                            }
                        }
                        Err(RiskError::Validation { fields }) => {
                            warn!(user_id = %user_id, ?fields, "Transaction rejected")
                        }
                        Err(RiskError::DeadlineExceeded) => {
                            warn!(user_id = %user_id, "Scoring deadline exceeded")
                        }
                        Err(e) => error!(user_id = %user_id, error = %e, "Scoring failed"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Transaction rejected at intake");
                }
            }

            drop(permit);
        });
    }

    // Print final summary
    info!("Engine shutting down...");
    metrics.print_summary();

    Ok(())
}
