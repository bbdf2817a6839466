//! Risk scoring engine orchestration.
//!
//! One scoring request flows: validate → one ingest pass over the behavioral
//! windows → rule evaluation and feature extraction over the same snapshot →
//! model score (or bypass / fallback) → fusion → persist the record → answer.
//! Feedback flows: fetch record → status transition → read-only feature
//! extraction → one online model update → bump the model version counter.

use crate::config::AppConfig;
use crate::error::{RiskError, RiskResult};
use crate::features::FeatureExtractor;
use crate::fusion::{self, FusionWeights};
use crate::kv::KvStore;
use crate::metrics::EngineMetrics;
use crate::model::{fallback_score, LearnedScorer, ModelScore};
use crate::rules::RuleEngine;
use crate::sink::TransactionSink;
use crate::types::{
    BucketCount, EngineStatistics, RiskAssessment, RiskBucket, StatusBreakdown, Transaction,
    TransactionRecord, TransactionStatus,
};
use crate::windows::BehavioralWindows;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const MODEL_VERSION_KEY: &str = "model:version";

pub struct RiskEngine {
    windows: BehavioralWindows,
    rules: RuleEngine,
    extractor: FeatureExtractor,
    scorer: Option<Arc<LearnedScorer>>,
    enable_ml_model: bool,
    weights: FusionWeights,
    fraud_threshold: f64,
    kv: Arc<dyn KvStore>,
    sink: Arc<dyn TransactionSink>,
    metrics: Arc<EngineMetrics>,
}

impl RiskEngine {
    /// Assemble the engine over its two abstract collaborators.
    ///
    /// A model that cannot be loaded or initialized leaves the engine in the
    /// contractual degraded mode (amount-bucket fallback), not in an error
    /// state.
    pub fn new(config: &AppConfig, kv: Arc<dyn KvStore>, sink: Arc<dyn TransactionSink>) -> Self {
        let scorer = if config.model.enable_ml_model {
            match LearnedScorer::load_or_init(&config.model.artifact_dir) {
                Ok(scorer) => Some(Arc::new(scorer)),
                Err(e) => {
                    warn!(error = %e, "learned scorer unavailable, running degraded");
                    None
                }
            }
        } else {
            None
        };

        let extractor = scorer
            .as_ref()
            .map(|s| FeatureExtractor::new(s.feature_stats().clone()))
            .unwrap_or_default();

        Self {
            windows: BehavioralWindows::new(kv.clone()),
            rules: RuleEngine::new(config.rules.clone(), config.scoring.fraud_threshold),
            extractor,
            scorer,
            enable_ml_model: config.model.enable_ml_model,
            weights: config.scoring.weights.clone(),
            fraud_threshold: config.scoring.fraud_threshold,
            kv,
            sink,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Score one transaction and persist its record.
    pub async fn score(&self, tx: Transaction) -> RiskResult<RiskAssessment> {
        let started = Instant::now();
        tx.validate()?;
        let now = tx.effective_time();

        let snapshot = self.windows.ingest(&tx, now).await?;
        let verdict = self.rules.evaluate(&tx, &snapshot, now);

        let model_score = if self.enable_ml_model {
            let features = self.extractor.extract(&tx, &snapshot, now);
            let prediction = match &self.scorer {
                Some(scorer) => scorer.predict_risk(&features, tx.amount),
                None => ModelScore {
                    score: fallback_score(tx.amount),
                    degraded: true,
                },
            };
            if prediction.degraded {
                warn!(
                    user_id = %tx.user_id,
                    fallback_score = prediction.score,
                    "model degraded, amount-bucket fallback in effect"
                );
                self.metrics.record_model_fallback();
            }
            Some(prediction.score)
        } else {
            None
        };

        let decision = fusion::decide(
            verdict.rule_score,
            model_score,
            &self.weights,
            self.fraud_threshold,
        );

        let record = TransactionRecord::new(tx, decision.final_score, decision.initial_status);
        let transaction_id = record.id.clone();
        self.sink
            .append(record)
            .await
            .map_err(RiskError::Unavailable)?;

        self.metrics
            .record_scored(started.elapsed(), decision.final_score, decision.is_high_risk);

        Ok(RiskAssessment {
            transaction_id,
            risk_score: decision.final_score,
            is_high_risk: decision.is_high_risk,
            reasons: verdict.reasons,
            recommended_action: decision.action,
        })
    }

    /// Score under a caller-supplied deadline. Window writes already
    /// submitted when the deadline fires are left to expire by TTL.
    pub async fn score_with_deadline(
        &self,
        tx: Transaction,
        deadline: Duration,
    ) -> RiskResult<RiskAssessment> {
        match tokio::time::timeout(deadline, self.score(tx)).await {
            Ok(result) => result,
            Err(_) => Err(RiskError::DeadlineExceeded),
        }
    }

    /// Apply ground truth to a previously scored transaction.
    ///
    /// Repeated feedback is deduped on the status transition: a record that
    /// already carries APPROVED or DENIED is left untouched. FLAGGED is an
    /// initial state and still accepts its first label.
    pub async fn report_fraud(&self, transaction_id: &str, was_fraud: bool) -> RiskResult<()> {
        let record = self
            .sink
            .fetch(transaction_id)
            .await
            .map_err(RiskError::Unavailable)?
            .ok_or_else(|| RiskError::NotFound(transaction_id.to_string()))?;

        if record.status.is_labeled() {
            info!(transaction_id, status = %record.status, "feedback ignored, already labeled");
            return Ok(());
        }

        let status = if was_fraud {
            TransactionStatus::Denied
        } else {
            TransactionStatus::Approved
        };
        self.sink
            .update_status(transaction_id, status)
            .await
            .map_err(RiskError::Unavailable)?;

        if let Some(scorer) = &self.scorer {
            let tx = &record.transaction;
            let now = tx.effective_time();
            let snapshot = self.windows.observe(&tx.user_id, &tx.device_id, now).await;
            let features = self.extractor.extract(tx, &snapshot, now);

            // Track how the pre-update model would have called it.
            let prediction = scorer.predict_risk(&features, tx.amount);
            self.metrics
                .record_label_outcome(prediction.score >= 0.5, was_fraud);

            scorer
                .update_with_label(&features, was_fraud)
                .map_err(RiskError::Unavailable)?;
            let version = self
                .kv
                .incr(MODEL_VERSION_KEY)
                .await
                .map_err(RiskError::Unavailable)?;
            info!(transaction_id, was_fraud, model_version = version, "model updated from feedback");
        }

        self.metrics.record_feedback();
        Ok(())
    }

    /// Current model version counter; 0 when no update has landed yet.
    pub async fn model_version(&self) -> RiskResult<u64> {
        let value = self
            .kv
            .get(MODEL_VERSION_KEY)
            .await
            .map_err(RiskError::Unavailable)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// 24-hour status rollup plus coarse risk distribution.
    pub async fn statistics(&self) -> RiskResult<EngineStatistics> {
        let since = Utc::now() - ChronoDuration::hours(24);
        let records = self
            .sink
            .created_since(since)
            .await
            .map_err(RiskError::Unavailable)?;

        let mut by_status: HashMap<TransactionStatus, (u64, f64)> = HashMap::new();
        let mut by_bucket: HashMap<RiskBucket, u64> = HashMap::new();
        for record in &records {
            let entry = by_status.entry(record.status).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += record.transaction.amount;
            *by_bucket.entry(RiskBucket::from_score(record.risk_score)).or_insert(0) += 1;
        }

        let last_24_hours = [
            TransactionStatus::Pending,
            TransactionStatus::Approved,
            TransactionStatus::Denied,
            TransactionStatus::Flagged,
        ]
        .into_iter()
        .filter_map(|status| {
            by_status.get(&status).map(|(count, total_amount)| StatusBreakdown {
                status,
                count: *count,
                total_amount: *total_amount,
            })
        })
        .collect();

        let risk_distribution = [RiskBucket::Low, RiskBucket::Medium, RiskBucket::High]
            .into_iter()
            .map(|bucket| BucketCount {
                bucket,
                count: by_bucket.get(&bucket).copied().unwrap_or(0),
            })
            .collect();

        Ok(EngineStatistics {
            last_24_hours,
            risk_distribution,
        })
    }
}
