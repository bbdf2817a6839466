//! Performance metrics and statistics tracking for the scoring engine.

use crate::types::RiskBucket;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the scoring pipeline
pub struct EngineMetrics {
    /// Total transactions scored
    pub transactions_scored: AtomicU64,
    /// Transactions flagged high risk
    pub high_risk_flagged: AtomicU64,
    /// Times the learned scorer fell back to the amount-bucket score
    pub model_fallbacks: AtomicU64,
    /// Ground-truth labels applied to the model
    pub feedback_applied: AtomicU64,
    /// Label outcome confusion counts (prediction at the 0.5 cutoff vs
    /// ground truth), feeding accuracy / precision / recall
    true_positives: AtomicU64,
    false_positives: AtomicU64,
    true_negatives: AtomicU64,
    false_negatives: AtomicU64,
    /// Scoring latencies (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Final score distribution, tenth-wide buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Counts by coarse risk bucket
    risk_buckets: RwLock<HashMap<RiskBucket, u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl EngineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            transactions_scored: AtomicU64::new(0),
            high_risk_flagged: AtomicU64::new(0),
            model_fallbacks: AtomicU64::new(0),
            feedback_applied: AtomicU64::new(0),
            true_positives: AtomicU64::new(0),
            false_positives: AtomicU64::new(0),
            true_negatives: AtomicU64::new(0),
            false_negatives: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            risk_buckets: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one scored transaction
    pub fn record_scored(&self, processing_time: Duration, final_score: f64, is_high_risk: bool) {
        self.transactions_scored.fetch_add(1, Ordering::Relaxed);
        if is_high_risk {
            self.high_risk_flagged.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10_000 {
                times.drain(0..5_000);
            }
        }

        let bucket = ((final_score * 10.0).min(9.0).max(0.0)) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
        if let Ok(mut buckets) = self.risk_buckets.write() {
            *buckets.entry(RiskBucket::from_score(final_score)).or_insert(0) += 1;
        }
    }

    /// Record a degraded-model prediction
    pub fn record_model_fallback(&self) {
        self.model_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processed feedback label
    pub fn record_feedback(&self) {
        self.feedback_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how the model's prediction compared with ground truth
    pub fn record_label_outcome(&self, predicted_fraud: bool, was_fraud: bool) {
        let counter = match (predicted_fraud, was_fraud) {
            (true, true) => &self.true_positives,
            (true, false) => &self.false_positives,
            (false, false) => &self.true_negatives,
            (false, true) => &self.false_negatives,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Accuracy, precision and recall over the labels seen so far
    pub fn get_label_stats(&self) -> LabelStats {
        let tp = self.true_positives.load(Ordering::Relaxed) as f64;
        let fp = self.false_positives.load(Ordering::Relaxed) as f64;
        let tn = self.true_negatives.load(Ordering::Relaxed) as f64;
        let fn_ = self.false_negatives.load(Ordering::Relaxed) as f64;

        let total = tp + fp + tn + fn_;
        LabelStats {
            accuracy: if total > 0.0 { (tp + tn) / total } else { 0.0 },
            precision: if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 },
            recall: if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 },
        }
    }

    /// Get scoring latency statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get the tenth-wide final score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Get counts by coarse risk bucket
    pub fn get_risk_buckets(&self) -> HashMap<RiskBucket, u64> {
        self.risk_buckets.read().map(|b| b.clone()).unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.transactions_scored.load(Ordering::Relaxed);
        let flagged = self.high_risk_flagged.load(Ordering::Relaxed);
        let fallbacks = self.model_fallbacks.load(Ordering::Relaxed);
        let feedback = self.feedback_applied.load(Ordering::Relaxed);
        let flag_rate = if scored > 0 {
            (flagged as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let risk_buckets = self.get_risk_buckets();
        let score_dist = self.get_score_distribution();
        let labels = self.get_label_stats();

        info!(
            transactions_scored = scored,
            throughput = format!("{throughput:.1} tx/s"),
            high_risk_flagged = flagged,
            flag_rate = format!("{flag_rate:.1}%"),
            model_fallbacks = fallbacks,
            feedback_applied = feedback,
            "engine metrics summary"
        );
        if feedback > 0 {
            info!(
                accuracy = format!("{:.3}", labels.accuracy),
                precision = format!("{:.3}", labels.precision),
                recall = format!("{:.3}", labels.recall),
                "model label outcomes"
            );
        }
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "scoring latency (us)"
        );
        for (bucket, count) in &risk_buckets {
            info!(bucket = ?bucket, count = *count, "risk bucket");
        }
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            info!(
                range = format!("{:.1}-{:.1}", i as f64 / 10.0, (i + 1) as f64 / 10.0),
                count = count,
                pct = format!("{pct:.1}%"),
                "score bucket"
            );
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Label outcome statistics
#[derive(Debug, Default)]
pub struct LabelStats {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Scoring latency statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<EngineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<EngineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = EngineMetrics::new();

        metrics.record_scored(Duration::from_micros(100), 0.2, false);
        metrics.record_scored(Duration::from_micros(200), 0.8, true);
        metrics.record_model_fallback();
        metrics.record_feedback();

        assert_eq!(metrics.transactions_scored.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.high_risk_flagged.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.model_fallbacks.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.feedback_applied.load(Ordering::Relaxed), 1);

        let buckets = metrics.get_risk_buckets();
        assert_eq!(buckets.get(&RiskBucket::Low), Some(&1));
        assert_eq!(buckets.get(&RiskBucket::High), Some(&1));
    }

    #[test]
    fn test_label_outcome_stats() {
        let metrics = EngineMetrics::new();
        metrics.record_label_outcome(true, true);
        metrics.record_label_outcome(true, false);
        metrics.record_label_outcome(false, false);
        metrics.record_label_outcome(false, true);

        let stats = metrics.get_label_stats();
        assert!((stats.accuracy - 0.5).abs() < 1e-9);
        assert!((stats.precision - 0.5).abs() < 1e-9);
        assert!((stats.recall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_processing_stats_percentiles() {
        let metrics = EngineMetrics::new();
        for us in [100u64, 200, 300, 400, 500] {
            metrics.record_scored(Duration::from_micros(us), 0.1, false);
        }
        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean_us, 300);
        assert_eq!(stats.p50_us, 300);
        assert_eq!(stats.max_us, 500);
    }

    #[test]
    fn test_score_distribution_buckets() {
        let metrics = EngineMetrics::new();
        metrics.record_scored(Duration::from_micros(1), 0.05, false);
        metrics.record_scored(Duration::from_micros(1), 0.95, true);
        metrics.record_scored(Duration::from_micros(1), 1.0, true);

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 2);
    }
}
