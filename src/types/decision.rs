//! Scoring decision and statistics data structures.

use serde::{Deserialize, Serialize};

/// Action the engine recommends to the payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Allow,
    Deny,
}

/// Coarse risk bucket used by the statistics surface.
///
/// LOW < 0.3 ≤ MEDIUM < 0.7 ≤ HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

impl RiskBucket {
    pub const MEDIUM_CUTOFF: f64 = 0.3;
    pub const HIGH_CUTOFF: f64 = 0.7;

    /// Classify a final risk score.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_CUTOFF {
            RiskBucket::High
        } else if score >= Self::MEDIUM_CUTOFF {
            RiskBucket::Medium
        } else {
            RiskBucket::Low
        }
    }
}

/// The engine's answer for one scored transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Engine-assigned id of the persisted record.
    pub transaction_id: String,
    /// Final fused risk score in [0, 1].
    pub risk_score: f64,
    /// True iff `risk_score >= fraud_threshold`.
    pub is_high_risk: bool,
    /// Triggered rule reasons, first-occurrence order, no duplicates.
    pub reasons: Vec<String>,
    pub recommended_action: RecommendedAction,
}

/// Feedback request: ground truth for a previously scored transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudReport {
    pub transaction_id: String,
    pub was_actually_fraud: bool,
}

/// Per-status rollup over the last 24 hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub status: super::transaction::TransactionStatus,
    pub count: u64,
    pub total_amount: f64,
}

/// Count of records falling into one risk bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketCount {
    pub bucket: RiskBucket,
    pub count: u64,
}

/// Statistics response: 24-hour status rollup plus risk distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub last_24_hours: Vec<StatusBreakdown>,
    pub risk_distribution: Vec<BucketCount>,
}
