//! Fusion of rule and model scores into the final risk decision.

use crate::types::{RecommendedAction, TransactionStatus};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Convex combination weights for the two scoring paths. Must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    pub rule_weight: f64,
    pub model_weight: f64,
}

impl FusionWeights {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (self.rule_weight + self.model_weight - 1.0).abs() < 1e-9,
            "rule_weight + model_weight must sum to 1, got {} + {}",
            self.rule_weight,
            self.model_weight
        );
        anyhow::ensure!(
            self.rule_weight >= 0.0 && self.model_weight >= 0.0,
            "fusion weights must be non-negative"
        );
        Ok(())
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            rule_weight: 0.6,
            model_weight: 0.4,
        }
    }
}

/// Final outcome of score fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub final_score: f64,
    pub is_high_risk: bool,
    pub action: RecommendedAction,
    /// Status the record is created with: FLAGGED iff high risk.
    pub initial_status: TransactionStatus,
}

/// Combine the scoring paths and map the result onto an action.
///
/// `model_score = None` means the model path is bypassed (ML disabled): the
/// rule score passes through with full weight rather than being scaled by
/// `rule_weight` against a permanent zero.
pub fn decide(
    rule_score: f64,
    model_score: Option<f64>,
    weights: &FusionWeights,
    fraud_threshold: f64,
) -> Decision {
    let combined = match model_score {
        Some(model) => weights.rule_weight * rule_score + weights.model_weight * model,
        None => rule_score,
    };

    if !(0.0..=1.0).contains(&combined) && combined.is_finite() {
        error!(score = combined, "fused score escaped [0,1] before clamp");
    }
    let final_score = if combined.is_finite() {
        combined.clamp(0.0, 1.0)
    } else {
        error!("fused score non-finite, clamping to 0");
        0.0
    };

    let is_high_risk = final_score >= fraud_threshold;
    Decision {
        final_score,
        is_high_risk,
        action: if is_high_risk {
            RecommendedAction::Deny
        } else {
            RecommendedAction::Allow
        },
        initial_status: if is_high_risk {
            TransactionStatus::Flagged
        } else {
            TransactionStatus::Pending
        },
    }
}
