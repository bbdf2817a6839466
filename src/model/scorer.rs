//! Online learned scorer.
//!
//! A logistic-regression core over the fixed feature layout: sigmoid output,
//! binary cross-entropy gradient, single-sample Adam steps with L2 weight
//! decay. The contract with the rest of the engine is the feature layout and
//! the persisted (version, weights) artifact, not the internal topology.
//!
//! Weights sit behind a process-wide `RwLock`: any number of concurrent
//! predictions read a consistent snapshot while online updates serialize as
//! the single writer. Persistence happens outside the lock.

use crate::features::{FeatureStats, FeatureVector};
use crate::model::artifact::{ModelArtifact, OptimizerSpec, WeightsArtifact};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{info, warn};

/// Result of one model prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelScore {
    /// Risk probability in [0, 1].
    pub score: f64,
    /// True when the deterministic fallback produced the score.
    pub degraded: bool,
}

/// Deterministic amount-bucket score used when the model is unavailable or
/// produces a non-finite value. A contractual degraded mode, not an error.
pub fn fallback_score(amount: f64) -> f64 {
    if amount > 1_000_000.0 {
        0.9
    } else if amount > 500_000.0 {
        0.7
    } else if amount > 100_000.0 {
        0.5
    } else {
        0.2
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub struct LearnedScorer {
    state: RwLock<WeightsArtifact>,
    optimizer: OptimizerSpec,
    feature_stats: FeatureStats,
    artifact_dir: PathBuf,
}

impl LearnedScorer {
    /// Load persisted weights, or initialize the topology and persist it so
    /// the artifact exists before the first prediction.
    pub fn load_or_init(artifact_dir: impl Into<PathBuf>) -> Result<Self> {
        let artifact_dir = artifact_dir.into();
        let artifact = match ModelArtifact::load(&artifact_dir) {
            Ok(artifact) => {
                info!(
                    dir = %artifact_dir.display(),
                    updates = artifact.weights.updates,
                    "loaded persisted model weights"
                );
                artifact
            }
            Err(e) => {
                warn!(
                    dir = %artifact_dir.display(),
                    error = %e,
                    "no usable model artifact, initializing"
                );
                let artifact = ModelArtifact::initialize();
                artifact
                    .save(&artifact_dir)
                    .context("persisting initialized model")?;
                artifact
            }
        };

        Ok(Self {
            state: RwLock::new(artifact.weights),
            optimizer: artifact.topology.optimizer,
            feature_stats: artifact.topology.feature_stats,
            artifact_dir,
        })
    }

    /// Normalization stats bundled with this model's artifact.
    pub fn feature_stats(&self) -> &FeatureStats {
        &self.feature_stats
    }

    /// Total online updates applied so far.
    pub fn update_count(&self) -> u64 {
        self.state.read().map(|s| s.updates).unwrap_or(0)
    }

    /// Predict the fraud probability for one feature vector.
    ///
    /// Falls back to the amount-bucket score when the weights are poisoned
    /// or the forward pass yields a non-finite value.
    pub fn predict_risk(&self, features: &FeatureVector, amount: f64) -> ModelScore {
        let forward = {
            match self.state.read() {
                Ok(state) => {
                    let z: f64 = state
                        .weights
                        .iter()
                        .zip(features.as_slice())
                        .map(|(w, x)| w * x)
                        .sum::<f64>()
                        + state.bias;
                    Some(sigmoid(z))
                }
                Err(e) => {
                    warn!(error = %e, "model lock poisoned, using fallback score");
                    None
                }
            }
        };

        match forward {
            Some(score) if score.is_finite() => ModelScore { score, degraded: false },
            _ => ModelScore {
                score: fallback_score(amount),
                degraded: true,
            },
        }
    }

    /// One labeled gradient step (batch size 1, one epoch), then persist.
    ///
    /// Returns the post-update count. Updates serialize against each other
    /// and against in-flight predictions through the lock; the artifact
    /// write happens after the lock is released.
    pub fn update_with_label(&self, features: &FeatureVector, is_fraud: bool) -> Result<u64> {
        let snapshot = {
            let mut state = self
                .state
                .write()
                .map_err(|e| anyhow::anyhow!("model lock poisoned: {e}"))?;
            self.adam_step(&mut state, features, if is_fraud { 1.0 } else { 0.0 });
            state.updates += 1;
            state.clone()
        };

        let updates = snapshot.updates;
        let artifact = ModelArtifact {
            topology: crate::model::artifact::Topology {
                optimizer: self.optimizer.clone(),
                feature_stats: self.feature_stats.clone(),
                ..Default::default()
            },
            weights: snapshot,
        };
        artifact
            .save(&self.artifact_dir)
            .context("persisting updated model weights")?;

        Ok(updates)
    }

    /// In-place Adam update on the BCE gradient with L2 decay.
    fn adam_step(&self, state: &mut WeightsArtifact, features: &FeatureVector, label: f64) {
        let opt = &self.optimizer;

        let z: f64 = state
            .weights
            .iter()
            .zip(features.as_slice())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + state.bias;
        let p = sigmoid(z);
        // d(BCE)/dz for a sigmoid output.
        let g = p - label;

        state.step += 1;
        let t = state.step as i32;
        let bias_corr1 = 1.0 - opt.beta1.powi(t);
        let bias_corr2 = 1.0 - opt.beta2.powi(t);

        for i in 0..state.weights.len() {
            let grad = g * features.as_slice()[i] + opt.l2_penalty * state.weights[i];
            state.adam_m[i] = opt.beta1 * state.adam_m[i] + (1.0 - opt.beta1) * grad;
            state.adam_v[i] = opt.beta2 * state.adam_v[i] + (1.0 - opt.beta2) * grad * grad;
            let m_hat = state.adam_m[i] / bias_corr1;
            let v_hat = state.adam_v[i] / bias_corr2;
            state.weights[i] -= opt.learning_rate * m_hat / (v_hat.sqrt() + opt.epsilon);
        }

        state.adam_m_bias = opt.beta1 * state.adam_m_bias + (1.0 - opt.beta1) * g;
        state.adam_v_bias = opt.beta2 * state.adam_v_bias + (1.0 - opt.beta2) * g * g;
        let m_hat = state.adam_m_bias / bias_corr1;
        let v_hat = state.adam_v_bias / bias_corr2;
        state.bias -= opt.learning_rate * m_hat / (v_hat.sqrt() + opt.epsilon);
    }
}
