//! Model artifact persistence.
//!
//! The artifact directory holds two files: `topology.json`, the descriptor
//! (dimensions, optimizer hyper-parameters, feature normalization stats),
//! and `weights.json`, the serialized parameters plus optimizer moments.
//! Both are rewritten after every successful online update.

use crate::features::{FeatureStats, FEATURE_COUNT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const TOPOLOGY_FILE: &str = "topology.json";
pub const WEIGHTS_FILE: &str = "weights.json";

/// Optimizer hyper-parameters, persisted so a reloaded model resumes the
/// same schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizerSpec {
    pub name: String,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub l2_penalty: f64,
}

impl Default for OptimizerSpec {
    fn default() -> Self {
        Self {
            name: "adam".to_string(),
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            l2_penalty: 1e-3,
        }
    }
}

/// Topology descriptor for the online classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    pub input_dim: usize,
    pub output_activation: String,
    pub loss: String,
    pub optimizer: OptimizerSpec,
    pub feature_stats: FeatureStats,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            input_dim: FEATURE_COUNT,
            output_activation: "sigmoid".to_string(),
            loss: "binary_cross_entropy".to_string(),
            optimizer: OptimizerSpec::default(),
            feature_stats: FeatureStats::default(),
        }
    }
}

/// Serialized parameters and Adam moments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightsArtifact {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub adam_m: Vec<f64>,
    pub adam_v: Vec<f64>,
    pub adam_m_bias: f64,
    pub adam_v_bias: f64,
    /// Adam time step (bias-correction exponent).
    pub step: u64,
    /// Total online updates applied since initialization.
    pub updates: u64,
}

impl WeightsArtifact {
    pub fn zeroed(dim: usize) -> Self {
        Self {
            weights: vec![0.0; dim],
            bias: 0.0,
            adam_m: vec![0.0; dim],
            adam_v: vec![0.0; dim],
            adam_m_bias: 0.0,
            adam_v_bias: 0.0,
            step: 0,
            updates: 0,
        }
    }
}

/// On-disk model artifact: descriptor plus weights.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub topology: Topology,
    pub weights: WeightsArtifact,
}

impl ModelArtifact {
    /// Fresh artifact with zeroed parameters.
    pub fn initialize() -> Self {
        let topology = Topology::default();
        let weights = WeightsArtifact::zeroed(topology.input_dim);
        Self { topology, weights }
    }

    /// Load both files from `dir`, verifying dimensional consistency.
    pub fn load(dir: &Path) -> Result<Self> {
        let topology: Topology = read_json(&dir.join(TOPOLOGY_FILE))?;
        let weights: WeightsArtifact = read_json(&dir.join(WEIGHTS_FILE))?;

        anyhow::ensure!(
            topology.input_dim == FEATURE_COUNT,
            "artifact input dim {} does not match feature layout {}",
            topology.input_dim,
            FEATURE_COUNT
        );
        anyhow::ensure!(
            weights.weights.len() == topology.input_dim
                && weights.adam_m.len() == topology.input_dim
                && weights.adam_v.len() == topology.input_dim,
            "weight tensors do not match topology"
        );

        Ok(Self { topology, weights })
    }

    /// Persist both files, creating the directory if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating model dir {}", dir.display()))?;
        write_json(&dir.join(TOPOLOGY_FILE), &self.topology)?;
        write_json(&dir.join(WEIGHTS_FILE), &self.weights)?;
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("risk-model-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_artifact_round_trip() {
        let dir = temp_dir();
        let mut artifact = ModelArtifact::initialize();
        artifact.weights.weights[0] = 0.5;
        artifact.weights.updates = 7;

        artifact.save(&dir).unwrap();
        let loaded = ModelArtifact::load(&dir).unwrap();
        assert_eq!(loaded, artifact);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_dir_fails() {
        assert!(ModelArtifact::load(&temp_dir()).is_err());
    }

    #[test]
    fn test_load_rejects_mismatched_tensors() {
        let dir = temp_dir();
        let mut artifact = ModelArtifact::initialize();
        artifact.save(&dir).unwrap();

        artifact.weights.weights.pop();
        artifact.save(&dir).unwrap();
        assert!(ModelArtifact::load(&dir).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
