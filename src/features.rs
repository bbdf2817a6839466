//! Feature extraction for the learned scorer.
//!
//! Transforms a transaction plus its window snapshot into a fixed-length
//! vector, z-score normalized against the stats table carried in the model
//! artifact. Missing history contributes the feature mean (normalized 0);
//! a non-finite feeder value is replaced the same way, so the output is
//! always finite.

use crate::types::Transaction;
use crate::windows::WindowSnapshot;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

pub const FEATURE_COUNT: usize = 10;

/// Feature names in extraction order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "hour",
    "day_of_week",
    "is_new_device",
    "device_user_count",
    "tx_count_24h",
    "avg_amount_24h",
    "tx_count_7d",
    "avg_amount_7d",
    "unique_devices_24h",
];

/// Fixed-length, finite feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Per-feature normalization table, persisted with the model artifact.
///
/// Bootstrap defaults approximate a retail payment profile and are replaced
/// wholesale when a persisted artifact carries calibrated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub means: [f64; FEATURE_COUNT],
    pub stds: [f64; FEATURE_COUNT],
}

impl Default for FeatureStats {
    fn default() -> Self {
        Self {
            means: [
                50_000.0, // amount
                12.0,     // hour
                3.0,      // day_of_week
                0.1,      // is_new_device
                1.5,      // device_user_count
                5.0,      // tx_count_24h
                50_000.0, // avg_amount_24h
                20.0,     // tx_count_7d
                50_000.0, // avg_amount_7d
                1.2,      // unique_devices_24h
            ],
            stds: [
                200_000.0, // amount
                6.93,      // hour
                2.0,       // day_of_week
                0.3,       // is_new_device
                2.0,       // device_user_count
                10.0,      // tx_count_24h
                150_000.0, // avg_amount_24h
                40.0,      // tx_count_7d
                150_000.0, // avg_amount_7d
                1.0,       // unique_devices_24h
            ],
        }
    }
}

pub struct FeatureExtractor {
    stats: FeatureStats,
}

impl FeatureExtractor {
    pub fn new(stats: FeatureStats) -> Self {
        Self { stats }
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn stats(&self) -> &FeatureStats {
        &self.stats
    }

    /// Extract the normalized vector for one transaction.
    ///
    /// `now` is the transaction's effective time; the snapshot is the same
    /// one the rule engine consumed.
    pub fn extract(
        &self,
        tx: &Transaction,
        snapshot: &WindowSnapshot,
        now: DateTime<Utc>,
    ) -> FeatureVector {
        // Device user count includes the current user once the insert lands.
        let device_user_count = snapshot.device_prior_users.map(|prior| {
            if snapshot.device_known_user {
                prior as f64
            } else {
                prior as f64 + 1.0
            }
        });
        let is_new_device = snapshot
            .device_prior_users
            .map(|prior| if prior == 0 { 1.0 } else { 0.0 });

        let raw: [Option<f64>; FEATURE_COUNT] = [
            Some(tx.amount),
            Some(now.hour() as f64),
            Some(now.weekday().num_days_from_monday() as f64),
            is_new_device,
            device_user_count,
            snapshot.tx_24h.map(|s| s.count as f64),
            snapshot.tx_24h.map(|s| s.avg_amount),
            snapshot.tx_7d.map(|s| s.count as f64),
            snapshot.tx_7d.map(|s| s.avg_amount),
            snapshot.unique_devices_24h.map(|c| c as f64),
        ];

        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in raw.into_iter().enumerate() {
            out[i] = self.normalize(i, value);
        }
        FeatureVector(out)
    }

    /// `(x − μ)/σ`; absent or non-finite inputs collapse to the mean.
    fn normalize(&self, index: usize, value: Option<f64>) -> f64 {
        let mean = self.stats.means[index];
        let std = self.stats.stds[index];
        let x = match value {
            Some(v) if v.is_finite() => v,
            _ => mean,
        };
        if std <= f64::EPSILON {
            return 0.0;
        }
        let z = (x - mean) / std;
        if z.is_finite() {
            z
        } else {
            error!(feature = FEATURE_NAMES[index], "non-finite normalized feature, clamping");
            0.0
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureStats::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;
    use crate::windows::TxWindowStats;

    fn midday() -> DateTime<Utc> {
        // A Saturday.
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    fn tx(amount: f64) -> Transaction {
        Transaction::new("u1", "d1", amount, TransactionType::Transfer)
    }

    #[test]
    fn test_vector_length_and_finiteness() {
        let extractor = FeatureExtractor::default();
        let vector = extractor.extract(&tx(5_000.0), &WindowSnapshot::default(), midday());
        assert_eq!(vector.as_slice().len(), FEATURE_COUNT);
        assert!(vector.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_missing_history_normalizes_to_zero() {
        let extractor = FeatureExtractor::default();
        let vector = extractor.extract(&tx(5_000.0), &WindowSnapshot::default(), midday());
        // Everything derived from absent windows sits at the mean.
        for i in 3..FEATURE_COUNT {
            assert_eq!(vector.0[i], 0.0, "feature {}", FEATURE_NAMES[i]);
        }
    }

    #[test]
    fn test_known_values_are_z_scored() {
        let extractor = FeatureExtractor::default();
        let snapshot = WindowSnapshot {
            velocity_last_minute: 1,
            velocity_last_hour: 1,
            amount_mean_24h: Some(5_000.0),
            previous_geo: None,
            device_prior_users: Some(0),
            device_known_user: false,
            unique_devices_24h: Some(1),
            tx_24h: Some(TxWindowStats { count: 5, avg_amount: 50_000.0 }),
            tx_7d: Some(TxWindowStats { count: 20, avg_amount: 50_000.0 }),
        };
        let vector = extractor.extract(&tx(250_000.0), &snapshot, midday());

        // amount: (250000 - 50000) / 200000 = 1.0
        assert!((vector.0[0] - 1.0).abs() < 1e-9);
        // hour: (12 - 12) / 6.93 = 0
        assert_eq!(vector.0[1], 0.0);
        // Saturday: (5 - 3) / 2 = 1.0
        assert!((vector.0[2] - 1.0).abs() < 1e-9);
        // New device: (1 - 0.1) / 0.3 = 3.0
        assert!((vector.0[3] - 3.0).abs() < 1e-9);
        // Exactly-at-mean aggregates normalize to 0.
        assert_eq!(vector.0[5], 0.0);
        assert_eq!(vector.0[6], 0.0);
    }

    #[test]
    fn test_non_finite_feeder_replaced_by_mean() {
        let extractor = FeatureExtractor::default();
        let snapshot = WindowSnapshot {
            tx_24h: Some(TxWindowStats { count: 1, avg_amount: f64::NAN }),
            ..WindowSnapshot::default()
        };
        let vector = extractor.extract(&tx(f64::INFINITY), &snapshot, midday());
        assert!(vector.as_slice().iter().all(|v| v.is_finite()));
        assert_eq!(vector.0[0], 0.0);
        assert_eq!(vector.0[6], 0.0);
    }

    #[test]
    fn test_device_user_count_includes_current_user() {
        let extractor = FeatureExtractor::default();
        let mut snapshot = WindowSnapshot::default();

        // Unknown user on a device with 2 prior users: count becomes 3.
        snapshot.device_prior_users = Some(2);
        snapshot.device_known_user = false;
        let vector = extractor.extract(&tx(1_000.0), &snapshot, midday());
        let expected = (3.0 - 1.5) / 2.0;
        assert!((vector.0[4] - expected).abs() < 1e-9);

        // Known user: count unchanged.
        snapshot.device_known_user = true;
        let vector = extractor.extract(&tx(1_000.0), &snapshot, midday());
        let expected = (2.0 - 1.5) / 2.0;
        assert!((vector.0[4] - expected).abs() < 1e-9);
    }
}
