//! Behavioral rule engine.
//!
//! Each rule contributes a fixed weight when its trigger condition holds;
//! contributions sum commutatively and the total is clamped to [0, 1].
//! Rules are evaluated in fixed order over one window snapshot so the reason
//! list order is deterministic. Rules over optional inputs (geo, history,
//! device) contribute nothing when the input is absent.

use crate::types::{Location, Transaction};
use crate::windows::WindowSnapshot;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub const REASON_VELOCITY_MINUTE: &str = "High transaction velocity detected (per minute)";
pub const REASON_VELOCITY_HOUR: &str = "High transaction velocity detected (per hour)";
pub const REASON_AMOUNT_SPIKE: &str =
    "Transaction amount significantly higher than usual pattern";
pub const REASON_ROUND_AMOUNT: &str = "Round number transaction detected";
pub const REASON_DEVICE_SHARED: &str = "Device associated with multiple users";
pub const REASON_GEO_JUMP: &str = "Unusual geographical location";
pub const REASON_AMOUNT_CAP: &str = "Transaction amount exceeds threshold";
pub const REASON_NIGHT_TIME: &str = "Night time transaction";

const VELOCITY_MINUTE_WEIGHT: f64 = 0.8;
const VELOCITY_HOUR_WEIGHT: f64 = 0.6;
const AMOUNT_SPIKE_WEIGHT: f64 = 0.7;
const ROUND_AMOUNT_WEIGHT: f64 = 0.3;
const DEVICE_SHARED_WEIGHT: f64 = 0.7;
const GEO_JUMP_WEIGHT: f64 = 0.6;
const AMOUNT_CAP_WEIGHT: f64 = 0.5;
const NIGHT_TIME_WEIGHT: f64 = 0.3;

/// Per-hour velocity ceiling; unlike the per-minute ceiling it is not
/// operator-tunable.
const MAX_VELOCITY_PER_HOUR: u64 = 20;
const AMOUNT_SPIKE_MULTIPLIER: f64 = 10.0;
const AMOUNT_SPIKE_FLOOR: f64 = 100_000.0;
const ROUND_AMOUNT_MODULUS: f64 = 10_000.0;
const ROUND_AMOUNT_FLOOR: f64 = 50_000.0;
const GEO_JUMP_KM: f64 = 100.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Operator-tunable rule thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// Hard amount ceiling (amount cap rule).
    pub max_transaction_amount: f64,
    /// Reserved: defined for operators but not consumed by any rule yet.
    pub max_daily_transactions: u32,
    /// Per-minute velocity ceiling; the current transaction counts.
    pub max_velocity_per_minute: u64,
    /// Night window start hour, inclusive wrap-around range.
    pub night_time_start: u32,
    /// Night window end hour, inclusive.
    pub night_time_end: u32,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            max_transaction_amount: 1_000_000.0,
            max_daily_transactions: 50,
            max_velocity_per_minute: 5,
            night_time_start: 23,
            night_time_end: 5,
        }
    }
}

/// Outcome of rule evaluation for one transaction.
#[derive(Debug, Clone)]
pub struct RuleVerdict {
    /// Clamped sum of triggered contributions, in [0, 1].
    pub rule_score: f64,
    /// Triggered reasons, first-occurrence order, no duplicates.
    pub reasons: Vec<String>,
    /// Whether the rule score alone crosses the fraud threshold.
    pub is_fraudulent: bool,
}

/// Reasons are semantically a set but keep first-occurrence order for UX.
#[derive(Debug, Default)]
struct ReasonSet {
    reasons: Vec<&'static str>,
}

impl ReasonSet {
    fn push(&mut self, reason: &'static str) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.reasons.into_iter().map(String::from).collect()
    }
}

/// Great-circle distance in kilometres on a 6371 km sphere.
pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Inclusive wrap-around hour range test, e.g. 23..=5 covers 23,0,1,..,5.
fn in_night_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        (start..=end).contains(&hour)
    } else {
        hour >= start || hour <= end
    }
}

pub struct RuleEngine {
    thresholds: RuleThresholds,
    fraud_threshold: f64,
}

impl RuleEngine {
    pub fn new(thresholds: RuleThresholds, fraud_threshold: f64) -> Self {
        Self {
            thresholds,
            fraud_threshold,
        }
    }

    /// Evaluate every rule over the transaction and its window snapshot.
    pub fn evaluate(
        &self,
        tx: &Transaction,
        snapshot: &WindowSnapshot,
        now: DateTime<Utc>,
    ) -> RuleVerdict {
        let mut score = 0.0;
        let mut reasons = ReasonSet::default();
        let mut add = |score: &mut f64, weight: f64, reason: &'static str| {
            *score += weight;
            reasons.push(reason);
        };

        if snapshot.velocity_last_minute > self.thresholds.max_velocity_per_minute {
            add(&mut score, VELOCITY_MINUTE_WEIGHT, REASON_VELOCITY_MINUTE);
        }

        if snapshot.velocity_last_hour > MAX_VELOCITY_PER_HOUR {
            add(&mut score, VELOCITY_HOUR_WEIGHT, REASON_VELOCITY_HOUR);
        }

        if let Some(mean) = snapshot.amount_mean_24h {
            if tx.amount > AMOUNT_SPIKE_MULTIPLIER * mean && tx.amount > AMOUNT_SPIKE_FLOOR {
                add(&mut score, AMOUNT_SPIKE_WEIGHT, REASON_AMOUNT_SPIKE);
            }
        }

        if tx.amount >= ROUND_AMOUNT_FLOOR && tx.amount % ROUND_AMOUNT_MODULUS == 0.0 {
            add(&mut score, ROUND_AMOUNT_WEIGHT, REASON_ROUND_AMOUNT);
        }

        // Membership was tested before this transaction's insert.
        if let Some(prior_users) = snapshot.device_prior_users {
            if prior_users > 0 && !snapshot.device_known_user {
                add(&mut score, DEVICE_SHARED_WEIGHT, REASON_DEVICE_SHARED);
            }
        }

        // Skipped silently without a location: no contribution, no reason.
        if let (Some(new_loc), Some(last_loc)) = (&tx.location, &snapshot.previous_geo) {
            if haversine_km(new_loc, last_loc) > GEO_JUMP_KM {
                add(&mut score, GEO_JUMP_WEIGHT, REASON_GEO_JUMP);
            }
        }

        if tx.amount > self.thresholds.max_transaction_amount {
            add(&mut score, AMOUNT_CAP_WEIGHT, REASON_AMOUNT_CAP);
        }

        if in_night_window(
            now.hour(),
            self.thresholds.night_time_start,
            self.thresholds.night_time_end,
        ) {
            add(&mut score, NIGHT_TIME_WEIGHT, REASON_NIGHT_TIME);
        }

        let rule_score = score.min(1.0);
        RuleVerdict {
            rule_score,
            reasons: reasons.into_vec(),
            is_fraudulent: rule_score >= self.fraud_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;
    use crate::windows::TxWindowStats;

    const LAGOS: Location = Location { lat: 6.5244, lon: 3.3792 };
    const ABUJA: Location = Location { lat: 9.0765, lon: 7.3986 };

    fn engine() -> RuleEngine {
        RuleEngine::new(RuleThresholds::default(), 0.7)
    }

    fn midday() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    fn tx(amount: f64) -> Transaction {
        Transaction::new("u1", "d1", amount, TransactionType::Transfer)
    }

    fn quiet_snapshot() -> WindowSnapshot {
        WindowSnapshot {
            velocity_last_minute: 1,
            velocity_last_hour: 1,
            amount_mean_24h: None,
            previous_geo: None,
            device_prior_users: Some(0),
            device_known_user: false,
            unique_devices_24h: Some(1),
            tx_24h: Some(TxWindowStats { count: 1, avg_amount: 100.0 }),
            tx_7d: Some(TxWindowStats { count: 1, avg_amount: 100.0 }),
        }
    }

    #[test]
    fn test_clean_transaction_scores_zero() {
        let verdict = engine().evaluate(&tx(5_000.0), &quiet_snapshot(), midday());
        assert_eq!(verdict.rule_score, 0.0);
        assert!(verdict.reasons.is_empty());
        assert!(!verdict.is_fraudulent);
    }

    #[test]
    fn test_velocity_rules_can_both_fire() {
        let mut snapshot = quiet_snapshot();
        snapshot.velocity_last_minute = 6;
        snapshot.velocity_last_hour = 21;

        let verdict = engine().evaluate(&tx(5_000.0), &snapshot, midday());
        assert!((verdict.rule_score - 1.0).abs() < 1e-9); // 0.8 + 0.6 clamped
        assert_eq!(
            verdict.reasons,
            vec![REASON_VELOCITY_MINUTE, REASON_VELOCITY_HOUR]
        );
        assert!(verdict.is_fraudulent);
    }

    #[test]
    fn test_velocity_threshold_is_strict_greater() {
        let mut snapshot = quiet_snapshot();
        snapshot.velocity_last_minute = 5;
        let verdict = engine().evaluate(&tx(5_000.0), &snapshot, midday());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_amount_spike_requires_history_and_floor() {
        let mut snapshot = quiet_snapshot();

        // No history: silent.
        let verdict = engine().evaluate(&tx(500_001.0), &snapshot, midday());
        assert!(!verdict.reasons.contains(&REASON_AMOUNT_SPIKE.to_string()));

        // History but below the absolute floor: silent.
        snapshot.amount_mean_24h = Some(1_000.0);
        let verdict = engine().evaluate(&tx(99_000.0), &snapshot, midday());
        assert!(!verdict.reasons.contains(&REASON_AMOUNT_SPIKE.to_string()));

        // Ten times the mean and above the floor: fires.
        let verdict = engine().evaluate(&tx(150_001.0), &snapshot, midday());
        assert!(verdict.reasons.contains(&REASON_AMOUNT_SPIKE.to_string()));
        assert!((verdict.rule_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_round_amount_rule() {
        let verdict = engine().evaluate(&tx(50_000.0), &quiet_snapshot(), midday());
        assert_eq!(verdict.reasons, vec![REASON_ROUND_AMOUNT]);

        // Round but below the floor.
        let verdict = engine().evaluate(&tx(40_000.0), &quiet_snapshot(), midday());
        assert!(verdict.reasons.is_empty());

        // Large but not round.
        let verdict = engine().evaluate(&tx(50_001.0), &quiet_snapshot(), midday());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_device_sharing_fires_for_unknown_user_only() {
        let mut snapshot = quiet_snapshot();
        snapshot.device_prior_users = Some(1);
        snapshot.device_known_user = false;
        let verdict = engine().evaluate(&tx(1_000.0), &snapshot, midday());
        assert_eq!(verdict.reasons, vec![REASON_DEVICE_SHARED]);

        snapshot.device_known_user = true;
        let verdict = engine().evaluate(&tx(1_000.0), &snapshot, midday());
        assert!(verdict.reasons.is_empty());

        // Degraded device window: no contribution.
        snapshot.device_prior_users = None;
        snapshot.device_known_user = false;
        let verdict = engine().evaluate(&tx(1_000.0), &snapshot, midday());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_geo_jump_fires_beyond_100km() {
        let mut snapshot = quiet_snapshot();
        snapshot.previous_geo = Some(ABUJA);

        let mut transaction = tx(1_000.0);
        transaction.location = Some(LAGOS);
        let verdict = engine().evaluate(&transaction, &snapshot, midday());
        assert_eq!(verdict.reasons, vec![REASON_GEO_JUMP]);

        // Same city: a few km, below threshold.
        let mut transaction = tx(1_000.0);
        transaction.location = Some(Location { lat: 9.05, lon: 7.41 });
        let verdict = engine().evaluate(&transaction, &snapshot, midday());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_geo_rule_skipped_without_location() {
        let mut snapshot = quiet_snapshot();
        snapshot.previous_geo = Some(ABUJA);
        let verdict = engine().evaluate(&tx(1_000.0), &snapshot, midday());
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_amount_cap_and_night_combine() {
        let night: DateTime<Utc> = "2024-06-01T02:00:00Z".parse().unwrap();
        let verdict = engine().evaluate(&tx(2_000_001.0), &quiet_snapshot(), night);
        assert!((verdict.rule_score - 0.8).abs() < 1e-9);
        assert_eq!(verdict.reasons, vec![REASON_AMOUNT_CAP, REASON_NIGHT_TIME]);
        assert!(verdict.is_fraudulent);
    }

    #[test]
    fn test_night_window_wraps_midnight() {
        assert!(in_night_window(23, 23, 5));
        assert!(in_night_window(0, 23, 5));
        assert!(in_night_window(5, 23, 5));
        assert!(!in_night_window(6, 23, 5));
        assert!(!in_night_window(12, 23, 5));
        // Non-wrapping configuration.
        assert!(in_night_window(2, 1, 4));
        assert!(!in_night_window(5, 1, 4));
    }

    #[test]
    fn test_haversine_symmetry_and_magnitude() {
        let there = haversine_km(&LAGOS, &ABUJA);
        let back = haversine_km(&ABUJA, &LAGOS);
        assert!((there - back).abs() < 1e-9);
        // Lagos to Abuja is roughly 525 km.
        assert!((500.0..550.0).contains(&there), "got {there}");
        assert_eq!(haversine_km(&LAGOS, &LAGOS), 0.0);
    }

    #[test]
    fn test_score_clamped_to_one() {
        let night: DateTime<Utc> = "2024-06-01T02:00:00Z".parse().unwrap();
        let mut snapshot = quiet_snapshot();
        snapshot.velocity_last_minute = 100;
        snapshot.velocity_last_hour = 100;
        snapshot.amount_mean_24h = Some(1.0);
        snapshot.device_prior_users = Some(3);
        snapshot.previous_geo = Some(ABUJA);

        let mut transaction = tx(2_000_000.0);
        transaction.location = Some(LAGOS);

        let verdict = engine().evaluate(&transaction, &snapshot, night);
        assert_eq!(verdict.rule_score, 1.0);
        // Every triggered reason present exactly once, in evaluation order.
        assert_eq!(
            verdict.reasons,
            vec![
                REASON_VELOCITY_MINUTE,
                REASON_VELOCITY_HOUR,
                REASON_AMOUNT_SPIKE,
                REASON_ROUND_AMOUNT,
                REASON_DEVICE_SHARED,
                REASON_GEO_JUMP,
                REASON_AMOUNT_CAP,
                REASON_NIGHT_TIME,
            ]
        );
    }
}
