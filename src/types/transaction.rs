//! Transaction data structures for risk scoring.

use crate::error::{RiskError, RiskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment channel the transaction arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Transfer,
    Card,
    Qr,
    Pos,
}

/// Lifecycle status of a persisted transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Denied,
    Flagged,
}

impl TransactionStatus {
    /// A record that has already received ground truth keeps it; repeated
    /// feedback on the same id is deduped on this.
    pub fn is_labeled(self) -> bool {
        matches!(self, TransactionStatus::Approved | TransactionStatus::Denied)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Approved => write!(f, "APPROVED"),
            TransactionStatus::Denied => write!(f, "DENIED"),
            TransactionStatus::Flagged => write!(f, "FLAGGED"),
        }
    }
}

/// WGS-84 point carried on transactions that have one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Card metadata for CARD transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub last4: String,
    pub bin: String,
    pub country: String,
}

/// A transaction submitted for scoring.
///
/// `amount` is a non-negative decimal in a single caller-normalized currency.
/// `created_at` defaults to wall-clock now when absent; `ip_address` is
/// filled in by the transport and carried onto the persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub user_id: String,
    pub device_id: String,
    pub amount: f64,
    pub currency: String,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub beneficiary_account: Option<String>,
    #[serde(default)]
    pub beneficiary_bank_code: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub card_details: Option<CardDetails>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a transaction with the required fields; optional fields empty.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        amount: f64,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            amount,
            currency: "NGN".to_string(),
            transaction_type,
            location: None,
            beneficiary_account: None,
            beneficiary_bank_code: None,
            merchant_id: None,
            card_details: None,
            ip_address: None,
            created_at: None,
        }
    }

    /// The instant the engine treats as "now" for this transaction.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or_else(Utc::now)
    }

    /// Field-level validation. Collects every offending field so callers
    /// get the complete list in one round trip.
    pub fn validate(&self) -> RiskResult<()> {
        let mut fields = Vec::new();

        if self.user_id.trim().is_empty() {
            fields.push("user_id");
        }
        if self.device_id.trim().is_empty() {
            fields.push("device_id");
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            fields.push("amount");
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            fields.push("currency");
        }
        if let Some(loc) = &self.location {
            if !(-90.0..=90.0).contains(&loc.lat) {
                fields.push("location.lat");
            }
            if !(-180.0..=180.0).contains(&loc.lon) {
                fields.push("location.lon");
            }
        }
        if let Some(card) = &self.card_details {
            if card.last4.len() != 4 || !card.last4.chars().all(|c| c.is_ascii_digit()) {
                fields.push("card_details.last4");
            }
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(RiskError::validation(fields))
        }
    }
}

/// The persisted form of a scored transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub transaction: Transaction,
    pub risk_score: f64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Build a record for a freshly scored transaction. The flag invariant
    /// (FLAGGED iff high risk at creation) is enforced by the caller passing
    /// the status derived from the final score.
    pub fn new(transaction: Transaction, risk_score: f64, status: TransactionStatus) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transaction,
            risk_score,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}
