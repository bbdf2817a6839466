//! NATS intake for scoring requests and ground-truth labels.
//!
//! Scoring traffic joins a queue group so horizontally scaled engine
//! instances each take a disjoint share of the stream. Feedback labels use a
//! plain subscription instead: every instance applies them to its own model
//! replica, and the engine dedupes repeats on the record's status transition.
//! Payloads are decoded and validated here, before they reach the engine.

use crate::error::{RiskError, RiskResult};
use crate::types::{FraudReport, Transaction};
use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Wire payloads above this size are rejected before JSON decoding; a
/// well-formed scoring request is a few hundred bytes.
const MAX_PAYLOAD_BYTES: usize = 16 * 1024;

/// Queue group shared by scoring instances.
const SCORING_QUEUE_GROUP: &str = "risk-scorers";

/// Intake for transactions awaiting a risk score.
pub struct TransactionConsumer {
    client: Client,
    subject: String,
    queue_group: String,
}

impl TransactionConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            queue_group: SCORING_QUEUE_GROUP.to_string(),
        }
    }

    /// Override the queue group, e.g. to isolate a canary deployment from
    /// the main scoring fleet.
    pub fn with_queue_group(mut self, queue_group: &str) -> Self {
        self.queue_group = queue_group.to_string();
        self
    }

    /// Join the scoring queue group on the configured subject. Each
    /// transaction is delivered to exactly one member of the group.
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await?;
        info!(
            subject = %self.subject,
            queue_group = %self.queue_group,
            "scoring intake ready"
        );
        Ok(subscriber)
    }

    /// Decode and validate one wire payload.
    ///
    /// Transport-level problems (oversized or malformed payloads) surface as
    /// validation errors: they are caller-caused and mutate no state.
    pub fn decode(payload: &[u8]) -> RiskResult<Transaction> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(RiskError::validation([format!(
                "payload: {} bytes exceeds {MAX_PAYLOAD_BYTES}",
                payload.len()
            )]));
        }
        let tx: Transaction = serde_json::from_slice(payload)
            .map_err(|e| RiskError::validation([format!("payload: {e}")]))?;
        tx.validate()?;
        Ok(tx)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }
}

/// Intake for ground-truth fraud labels.
pub struct FeedbackConsumer {
    client: Client,
    subject: String,
}

impl FeedbackConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Plain subscription: labels fan out to every engine instance.
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "feedback intake ready");
        Ok(subscriber)
    }

    /// Decode one label payload, rejecting reports with no target id.
    pub fn decode(payload: &[u8]) -> RiskResult<FraudReport> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(RiskError::validation([format!(
                "payload: {} bytes exceeds {MAX_PAYLOAD_BYTES}",
                payload.len()
            )]));
        }
        let report: FraudReport = serde_json::from_slice(payload)
            .map_err(|e| RiskError::validation([format!("payload: {e}")]))?;
        if report.transaction_id.trim().is_empty() {
            return Err(RiskError::validation(["transaction_id"]));
        }
        Ok(report)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
