//! NATS publication of risk assessments.
//!
//! Every assessment goes out on the decisions subject; high-risk outcomes
//! are additionally fanned out on a narrower `<subject>.high-risk` subject
//! so case-review tooling can subscribe to denials without filtering the
//! full decision stream.

use crate::types::RiskAssessment;
use anyhow::Result;
use async_nats::Client;
use tracing::{debug, error};

/// Alert fan-out subject derived from the decisions subject.
fn alert_subject_for(subject: &str) -> String {
    format!("{subject}.high-risk")
}

fn encode(assessment: &RiskAssessment) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(assessment)?)
}

/// Producer for publishing risk assessments to NATS
#[derive(Clone)]
pub struct DecisionProducer {
    client: Client,
    subject: String,
    alert_subject: String,
}

impl DecisionProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            alert_subject: alert_subject_for(subject),
        }
    }

    /// Publish one assessment. High-risk outcomes also hit the alert
    /// subject, carrying the same payload.
    pub async fn publish(&self, assessment: &RiskAssessment) -> Result<()> {
        let payload = encode(assessment)?;

        self.client
            .publish(self.subject.clone(), payload.clone().into())
            .await?;
        if assessment.is_high_risk {
            self.client
                .publish(self.alert_subject.clone(), payload.into())
                .await?;
        }

        debug!(
            transaction_id = %assessment.transaction_id,
            risk_score = assessment.risk_score,
            action = ?assessment.recommended_action,
            reasons = assessment.reasons.len(),
            high_risk = assessment.is_high_risk,
            "risk assessment published"
        );

        Ok(())
    }

    /// Publish a batch, returning how many went out. Failures are logged
    /// and skipped so one bad assessment does not hold back the rest.
    pub async fn publish_batch(&self, assessments: &[RiskAssessment]) -> usize {
        let mut published = 0;
        for assessment in assessments {
            match self.publish(assessment).await {
                Ok(()) => published += 1,
                Err(e) => error!(
                    transaction_id = %assessment.transaction_id,
                    error = %e,
                    "failed to publish assessment"
                ),
            }
        }
        published
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn alert_subject(&self) -> &str {
        &self.alert_subject
    }
}
