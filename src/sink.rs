//! Transaction record sink.
//!
//! The engine only needs append, fetch-by-id, a status transition, and a
//! recency scan for the statistics surface. Durable storage is a deployment
//! concern; the in-memory implementation covers tests and single-node runs.

use crate::types::{TransactionRecord, TransactionStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn append(&self, record: TransactionRecord) -> Result<()>;
    async fn fetch(&self, id: &str) -> Result<Option<TransactionRecord>>;
    async fn update_status(&self, id: &str, status: TransactionStatus) -> Result<()>;
    /// Records created at or after `since`, unordered.
    async fn created_since(&self, since: DateTime<Utc>) -> Result<Vec<TransactionRecord>>;
}

/// Map-backed sink for tests and KV-less deployments.
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<HashMap<String, TransactionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionSink for MemorySink {
    async fn append(&self, record: TransactionRecord) -> Result<()> {
        let mut records = self.records.write().expect("sink poisoned");
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let records = self.records.read().expect("sink poisoned");
        Ok(records.get(id).cloned())
    }

    async fn update_status(&self, id: &str, status: TransactionStatus) -> Result<()> {
        let mut records = self.records.write().expect("sink poisoned");
        if let Some(record) = records.get_mut(id) {
            record.status = status;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn created_since(&self, since: DateTime<Utc>) -> Result<Vec<TransactionRecord>> {
        let records = self.records.read().expect("sink poisoned");
        Ok(records
            .values()
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Transaction, TransactionType};
    use chrono::Duration;

    fn record(amount: f64, status: TransactionStatus) -> TransactionRecord {
        let tx = Transaction::new("u1", "d1", amount, TransactionType::Transfer);
        TransactionRecord::new(tx, 0.1, status)
    }

    #[tokio::test]
    async fn test_append_and_fetch() {
        let sink = MemorySink::new();
        let rec = record(100.0, TransactionStatus::Pending);
        let id = rec.id.clone();
        sink.append(rec).await.unwrap();

        let fetched = sink.fetch(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, TransactionStatus::Pending);
        assert!(sink.fetch("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_transition_touches_updated_at() {
        let sink = MemorySink::new();
        let rec = record(100.0, TransactionStatus::Flagged);
        let id = rec.id.clone();
        let created = rec.updated_at;
        sink.append(rec).await.unwrap();

        sink.update_status(&id, TransactionStatus::Denied).await.unwrap();
        let fetched = sink.fetch(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Denied);
        assert!(fetched.updated_at >= created);
    }

    #[tokio::test]
    async fn test_created_since_filters_by_age() {
        let sink = MemorySink::new();
        let mut old = record(50.0, TransactionStatus::Pending);
        old.created_at = Utc::now() - Duration::hours(48);
        sink.append(old).await.unwrap();
        sink.append(record(75.0, TransactionStatus::Pending)).await.unwrap();

        let recent = sink.created_since(Utc::now() - Duration::hours(24)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].transaction.amount, 75.0);
    }
}
