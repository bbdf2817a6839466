//! Risk Scoring Engine Library
//!
//! Real-time evaluation of retail payment transactions: a behavioral rule
//! engine over short-lived KV state fused with an online-updateable learned
//! scorer, producing a bounded risk score, human-readable reasons and a
//! recommended action.

pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod features;
pub mod fusion;
pub mod kv;
pub mod metrics;
pub mod model;
pub mod producer;
pub mod rules;
pub mod sink;
pub mod types;
pub mod windows;

pub use config::AppConfig;
pub use consumer::{FeedbackConsumer, TransactionConsumer};
pub use engine::RiskEngine;
pub use error::{RiskError, RiskResult};
pub use features::FeatureExtractor;
pub use kv::{KvStore, MemoryKv, RedisStore};
pub use model::LearnedScorer;
pub use producer::DecisionProducer;
pub use sink::{MemorySink, TransactionSink};
pub use types::{FraudReport, RiskAssessment, Transaction};
