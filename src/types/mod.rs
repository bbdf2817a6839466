//! Type definitions for the risk scoring engine

pub mod decision;
pub mod transaction;

pub use decision::{
    BucketCount, EngineStatistics, FraudReport, RecommendedAction, RiskAssessment, RiskBucket,
    StatusBreakdown,
};
pub use transaction::{
    CardDetails, Location, Transaction, TransactionRecord, TransactionStatus, TransactionType,
};
