//! Stats snapshots and the collaborator that produces them.

use crate::error::CollectionError;
use crate::types::now_millis;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One artifact of a snapshot; posted unmodified under its `doc_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsDocument {
    pub doc_type: String,
    pub body: Value,
}

impl StatsDocument {
    pub fn new(doc_type: impl Into<String>, body: Value) -> Self {
        Self {
            doc_type: doc_type.into(),
            body,
        }
    }
}

/// Point-in-time capture of cluster statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Milliseconds since Unix epoch.
    pub collected_at: u64,
    pub documents: Vec<StatsDocument>,
}

impl StatsSnapshot {
    pub fn new(collected_at: u64, documents: Vec<StatsDocument>) -> Self {
        Self {
            collected_at,
            documents,
        }
    }

    pub fn now(documents: Vec<StatsDocument>) -> Self {
        Self::new(now_millis(), documents)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Source of one snapshot per scheduler tick.
#[async_trait]
pub trait StatsCollector: Send + Sync {
    async fn collect(&self) -> Result<StatsSnapshot, CollectionError>;
}
