use cinder_primitives::{Bytes, B256};
use std::collections::BTreeMap;

/// Everything known about a block that failed validation or import.
///
/// Collaborators attach whatever diagnostic hints they have as tagged JSON
/// values; the coordinator assembles these into the report it logs and, if a
/// sentinel is configured, submits upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BadBlockReport {
    /// The raw block that failed.
    pub block: Bytes,
    /// A human readable description of the failure.
    pub error: String,
    /// Tagged diagnostic hints: uncle/transaction indices, VM traces,
    /// required-versus-got mismatches and the like.
    pub hints: BTreeMap<String, serde_json::Value>,
}

impl BadBlockReport {
    /// Creates a report for a failed block.
    pub fn new(block: Bytes, error: impl Into<String>) -> Self {
        BadBlockReport { block, error: error.into(), hints: BTreeMap::new() }
    }

    /// Attaches a diagnostic hint.
    pub fn with_hint(mut self, tag: impl Into<String>, value: serde_json::Value) -> Self {
        self.hints.insert(tag.into(), value);
        self
    }
}

impl std::fmt::Display for BadBlockReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bad block ({} hints): {}", self.hints.len(), self.error)
    }
}

/// Errors surfaced by the chain collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The requested block is not known to the chain.
    #[error("unknown block {0}")]
    UnknownBlock(B256),
    /// State for the requested block cannot be materialised.
    #[error("no state for block {0}")]
    UnknownState(B256),
    /// A block failed validation; the report carries the diagnostics.
    #[error("{0}")]
    BadBlock(Box<BadBlockReport>),
    /// The underlying store failed.
    #[error("database error: {0}")]
    Database(String),
}

impl ChainError {
    /// Returns the attached bad-block report, if this error carries one.
    pub fn as_bad_block(&self) -> Option<&BadBlockReport> {
        match self {
            ChainError::BadBlock(report) => Some(report),
            _ => None,
        }
    }
}
