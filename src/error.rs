//! Error types for the intake pipeline.
//!
//! Only store failures are fatal to a run. Everything an agent can get wrong
//! is either a marker on the returned record or an [`AgentFault`] that the
//! orchestrator downgrades.

use uuid::Uuid;

/// Top-level error type, returned while assembling the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Context store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// An unexpected failure inside an extraction agent.
///
/// Agents report expected problems (bad headers, unknown JSON shapes) on the
/// record itself. This type is reserved for faults the agent could not
/// contain; the orchestrator turns it into an `Unclassified` record.
#[derive(Debug, Clone, thiserror::Error)]
#[error("agent {agent} faulted: {reason}")]
pub struct AgentFault {
    pub agent: String,
    pub reason: String,
}

impl AgentFault {
    pub fn new(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            reason: reason.into(),
        }
    }
}

/// Text-extraction failures. Never escape the PDF agent.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unreadable document: {0}")]
    Unreadable(String),

    #[error("Extractor panicked: {0}")]
    Panicked(String),
}

/// Pipeline run failures. The only variant is fatal to the whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Context store unavailable for conversation {conversation_id}: {source}")]
    StoreUnavailable {
        conversation_id: Uuid,
        #[source]
        source: StoreError,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
