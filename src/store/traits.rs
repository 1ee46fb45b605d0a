//! Context store interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::types::ConversationContext;

/// Key-value store of conversation contexts, keyed by conversation id.
///
/// Writes overwrite; there is no merge.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Write a context under `id`.
    async fn put(&self, id: Uuid, context: &ConversationContext) -> Result<(), StoreError>;

    /// Read a context back. `Ok(None)` when nothing is stored under `id`.
    async fn get(&self, id: Uuid) -> Result<Option<ConversationContext>, StoreError>;
}
