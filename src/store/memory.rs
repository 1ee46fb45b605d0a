//! In-memory context store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::types::ConversationContext;
use crate::store::traits::ContextStore;

/// Contexts held in a map for the life of the process.
#[derive(Default)]
pub struct MemoryContextStore {
    contexts: RwLock<HashMap<Uuid, ConversationContext>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn put(&self, id: Uuid, context: &ConversationContext) -> Result<(), StoreError> {
        self.contexts.write().await.insert(id, context.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConversationContext>, StoreError> {
        Ok(self.contexts.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::types::{
        ActionDecision, ActionStatus, ActionType, ClassificationResult, ExtractionRecord, RawInput,
    };

    fn context() -> ConversationContext {
        let classification = ClassificationResult::unrecognized();
        ConversationContext {
            id: Uuid::new_v4(),
            raw_input_ref: RawInput::text("hello").to_ref(),
            extraction: ExtractionRecord::not_applicable(&classification),
            classification,
            action: ActionDecision {
                action_type: ActionType::InputClassificationRequired,
                status: ActionStatus::PendingClassification,
                rationale: None,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryContextStore::new();
        let ctx = context();
        store.put(ctx.id, &ctx).await.unwrap();
        assert_eq!(store.get(ctx.id).await.unwrap(), Some(ctx));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn missing_is_none() {
        let store = MemoryContextStore::new();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }
}
