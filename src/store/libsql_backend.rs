//! libSQL context store.
//!
//! One row per conversation. The full context is stored as JSON; format,
//! intent, action and status are copied into columns for querying.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::types::ConversationContext;
use crate::store::migrations;
use crate::store::traits::ContextStore;

/// libSQL-backed [`ContextStore`].
///
/// Holds a single connection reused for all operations.
pub struct LibSqlContextStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlContextStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Context store opened");
        Ok(store)
    }

    /// In-memory database (for tests and ephemeral runs).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Number of stored contexts.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM conversation_contexts", ())
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count contexts: {e}")))?;
        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read count: {e}")))?
        {
            Some(row) => row
                .get::<i64>(0)
                .map_err(|e| StoreError::Query(format!("Failed to parse count: {e}"))),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl ContextStore for LibSqlContextStore {
    async fn put(&self, id: Uuid, context: &ConversationContext) -> Result<(), StoreError> {
        let json = serde_json::to_string(context)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO conversation_contexts
                    (id, format, intent, action_type, status, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    context.classification.format.label(),
                    context.classification.intent.label(),
                    context.action.action_type.label(),
                    context.action.status.label(),
                    json,
                    context.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to write context {id}: {e}")))?;
        debug!(conversation_id = %id, "Context written");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConversationContext>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT context FROM conversation_contexts WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read context {id}: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch row: {e}")))?
        else {
            return Ok(None);
        };

        let json: String = row
            .get(0)
            .map_err(|e| StoreError::Query(format!("Failed to read context column: {e}")))?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}
