//! Entity store boundary.
//!
//! Repositories never talk to a database directly. They read committed rows
//! through [`EntityStore`] and hand it a batch of [`Change`]s when the unit of
//! work is saved. A batch is applied atomically or not at all.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TicketingConfig;
use crate::models::{EntityKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One staged row mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub op: ChangeOp,
    pub record: Record,
}

impl Change {
    pub fn insert(record: Record) -> Self {
        Self {
            op: ChangeOp::Insert,
            record,
        }
    }

    pub fn update(record: Record) -> Self {
        Self {
            op: ChangeOp::Update,
            record,
        }
    }

    pub fn delete(record: Record) -> Self {
        Self {
            op: ChangeOp::Delete,
            record,
        }
    }
}

/// Failures reported by a store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

/// Typed collections plus a single atomic commit.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Every committed row of one collection.
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Record>, StoreError>;

    /// Committed row by primary key.
    async fn find(&self, kind: EntityKind, id: &str) -> Result<Option<Record>, StoreError>;

    /// Applies all changes as one unit, in order.
    async fn commit(&self, changes: Vec<Change>) -> Result<(), StoreError>;
}

/// Opens the store named by the configuration: PostgreSQL (with migrations
/// applied) when a database URL is set, an empty in-memory store otherwise.
pub async fn open(config: &TicketingConfig) -> Result<Arc<dyn EntityStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections).await?;
            store.run_migrations().await?;
            tracing::info!(
                max_connections = config.max_connections,
                "using postgres ticket store"
            );
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("no DATABASE_URL set, using in-memory ticket store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
