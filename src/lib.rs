//! # helpdesk-tickets
//!
//! Helpdesk ticketing backend: tickets plus the lookup attributes that
//! classify them, persisted through a unit of work.
//!
//! ## Features
//!
//! - **Tickets** - Subject, customer, description, open time, and exactly one
//!   user, priority, status, service type and ticket type each
//! - **Attribute lookups** - Priorities, statuses, service types and ticket
//!   types resolved by name, created on first use
//! - **Users** - Credentialed writes delegated to an [`IdentityManager`]
//! - **Unit of work** - Adds and edits are staged and written only on save
//! - **Stores** - PostgreSQL via `sqlx`, or an in-memory store with the same
//!   constraints
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use helpdesk_tickets::{
//!     DataContext, InMemoryIdentityManager, InMemoryStore, Record, TicketDto,
//!     TicketService, User,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> helpdesk_tickets::Result<()> {
//! let store = InMemoryStore::with_records([Record::User(User {
//!     id: "1".to_string(),
//!     user_name: "agent".to_string(),
//!     email: None,
//! })])?;
//! let context = Arc::new(DataContext::new(Arc::new(store)));
//! let service = TicketService::from_context(context, Arc::new(InMemoryIdentityManager::new(6)));
//!
//! service
//!     .add(TicketDto {
//!         subject: "Printer jammed".to_string(),
//!         customer_name: "ACME".to_string(),
//!         description: "Second floor printer".to_string(),
//!         open_date_time: "2024-05-01T10:00:00Z".to_string(),
//!         priority_name: "High".to_string(),
//!         status_name: "Open".to_string(),
//!         service_type_name: "Hardware".to_string(),
//!         ticket_type_name: "Incident".to_string(),
//!         user_name: "agent".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//! service.save().await?;
//!
//! assert_eq!(service.get_all().await?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod converter;
pub mod identity;
pub mod models;
pub mod repository;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigError, TicketingConfig};
pub use context::{CommitReceipt, DataContext, Staged};
pub use converter::TicketConverter;
pub use identity::{IdentityError, IdentityManager, IdentityResult, InMemoryIdentityManager};
pub use models::*;
pub use repository::{
    resolve_or_stage, AttributeRepository, PriorityRepository, Repository, Resolution,
    ServiceTypeRepository, StatusRepository, TicketRepository, TicketTypeRepository,
    UserRepository,
};
pub use service::TicketService;
pub use store::{
    open as open_store, Change, ChangeOp, EntityStore, InMemoryStore, PgStore, StoreError,
};

use thiserror::Error;

/// Ticketing errors
#[derive(Error, Debug)]
pub enum TicketingError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid date: '{value}'")]
    InvalidDate { value: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Identity error: {}", format_identity_errors(.0))]
    Identity(Vec<IdentityError>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TicketingError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

fn format_identity_errors(errors: &[IdentityError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, TicketingError>;
