use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Change, ChangeOp, EntityStore, StoreError};
use crate::models::{EntityKind, Record, TicketRecord};

type Tables = HashMap<EntityKind, BTreeMap<String, Record>>;

/// Process-local store with the same constraints as the relational schema:
/// unique ids, unique attribute and user names, and resolvable ticket
/// references.
///
/// A commit is validated against a working copy and swapped in only when
/// every check passes, so a rejected batch leaves no trace.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store whose rows are already committed.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Result<Self, StoreError> {
        let mut tables = Tables::new();
        for record in records {
            apply(&mut tables, Change::insert(record))?;
        }
        check_integrity(&tables)?;

        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    /// Number of committed rows in one collection.
    pub async fn count(&self, kind: EntityKind) -> usize {
        self.tables.read().await.get(&kind).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find(&self, kind: EntityKind, id: &str) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&kind).and_then(|rows| rows.get(id)).cloned())
    }

    async fn commit(&self, changes: Vec<Change>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let mut working = tables.clone();

        let total = changes.len();
        for change in changes {
            apply(&mut working, change)?;
        }
        check_integrity(&working)?;

        *tables = working;
        tracing::debug!(changes = total, "in-memory store committed");
        Ok(())
    }
}

fn apply(tables: &mut Tables, change: Change) -> Result<(), StoreError> {
    let kind = change.record.kind();
    let id = change.record.id().to_string();
    let rows = tables.entry(kind).or_default();

    match change.op {
        ChangeOp::Insert => {
            if rows.contains_key(&id) {
                return Err(StoreError::constraint(format!("duplicate {kind} id '{id}'")));
            }
        }
        ChangeOp::Update | ChangeOp::Delete => {
            if !rows.contains_key(&id) {
                return Err(StoreError::constraint(format!(
                    "cannot {} missing {kind} '{id}'",
                    if change.op == ChangeOp::Update { "update" } else { "delete" }
                )));
            }
        }
    }

    if change.op == ChangeOp::Delete {
        rows.remove(&id);
    } else {
        rows.insert(id, change.record);
    }
    Ok(())
}

fn check_integrity(tables: &Tables) -> Result<(), StoreError> {
    for kind in EntityKind::ALL.into_iter().filter(|k| k.is_attribute()) {
        let mut seen = HashSet::new();
        for record in tables.get(&kind).into_iter().flat_map(BTreeMap::values) {
            if let Some(name) = record.attribute_name() {
                if !seen.insert(name) {
                    return Err(StoreError::constraint(format!(
                        "duplicate {kind} name '{name}'"
                    )));
                }
            }
        }
    }

    let mut user_names = HashSet::new();
    for record in tables.get(&EntityKind::User).into_iter().flat_map(BTreeMap::values) {
        if let Record::User(user) = record {
            if !user_names.insert(user.user_name.as_str()) {
                return Err(StoreError::constraint(format!(
                    "duplicate user name '{}'",
                    user.user_name
                )));
            }
        }
    }

    let tickets = tables.get(&EntityKind::Ticket).into_iter().flat_map(BTreeMap::values);
    for record in tickets {
        if let Record::Ticket(ticket) = record {
            check_references(tables, ticket)?;
        }
    }

    Ok(())
}

fn check_references(tables: &Tables, ticket: &TicketRecord) -> Result<(), StoreError> {
    let references = [
        (EntityKind::User, &ticket.user_id),
        (EntityKind::Priority, &ticket.priority_id),
        (EntityKind::Status, &ticket.status_id),
        (EntityKind::ServiceType, &ticket.service_type_id),
        (EntityKind::TicketType, &ticket.ticket_type_id),
    ];

    for (kind, id) in references {
        let exists = tables.get(&kind).is_some_and(|rows| rows.contains_key(id.as_str()));
        if !exists {
            return Err(StoreError::constraint(format!(
                "ticket '{}' references missing {kind} '{id}'",
                ticket.id
            )));
        }
    }

    Ok(())
}
