//! Unit of work shared by every repository of one request sequence.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::{Entity, Record};
use crate::store::{Change, ChangeOp, EntityStore, StoreError};

/// Handle to a row staged in a [`DataContext`], typed by what was staged.
pub struct Staged<T> {
    id: String,
    op: ChangeOp,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Staged<T> {
    fn new(id: String, op: ChangeOp) -> Self {
        Self {
            id,
            op,
            _entity: PhantomData,
        }
    }

    /// Identifier the row will be committed under.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn op(&self) -> ChangeOp {
        self.op
    }

    pub(crate) fn retype<U>(self) -> Staged<U> {
        Staged::new(self.id, self.op)
    }
}

impl<T> Clone for Staged<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone(), self.op)
    }
}

impl<T> fmt::Debug for Staged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Staged")
            .field("id", &self.id)
            .field("op", &self.op)
            .finish()
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Pending changes over an [`EntityStore`].
///
/// Reads always go to committed data. Staged rows become visible to other
/// readers only after [`DataContext::commit`] succeeds. A failed commit keeps
/// the pending set intact so it can be retried or discarded.
pub struct DataContext {
    store: Arc<dyn EntityStore>,
    pending: Mutex<Vec<Change>>,
}

impl DataContext {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub async fn fetch_all<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        self.store
            .fetch_all(T::KIND)
            .await?
            .into_iter()
            .map(expect_kind::<T>)
            .collect()
    }

    pub async fn find<T: Entity>(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.store
            .find(T::KIND, id)
            .await?
            .map(expect_kind::<T>)
            .transpose()
    }

    pub async fn stage_insert<T: Entity>(&self, entity: T) -> Staged<T> {
        self.stage(ChangeOp::Insert, entity.into_record()).await.retype()
    }

    pub async fn stage_update<T: Entity>(&self, entity: T) -> Staged<T> {
        self.stage(ChangeOp::Update, entity.into_record()).await.retype()
    }

    pub async fn stage_delete<T: Entity>(&self, entity: T) -> Staged<T> {
        self.stage(ChangeOp::Delete, entity.into_record()).await.retype()
    }

    /// Pending inserts of one collection, oldest first.
    pub async fn staged<T: Entity>(&self) -> Vec<T> {
        let pending = self.pending.lock().await;
        pending
            .iter()
            .filter(|c| c.op == ChangeOp::Insert && c.record.kind() == T::KIND)
            .filter_map(|c| T::from_record(c.record.clone()))
            .collect()
    }

    /// Pending inserts and updates of one collection, oldest first.
    pub async fn staged_writes<T: Entity>(&self) -> Vec<T> {
        let pending = self.pending.lock().await;
        pending
            .iter()
            .filter(|c| c.op != ChangeOp::Delete && c.record.kind() == T::KIND)
            .filter_map(|c| T::from_record(c.record.clone()))
            .collect()
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Commits every pending change as one unit.
    pub async fn commit(&self) -> Result<CommitReceipt, StoreError> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let receipt = pending.iter().fold(CommitReceipt::default(), |mut acc, c| {
            match c.op {
                ChangeOp::Insert => acc.inserted += 1,
                ChangeOp::Update => acc.updated += 1,
                ChangeOp::Delete => acc.deleted += 1,
            }
            acc
        });

        if let Err(e) = self.store.commit(pending.clone()).await {
            tracing::error!(pending = pending.len(), "Failed to commit unit of work: {}", e);
            return Err(e);
        }

        pending.clear();
        tracing::info!(
            inserted = receipt.inserted,
            updated = receipt.updated,
            deleted = receipt.deleted,
            "unit of work committed"
        );
        Ok(receipt)
    }

    /// Drops every pending change, returning how many there were.
    pub async fn discard(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    async fn stage(&self, op: ChangeOp, record: Record) -> Staged<Record> {
        let mut pending = self.pending.lock().await;
        let kind = record.kind();
        let id = record.id().to_string();

        let existing = pending
            .iter()
            .position(|c| c.record.kind() == kind && c.record.id() == id);

        let op = match existing {
            // Deleting a row that was never committed cancels its insert.
            Some(index) if op == ChangeOp::Delete && pending[index].op == ChangeOp::Insert => {
                pending.remove(index);
                op
            }
            Some(index) => {
                let change = &mut pending[index];
                // An insert not yet committed absorbs later edits.
                if change.op != ChangeOp::Insert {
                    change.op = op;
                }
                change.record = record;
                change.op
            }
            None => {
                pending.push(Change { op, record });
                op
            }
        };

        tracing::debug!(kind = %kind, id = %id, ?op, "staged change");
        Staged::new(id, op)
    }
}

fn expect_kind<T: Entity>(record: Record) -> Result<T, StoreError> {
    let kind = record.kind();
    T::from_record(record).ok_or_else(|| {
        StoreError::corrupt(format!("store returned a {kind} row for the {} collection", T::KIND))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Status};
    use crate::store::InMemoryStore;
    use tokio_test::assert_ok;

    fn priority(id: &str, name: &str) -> Priority {
        Priority {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn context() -> (Arc<InMemoryStore>, DataContext) {
        let store = Arc::new(InMemoryStore::new());
        let ctx = DataContext::new(store.clone());
        (store, ctx)
    }

    #[tokio::test]
    async fn staged_rows_are_invisible_until_commit() {
        let (store, ctx) = context();

        let handle = ctx.stage_insert(priority("1", "high")).await;
        assert_eq!(handle.id(), "1");
        assert_eq!(handle.op(), ChangeOp::Insert);

        assert!(ctx.fetch_all::<Priority>().await.unwrap().is_empty());
        assert_eq!(ctx.staged::<Priority>().await, vec![priority("1", "high")]);

        let receipt = ctx.commit().await.unwrap();
        assert_eq!(
            receipt,
            CommitReceipt {
                inserted: 1,
                updated: 0,
                deleted: 0
            }
        );
        assert_eq!(store.count(crate::models::EntityKind::Priority).await, 1);
        assert_eq!(ctx.pending_len().await, 0);
    }

    #[tokio::test]
    async fn restaging_an_insert_keeps_it_an_insert() {
        let (_store, ctx) = context();

        ctx.stage_insert(priority("1", "high")).await;
        let handle = ctx.stage_update(priority("1", "urgent")).await;

        assert_eq!(handle.op(), ChangeOp::Insert);
        assert_eq!(ctx.pending_len().await, 1);
        assert_eq!(ctx.staged::<Priority>().await, vec![priority("1", "urgent")]);
    }

    #[tokio::test]
    async fn deleting_an_uncommitted_insert_cancels_it() {
        let (_store, ctx) = context();

        ctx.stage_insert(priority("1", "high")).await;
        let handle = ctx.stage_delete(priority("1", "high")).await;

        assert_eq!(handle.op(), ChangeOp::Delete);
        assert_eq!(ctx.pending_len().await, 0);
    }

    #[tokio::test]
    async fn staged_is_filtered_by_collection() {
        let (_store, ctx) = context();

        ctx.stage_insert(priority("1", "high")).await;
        ctx.stage_insert(Status {
            id: "1".to_string(),
            name: "open".to_string(),
        })
        .await;

        assert_eq!(ctx.pending_len().await, 2);
        assert_eq!(ctx.staged::<Status>().await.len(), 1);
    }

    #[tokio::test]
    async fn staged_writes_include_updates_but_not_deletes() {
        let (_store, ctx) = context();

        ctx.stage_insert(priority("1", "high")).await;
        ctx.stage_update(priority("2", "low")).await;
        ctx.stage_delete(priority("3", "gone")).await;

        assert_eq!(ctx.staged::<Priority>().await.len(), 1);
        assert_eq!(
            ctx.staged_writes::<Priority>().await,
            vec![priority("1", "high"), priority("2", "low")]
        );
    }

    #[tokio::test]
    async fn failed_commit_keeps_pending_changes() {
        let (store, ctx) = context();

        ctx.stage_update(priority("missing", "x")).await;
        assert!(ctx.commit().await.is_err());
        assert_eq!(ctx.pending_len().await, 1);

        assert_eq!(ctx.discard().await, 1);
        assert_ok!(ctx.commit().await);
        assert_eq!(store.count(crate::models::EntityKind::Priority).await, 0);
    }
}
