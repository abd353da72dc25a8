use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::{CommitReceipt, DataContext, Staged};
use crate::identity::{IdentityManager, IdentityResult};
use crate::models::{
    Attribute, Entity, EntityKind, Priority, ServiceType, Status, Ticket, TicketRecord, TicketType,
    User,
};
use crate::store::StoreError;
use crate::{Result, TicketingError};

/// Typed access to one collection through a shared unit of work.
#[async_trait]
pub trait Repository<T: Send + 'static>: Send + Sync {
    /// Every committed row.
    async fn get_all(&self) -> Result<Vec<T>>;

    /// Committed row by id, `NotFound` otherwise.
    async fn get_by_id(&self, id: &str) -> Result<T>;

    /// Stages a new row.
    async fn add(&self, item: T) -> Result<Staged<T>>;

    /// Commits everything staged in the shared unit of work.
    async fn save(&self) -> Result<CommitReceipt>;
}

/// Outcome of a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Existing(T),
    Created(T),
}

impl<T> Resolution<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Existing(item) | Self::Created(item) => item,
        }
    }
}

/// Finds `name` among committed then staged rows, or builds a new row with an
/// id from `new_id`. Staging a `Created` row is left to the caller.
pub fn resolve_or_stage<T: Attribute>(
    committed: &[T],
    staged: &[T],
    name: &str,
    new_id: impl FnOnce() -> String,
) -> Resolution<T> {
    committed
        .iter()
        .chain(staged)
        .find(|item| item.name() == name)
        .cloned()
        .map_or_else(
            || Resolution::Created(T::with_name(new_id(), name.to_string())),
            Resolution::Existing,
        )
}

/// Repository over one `{id, name}` lookup collection.
pub struct AttributeRepository<T> {
    context: Arc<DataContext>,
    _entity: PhantomData<fn() -> T>,
}

pub type PriorityRepository = AttributeRepository<Priority>;
pub type StatusRepository = AttributeRepository<Status>;
pub type ServiceTypeRepository = AttributeRepository<ServiceType>;
pub type TicketTypeRepository = AttributeRepository<TicketType>;

impl<T: Attribute> AttributeRepository<T> {
    pub fn new(context: Arc<DataContext>) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    /// Get-or-create by name. A new row is staged, not committed.
    /// Names are matched and stored exactly as given.
    pub async fn get_by_name(&self, name: &str) -> Result<T> {
        if name.trim().is_empty() {
            return Err(TicketingError::invalid_input(format!(
                "{} name is required",
                T::KIND
            )));
        }

        let committed = self.context.fetch_all::<T>().await?;
        let staged = self.context.staged::<T>().await;

        match resolve_or_stage(&committed, &staged, name, || Uuid::new_v4().to_string()) {
            Resolution::Existing(item) => Ok(item),
            Resolution::Created(item) => {
                let kind = T::KIND;
                tracing::debug!(kind = %kind, name = %name, id = %item.id(), "creating attribute");
                self.context.stage_insert(item.clone()).await;
                Ok(item)
            }
        }
    }
}

#[async_trait]
impl<T: Attribute> Repository<T> for AttributeRepository<T> {
    async fn get_all(&self) -> Result<Vec<T>> {
        Ok(self.context.fetch_all::<T>().await?)
    }

    async fn get_by_id(&self, id: &str) -> Result<T> {
        self.context
            .find::<T>(id)
            .await?
            .ok_or_else(|| TicketingError::not_found(T::KIND, id))
    }

    async fn add(&self, item: T) -> Result<Staged<T>> {
        Ok(self.context.stage_insert(item).await)
    }

    async fn save(&self) -> Result<CommitReceipt> {
        Ok(self.context.commit().await?)
    }
}

/// Users are read from the store; writes go through the identity manager and
/// are then mirrored into the unit of work.
pub struct UserRepository {
    context: Arc<DataContext>,
    identity: Arc<dyn IdentityManager>,
}

impl UserRepository {
    pub fn new(context: Arc<DataContext>, identity: Arc<dyn IdentityManager>) -> Self {
        Self { context, identity }
    }

    pub async fn get_all(&self) -> Result<Vec<User>> {
        Ok(self.context.fetch_all::<User>().await?)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<User> {
        self.context
            .find::<User>(id)
            .await?
            .ok_or_else(|| TicketingError::not_found(EntityKind::User, id))
    }

    /// Users are never created implicitly, so an unknown name is `NotFound`.
    pub async fn get_by_user_name(&self, user_name: &str) -> Result<User> {
        self.context
            .fetch_all::<User>()
            .await?
            .into_iter()
            .find(|u| u.user_name == user_name)
            .ok_or_else(|| TicketingError::not_found(EntityKind::User, user_name))
    }

    pub async fn create(&self, user: User, credential: &str) -> Result<Staged<User>> {
        let result = self.identity.create(&user, credential).await;
        check_identity(&user, "create", result)?;
        Ok(self.context.stage_insert(user).await)
    }

    pub async fn update(&self, user: User) -> Result<Staged<User>> {
        let result = self.identity.update(&user).await;
        check_identity(&user, "update", result)?;
        Ok(self.context.stage_update(user).await)
    }

    /// Refused while any committed or staged ticket is assigned to the user,
    /// so the identity manager never forgets a user the store must keep.
    pub async fn delete(&self, user: User) -> Result<Staged<User>> {
        let assigned = self.assigned_tickets(&user.id).await?;
        if let Some(ticket_id) = assigned.first() {
            tracing::warn!(
                user_id = %user.id,
                tickets = assigned.len(),
                "refusing to delete user with assigned tickets"
            );
            return Err(StoreError::constraint(format!(
                "ticket '{ticket_id}' references user '{}'",
                user.id
            ))
            .into());
        }

        let result = self.identity.delete(&user).await;
        check_identity(&user, "delete", result)?;
        Ok(self.context.stage_delete(user).await)
    }

    pub async fn save(&self) -> Result<CommitReceipt> {
        Ok(self.context.commit().await?)
    }

    /// Ids of tickets assigned to `user_id` once pending writes are applied.
    async fn assigned_tickets(&self, user_id: &str) -> Result<Vec<String>> {
        let staged = self.context.staged_writes::<TicketRecord>().await;
        let committed = self.context.fetch_all::<TicketRecord>().await?;

        let superseded: HashSet<&str> = staged.iter().map(|t| t.id.as_str()).collect();
        Ok(committed
            .iter()
            .filter(|t| !superseded.contains(t.id.as_str()))
            .chain(staged.iter())
            .filter(|t| t.user_id == user_id)
            .map(|t| t.id.clone())
            .collect())
    }
}

fn check_identity(user: &User, action: &str, result: IdentityResult) -> Result<()> {
    if result.succeeded {
        return Ok(());
    }
    tracing::warn!(
        user_id = %user.id,
        action,
        errors = result.errors.len(),
        "identity manager rejected user change"
    );
    Err(TicketingError::Identity(result.errors))
}

/// Tickets are stored flat and hydrated with all five relations on read.
pub struct TicketRepository {
    context: Arc<DataContext>,
}

impl TicketRepository {
    pub fn new(context: Arc<DataContext>) -> Self {
        Self { context }
    }

    /// Stages an update of an existing ticket. Its id never changes.
    pub async fn edit(&self, ticket: Ticket) -> Result<Staged<Ticket>> {
        Ok(self.context.stage_update(ticket.to_record()).await.retype())
    }

    /// Drops everything staged in the shared unit of work.
    pub async fn discard(&self) -> usize {
        self.context.discard().await
    }
}

#[async_trait]
impl Repository<Ticket> for TicketRepository {
    async fn get_all(&self) -> Result<Vec<Ticket>> {
        let records = self.context.fetch_all::<TicketRecord>().await?;
        let relations = Relations::load_all(&self.context).await?;

        records
            .into_iter()
            .map(|record| relations.hydrate(record).map_err(TicketingError::from))
            .collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Ticket> {
        let record = self
            .context
            .find::<TicketRecord>(id)
            .await?
            .ok_or_else(|| TicketingError::not_found(EntityKind::Ticket, id))?;
        let relations = Relations::load_for(&self.context, &record).await?;

        Ok(relations.hydrate(record)?)
    }

    async fn add(&self, item: Ticket) -> Result<Staged<Ticket>> {
        Ok(self.context.stage_insert(item.to_record()).await.retype())
    }

    async fn save(&self) -> Result<CommitReceipt> {
        Ok(self.context.commit().await?)
    }
}

/// Related rows needed to hydrate tickets, keyed by id.
#[derive(Default)]
struct Relations {
    users: HashMap<String, User>,
    priorities: HashMap<String, Priority>,
    statuses: HashMap<String, Status>,
    service_types: HashMap<String, ServiceType>,
    ticket_types: HashMap<String, TicketType>,
}

impl Relations {
    async fn load_all(context: &DataContext) -> std::result::Result<Self, StoreError> {
        Ok(Self {
            users: by_id(context.fetch_all::<User>().await?),
            priorities: by_id(context.fetch_all::<Priority>().await?),
            statuses: by_id(context.fetch_all::<Status>().await?),
            service_types: by_id(context.fetch_all::<ServiceType>().await?),
            ticket_types: by_id(context.fetch_all::<TicketType>().await?),
        })
    }

    async fn load_for(
        context: &DataContext,
        record: &TicketRecord,
    ) -> std::result::Result<Self, StoreError> {
        Ok(Self {
            users: by_id(context.find::<User>(&record.user_id).await?),
            priorities: by_id(context.find::<Priority>(&record.priority_id).await?),
            statuses: by_id(context.find::<Status>(&record.status_id).await?),
            service_types: by_id(context.find::<ServiceType>(&record.service_type_id).await?),
            ticket_types: by_id(context.find::<TicketType>(&record.ticket_type_id).await?),
        })
    }

    fn hydrate(&self, record: TicketRecord) -> std::result::Result<Ticket, StoreError> {
        Ok(Ticket {
            user: related(&self.users, &record, &record.user_id)?,
            priority: related(&self.priorities, &record, &record.priority_id)?,
            status: related(&self.statuses, &record, &record.status_id)?,
            service_type: related(&self.service_types, &record, &record.service_type_id)?,
            ticket_type: related(&self.ticket_types, &record, &record.ticket_type_id)?,
            id: record.id,
            subject: record.subject,
            customer_name: record.customer_name,
            description: record.description,
            open_date_time: record.open_date_time,
        })
    }
}

fn by_id<T: Entity>(rows: impl IntoIterator<Item = T>) -> HashMap<String, T> {
    rows.into_iter()
        .map(|row| (row.id().to_string(), row))
        .collect()
}

fn related<T: Entity>(
    rows: &HashMap<String, T>,
    ticket: &TicketRecord,
    id: &str,
) -> std::result::Result<T, StoreError> {
    rows.get(id).cloned().ok_or_else(|| {
        StoreError::corrupt(format!(
            "ticket '{}' references missing {} '{id}'",
            ticket.id,
            T::KIND
        ))
    })
}
