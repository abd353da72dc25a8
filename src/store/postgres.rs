use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgQueryResult};
use sqlx::{PgPool, Postgres, Transaction};

use super::{Change, ChangeOp, EntityStore, StoreError};
use crate::models::{
    EntityKind, Priority, Record, ServiceType, Status, TicketRecord, TicketType, User,
};

/// PostgreSQL-backed store. Each commit runs in a single transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool for the given database URL.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to ticket database: {}", e);
                StoreError::Database(e)
            })?;

        Ok(Self { pool })
    }

    /// Applies the schema under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_attributes<T>(&self, kind: EntityKind) -> Result<Vec<T>, sqlx::Error>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let query = format!("SELECT id, name FROM {} ORDER BY id", kind.table());
        sqlx::query_as::<_, T>(&query).fetch_all(&self.pool).await
    }

    async fn find_attribute<T>(&self, kind: EntityKind, id: &str) -> Result<Option<T>, sqlx::Error>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let query = format!("SELECT id, name FROM {} WHERE id = $1", kind.table());
        sqlx::query_as::<_, T>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}

const TICKET_COLUMNS: &str = "id, subject, customer_name, description, open_date_time, \
     user_id, priority_id, status_id, service_type_id, ticket_type_id";

#[async_trait]
impl EntityStore for PgStore {
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Record>, StoreError> {
        let rows = match kind {
            EntityKind::Ticket => {
                let query = format!("SELECT {TICKET_COLUMNS} FROM tickets ORDER BY id");
                sqlx::query_as::<_, TicketRecord>(&query)
                    .fetch_all(&self.pool)
                    .await
                    .map(|rows| rows.into_iter().map(Record::Ticket).collect())
            }
            EntityKind::User => {
                sqlx::query_as::<_, User>("SELECT id, user_name, email FROM users ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
                    .map(|rows| rows.into_iter().map(Record::User).collect())
            }
            EntityKind::Priority => self
                .fetch_attributes::<Priority>(kind)
                .await
                .map(|rows| rows.into_iter().map(Record::Priority).collect()),
            EntityKind::Status => self
                .fetch_attributes::<Status>(kind)
                .await
                .map(|rows| rows.into_iter().map(Record::Status).collect()),
            EntityKind::ServiceType => self
                .fetch_attributes::<ServiceType>(kind)
                .await
                .map(|rows| rows.into_iter().map(Record::ServiceType).collect()),
            EntityKind::TicketType => self
                .fetch_attributes::<TicketType>(kind)
                .await
                .map(|rows| rows.into_iter().map(Record::TicketType).collect()),
        };

        rows.map_err(|e| {
            tracing::error!(kind = %kind, "Failed to fetch rows: {}", e);
            StoreError::Database(e)
        })
    }

    async fn find(&self, kind: EntityKind, id: &str) -> Result<Option<Record>, StoreError> {
        let row = match kind {
            EntityKind::Ticket => {
                let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
                sqlx::query_as::<_, TicketRecord>(&query)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map(|row| row.map(Record::Ticket))
            }
            EntityKind::User => {
                sqlx::query_as::<_, User>("SELECT id, user_name, email FROM users WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map(|row| row.map(Record::User))
            }
            EntityKind::Priority => self
                .find_attribute::<Priority>(kind, id)
                .await
                .map(|row| row.map(Record::Priority)),
            EntityKind::Status => self
                .find_attribute::<Status>(kind, id)
                .await
                .map(|row| row.map(Record::Status)),
            EntityKind::ServiceType => self
                .find_attribute::<ServiceType>(kind, id)
                .await
                .map(|row| row.map(Record::ServiceType)),
            EntityKind::TicketType => self
                .find_attribute::<TicketType>(kind, id)
                .await
                .map(|row| row.map(Record::TicketType)),
        };

        row.map_err(|e| {
            tracing::error!(kind = %kind, id = %id, "Failed to fetch row: {}", e);
            StoreError::Database(e)
        })
    }

    async fn commit(&self, changes: Vec<Change>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for change in &changes {
            let result = write_change(&mut tx, change).await.map_err(classify)?;
            if change.op != ChangeOp::Insert && result.rows_affected() == 0 {
                // Dropping `tx` rolls the whole batch back.
                return Err(StoreError::constraint(format!(
                    "cannot {} missing {} '{}'",
                    if change.op == ChangeOp::Update { "update" } else { "delete" },
                    change.record.kind(),
                    change.record.id()
                )));
            }
        }

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit ticket transaction: {}", e);
            classify(e)
        })?;

        tracing::debug!(changes = changes.len(), "postgres store committed");
        Ok(())
    }
}

async fn write_change(
    tx: &mut Transaction<'static, Postgres>,
    change: &Change,
) -> Result<PgQueryResult, sqlx::Error> {
    if change.op == ChangeOp::Delete {
        let query = format!("DELETE FROM {} WHERE id = $1", change.record.kind().table());
        return sqlx::query(&query)
            .bind(change.record.id())
            .execute(&mut **tx)
            .await;
    }

    match (&change.record, change.op) {
        (Record::Ticket(t), ChangeOp::Insert) => {
            sqlx::query(
                r#"
                INSERT INTO tickets (
                    id, subject, customer_name, description, open_date_time,
                    user_id, priority_id, status_id, service_type_id, ticket_type_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&t.id)
            .bind(&t.subject)
            .bind(&t.customer_name)
            .bind(&t.description)
            .bind(t.open_date_time)
            .bind(&t.user_id)
            .bind(&t.priority_id)
            .bind(&t.status_id)
            .bind(&t.service_type_id)
            .bind(&t.ticket_type_id)
            .execute(&mut **tx)
            .await
        }
        (Record::Ticket(t), ChangeOp::Update) => {
            sqlx::query(
                r#"
                UPDATE tickets SET
                    subject = $2,
                    customer_name = $3,
                    description = $4,
                    open_date_time = $5,
                    user_id = $6,
                    priority_id = $7,
                    status_id = $8,
                    service_type_id = $9,
                    ticket_type_id = $10
                WHERE id = $1
                "#,
            )
            .bind(&t.id)
            .bind(&t.subject)
            .bind(&t.customer_name)
            .bind(&t.description)
            .bind(t.open_date_time)
            .bind(&t.user_id)
            .bind(&t.priority_id)
            .bind(&t.status_id)
            .bind(&t.service_type_id)
            .bind(&t.ticket_type_id)
            .execute(&mut **tx)
            .await
        }
        (Record::User(u), ChangeOp::Insert) => {
            sqlx::query("INSERT INTO users (id, user_name, email) VALUES ($1, $2, $3)")
                .bind(&u.id)
                .bind(&u.user_name)
                .bind(&u.email)
                .execute(&mut **tx)
                .await
        }
        (Record::User(u), ChangeOp::Update) => {
            sqlx::query("UPDATE users SET user_name = $2, email = $3 WHERE id = $1")
                .bind(&u.id)
                .bind(&u.user_name)
                .bind(&u.email)
                .execute(&mut **tx)
                .await
        }
        (record, op) => {
            // Remaining variants are `{id, name}` attribute rows.
            let kind = record.kind();
            let name = record.attribute_name().unwrap_or_default();
            let query = if op == ChangeOp::Insert {
                format!("INSERT INTO {} (id, name) VALUES ($1, $2)", kind.table())
            } else {
                format!("UPDATE {} SET name = $2 WHERE id = $1", kind.table())
            };
            sqlx::query(&query)
                .bind(record.id())
                .bind(name)
                .execute(&mut **tx)
                .await
        }
    }
}

fn classify(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    tracing::error!("Ticket store write failed: {}", error);
    StoreError::Database(error)
}
