use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Every collection the entity store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Ticket,
    User,
    Priority,
    Status,
    ServiceType,
    TicketType,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Ticket,
        EntityKind::User,
        EntityKind::Priority,
        EntityKind::Status,
        EntityKind::ServiceType,
        EntityKind::TicketType,
    ];

    /// Name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::User => "user",
            Self::Priority => "priority",
            Self::Status => "status",
            Self::ServiceType => "service type",
            Self::TicketType => "ticket type",
        }
    }

    /// Backing table in the relational schema.
    pub fn table(self) -> &'static str {
        match self {
            Self::Ticket => "tickets",
            Self::User => "users",
            Self::Priority => "priorities",
            Self::Status => "statuses",
            Self::ServiceType => "service_types",
            Self::TicketType => "ticket_types",
        }
    }

    /// Attribute collections are looked up by name and keep names unique.
    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            Self::Priority | Self::Status | Self::ServiceType | Self::TicketType
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of any collection, as it crosses the store boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Ticket(TicketRecord),
    User(User),
    Priority(Priority),
    Status(Status),
    ServiceType(ServiceType),
    TicketType(TicketType),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Ticket(_) => EntityKind::Ticket,
            Self::User(_) => EntityKind::User,
            Self::Priority(_) => EntityKind::Priority,
            Self::Status(_) => EntityKind::Status,
            Self::ServiceType(_) => EntityKind::ServiceType,
            Self::TicketType(_) => EntityKind::TicketType,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Ticket(r) => &r.id,
            Self::User(r) => &r.id,
            Self::Priority(r) => &r.id,
            Self::Status(r) => &r.id,
            Self::ServiceType(r) => &r.id,
            Self::TicketType(r) => &r.id,
        }
    }

    /// Lookup name for attribute rows, `None` for tickets and users.
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            Self::Priority(r) => Some(&r.name),
            Self::Status(r) => Some(&r.name),
            Self::ServiceType(r) => Some(&r.name),
            Self::TicketType(r) => Some(&r.name),
            Self::Ticket(_) | Self::User(_) => None,
        }
    }
}

/// A type stored as one row of one collection.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn into_record(self) -> Record;

    /// Returns `None` when the record belongs to another collection.
    fn from_record(record: Record) -> Option<Self>;
}

/// A `{id, name}` lookup entity resolved by its human-readable name.
pub trait Attribute: Entity {
    fn name(&self) -> &str;

    fn with_name(id: String, name: String) -> Self;
}

macro_rules! attribute_entity {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
        pub struct $ty {
            pub id: String,
            pub name: String,
        }

        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn id(&self) -> &str {
                &self.id
            }

            fn into_record(self) -> Record {
                Record::$ty(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$ty(row) => Some(row),
                    _ => None,
                }
            }
        }

        impl Attribute for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn with_name(id: String, name: String) -> Self {
                Self { id, name }
            }
        }
    };
}

attribute_entity!(
    /// How urgent a ticket is ("High", "Low", ...).
    Priority
);
attribute_entity!(
    /// Where a ticket is in its workflow ("Open", "Closed", ...).
    Status
);
attribute_entity!(
    /// The service a ticket was raised against.
    ServiceType
);
attribute_entity!(
    /// Kind of request ("Incident", "Question", ...).
    TicketType
);

/// Identity-managed principal. Credentials live with the identity manager, never here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub user_name: String,
    pub email: Option<String>,
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> &str {
        &self.id
    }

    fn into_record(self) -> Record {
        Record::User(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::User(row) => Some(row),
            _ => None,
        }
    }
}

/// Stored shape of a ticket: scalar fields plus foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TicketRecord {
    pub id: String,
    pub subject: String,
    pub customer_name: String,
    pub description: String,
    pub open_date_time: DateTime<Utc>,
    pub user_id: String,
    pub priority_id: String,
    pub status_id: String,
    pub service_type_id: String,
    pub ticket_type_id: String,
}

impl Entity for TicketRecord {
    const KIND: EntityKind = EntityKind::Ticket;

    fn id(&self) -> &str {
        &self.id
    }

    fn into_record(self) -> Record {
        Record::Ticket(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Ticket(row) => Some(row),
            _ => None,
        }
    }
}

/// Fully hydrated ticket: every relation is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    pub customer_name: String,
    pub description: String,
    pub open_date_time: DateTime<Utc>,
    pub user: User,
    pub priority: Priority,
    pub status: Status,
    pub service_type: ServiceType,
    pub ticket_type: TicketType,
}

impl Ticket {
    /// Flattens the relations back into foreign keys.
    pub fn to_record(&self) -> TicketRecord {
        TicketRecord {
            id: self.id.clone(),
            subject: self.subject.clone(),
            customer_name: self.customer_name.clone(),
            description: self.description.clone(),
            open_date_time: self.open_date_time,
            user_id: self.user.id.clone(),
            priority_id: self.priority.id.clone(),
            status_id: self.status.id.clone(),
            service_type_id: self.service_type.id.clone(),
            ticket_type_id: self.ticket_type.id.clone(),
        }
    }
}

/// Flat projection exchanged with callers; relations are carried by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TicketDto {
    pub id: String,
    pub subject: String,
    pub customer_name: String,
    pub description: String,
    pub open_date_time: String,
    pub priority_name: String,
    pub status_name: String,
    pub service_type_name: String,
    pub ticket_type_name: String,
    pub user_name: String,
}
