//! Mapping between [`TicketDto`] and hydrated [`Ticket`]s.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::models::{Ticket, TicketDto};
use crate::repository::{
    PriorityRepository, ServiceTypeRepository, StatusRepository, TicketTypeRepository,
    UserRepository,
};
use crate::{Result, TicketingError};

/// Naive layouts accepted besides RFC 3339; read as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

pub fn parse_open_date_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// RFC 3339 in UTC; fractional seconds only when the value has them.
pub fn format_open_date_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Resolves the names in a DTO to related entities, creating missing
/// attributes in the shared unit of work. Users must already exist.
pub struct TicketConverter {
    priorities: PriorityRepository,
    service_types: ServiceTypeRepository,
    statuses: StatusRepository,
    ticket_types: TicketTypeRepository,
    users: UserRepository,
}

impl TicketConverter {
    pub fn new(
        priorities: PriorityRepository,
        service_types: ServiceTypeRepository,
        statuses: StatusRepository,
        ticket_types: TicketTypeRepository,
        users: UserRepository,
    ) -> Self {
        Self {
            priorities,
            service_types,
            statuses,
            ticket_types,
            users,
        }
    }

    /// Builds a fully linked ticket. A blank `Id` gets a fresh one.
    ///
    /// Everything that can fail is checked before any attribute is staged, so
    /// a rejected DTO leaves the unit of work untouched.
    pub async fn to_entity(&self, dto: &TicketDto) -> Result<Ticket> {
        let open_date_time =
            parse_open_date_time(&dto.open_date_time).ok_or_else(|| TicketingError::InvalidDate {
                value: dto.open_date_time.clone(),
            })?;

        let names = [
            ("PriorityName", &dto.priority_name),
            ("StatusName", &dto.status_name),
            ("ServiceTypeName", &dto.service_type_name),
            ("TicketTypeName", &dto.ticket_type_name),
        ];
        if let Some((field, _)) = names.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(TicketingError::invalid_input(format!("{field} is required")));
        }

        let user = self.users.get_by_user_name(&dto.user_name).await?;

        let id = match dto.id.trim() {
            "" => Uuid::new_v4().to_string(),
            id => id.to_string(),
        };

        Ok(Ticket {
            id,
            subject: dto.subject.clone(),
            customer_name: dto.customer_name.clone(),
            description: dto.description.clone(),
            open_date_time,
            user,
            priority: self.priorities.get_by_name(&dto.priority_name).await?,
            status: self.statuses.get_by_name(&dto.status_name).await?,
            service_type: self.service_types.get_by_name(&dto.service_type_name).await?,
            ticket_type: self.ticket_types.get_by_name(&dto.ticket_type_name).await?,
        })
    }

    pub fn to_dto(&self, ticket: &Ticket) -> TicketDto {
        TicketDto {
            id: ticket.id.clone(),
            subject: ticket.subject.clone(),
            customer_name: ticket.customer_name.clone(),
            description: ticket.description.clone(),
            open_date_time: format_open_date_time(&ticket.open_date_time),
            priority_name: ticket.priority.name.clone(),
            status_name: ticket.status.name.clone(),
            service_type_name: ticket.service_type.name.clone(),
            ticket_type_name: ticket.ticket_type.name.clone(),
            user_name: ticket.user.user_name.clone(),
        }
    }
}
