use std::sync::Arc;

use crate::context::{CommitReceipt, DataContext, Staged};
use crate::converter::TicketConverter;
use crate::identity::IdentityManager;
use crate::models::{Ticket, TicketDto};
use crate::repository::{
    PriorityRepository, Repository, ServiceTypeRepository, StatusRepository, TicketRepository,
    TicketTypeRepository, UserRepository,
};
use crate::{Result, TicketingError};

/// Ticket operations in DTO form. Add and edit are staged; `save` commits.
pub struct TicketService {
    repository: TicketRepository,
    converter: TicketConverter,
}

impl TicketService {
    pub fn new(repository: TicketRepository, converter: TicketConverter) -> Self {
        Self {
            repository,
            converter,
        }
    }

    /// Wires every repository onto one shared unit of work.
    pub fn from_context(context: Arc<DataContext>, identity: Arc<dyn IdentityManager>) -> Self {
        let converter = TicketConverter::new(
            PriorityRepository::new(context.clone()),
            ServiceTypeRepository::new(context.clone()),
            StatusRepository::new(context.clone()),
            TicketTypeRepository::new(context.clone()),
            UserRepository::new(context.clone(), identity),
        );
        Self::new(TicketRepository::new(context), converter)
    }

    pub async fn get_all(&self) -> Result<Vec<TicketDto>> {
        let tickets = self.repository.get_all().await?;
        tracing::debug!(count = tickets.len(), "loaded tickets");
        Ok(tickets.iter().map(|t| self.converter.to_dto(t)).collect())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<TicketDto> {
        let ticket = self.repository.get_by_id(id).await?;
        Ok(self.converter.to_dto(&ticket))
    }

    pub async fn add(&self, dto: TicketDto) -> Result<Staged<Ticket>> {
        let ticket = self.converter.to_entity(&dto).await?;
        let staged = self.repository.add(ticket).await?;
        tracing::info!(ticket_id = %staged.id(), "ticket staged for insert");
        Ok(staged)
    }

    /// Stages an update of the ticket named by `dto.id`, which is required.
    pub async fn edit(&self, dto: TicketDto) -> Result<Staged<Ticket>> {
        if dto.id.trim().is_empty() {
            return Err(TicketingError::invalid_input("Id is required to edit a ticket"));
        }
        let ticket = self.converter.to_entity(&dto).await?;
        let staged = self.repository.edit(ticket).await?;
        tracing::info!(ticket_id = %staged.id(), "ticket staged for update");
        Ok(staged)
    }

    pub async fn save(&self) -> Result<CommitReceipt> {
        self.repository.save().await
    }

    /// Drops staged changes, returning how many were pending.
    pub async fn discard(&self) -> usize {
        let dropped = self.repository.discard().await;
        if dropped > 0 {
            tracing::info!(dropped, "discarded staged changes");
        }
        dropped
    }
}
