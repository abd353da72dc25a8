//! Shared fixture: two seeded tickets, their attributes and users, and a
//! recording identity manager standing in for the real one.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use helpdesk_tickets::{
    DataContext, IdentityManager, IdentityResult, InMemoryStore, Priority, Record, ServiceType,
    Status, TicketDto, TicketRecord, TicketService, TicketType, User,
};

/// Accepts every request and remembers the users it was asked to create.
#[derive(Default)]
pub struct MockIdentityManager {
    pub created: Mutex<Vec<User>>,
    pub updated: Mutex<Vec<User>>,
    pub deleted: Mutex<Vec<User>>,
}

#[async_trait]
impl IdentityManager for MockIdentityManager {
    async fn create(&self, user: &User, _credential: &str) -> IdentityResult {
        self.created.lock().unwrap().push(user.clone());
        IdentityResult::success()
    }

    async fn update(&self, user: &User) -> IdentityResult {
        self.updated.lock().unwrap().push(user.clone());
        IdentityResult::success()
    }

    async fn delete(&self, user: &User) -> IdentityResult {
        self.deleted.lock().unwrap().push(user.clone());
        IdentityResult::success()
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub identity: Arc<MockIdentityManager>,
    pub service: TicketService,
}

impl Fixture {
    /// A second service over the same store with its own unit of work.
    pub fn other_session(&self) -> TicketService {
        TicketService::from_context(
            Arc::new(DataContext::new(self.store.clone())),
            self.identity.clone(),
        )
    }
}

fn user(id: &str, name: &str) -> User {
    User {
        id: id.to_string(),
        user_name: name.to_string(),
        email: Some(format!("{name}@mail.com")),
    }
}

fn attributes(id: &str, priority: &str, status: &str, service: &str, kind: &str) -> Vec<Record> {
    vec![
        Record::Priority(Priority {
            id: id.to_string(),
            name: priority.to_string(),
        }),
        Record::Status(Status {
            id: id.to_string(),
            name: status.to_string(),
        }),
        Record::ServiceType(ServiceType {
            id: format!("service{id}"),
            name: service.to_string(),
        }),
        Record::TicketType(TicketType {
            id: id.to_string(),
            name: kind.to_string(),
        }),
    ]
}

fn ticket(id: &str, subject: &str, user_id: &str, attributes_id: &str) -> Record {
    Record::Ticket(TicketRecord {
        id: id.to_string(),
        subject: subject.to_string(),
        customer_name: "customer".to_string(),
        description: "description".to_string(),
        open_date_time: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
        user_id: user_id.to_string(),
        priority_id: attributes_id.to_string(),
        status_id: attributes_id.to_string(),
        service_type_id: format!("service{attributes_id}"),
        ticket_type_id: attributes_id.to_string(),
    })
}

pub fn seed_records() -> Vec<Record> {
    let mut records = vec![Record::User(user("1", "user")), Record::User(user("2", "user2"))];
    records.extend(attributes("1", "priority1", "status1", "servicetype1", "ticket type1"));
    records.extend(attributes("2", "priority2", "status2", "servicetype2", "ticket type2"));
    records.extend(attributes("3", "priority", "status", "serviceType", "ticketType"));
    records.push(ticket("1", "name1", "1", "1"));
    records.push(ticket("2", "name2", "2", "2"));
    records
}

pub fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::with_records(seed_records()).unwrap());
    let identity = Arc::new(MockIdentityManager::default());
    let service = TicketService::from_context(
        Arc::new(DataContext::new(store.clone())),
        identity.clone(),
    );

    Fixture {
        store,
        identity,
        service,
    }
}

pub fn ticket_dto(id: &str, subject: &str) -> TicketDto {
    TicketDto {
        id: id.to_string(),
        subject: subject.to_string(),
        customer_name: "customer".to_string(),
        description: "description".to_string(),
        open_date_time: "2024-03-01T08:00:00Z".to_string(),
        priority_name: "priority".to_string(),
        status_name: "status".to_string(),
        service_type_name: "serviceType".to_string(),
        ticket_type_name: "ticketType".to_string(),
        user_name: "user".to_string(),
    }
}
