//! Identity-management seam for credentialed user records.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::TicketingConfig;
use crate::models::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityError {
    pub code: String,
    pub description: String,
}

impl IdentityError {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// Outcome of an identity operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResult {
    pub succeeded: bool,
    pub errors: Vec<IdentityError>,
}

impl IdentityResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<IdentityError>) -> Self {
        Self {
            succeeded: false,
            errors,
        }
    }
}

/// Create, update and delete of users that carry credential state.
#[async_trait]
pub trait IdentityManager: Send + Sync {
    async fn create(&self, user: &User, credential: &str) -> IdentityResult;

    async fn update(&self, user: &User) -> IdentityResult;

    async fn delete(&self, user: &User) -> IdentityResult;
}

/// Process-local identity manager with basic user and credential validation.
///
/// Credentials are only checked against the length policy; they are not kept.
#[derive(Debug)]
pub struct InMemoryIdentityManager {
    users: RwLock<HashMap<String, User>>,
    min_credential_length: usize,
}

impl InMemoryIdentityManager {
    pub fn new(min_credential_length: usize) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            min_credential_length,
        }
    }

    pub fn from_config(config: &TicketingConfig) -> Self {
        Self::new(config.min_credential_length)
    }

    pub async fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }

    fn validate_user(user: &User, users: &HashMap<String, User>) -> Vec<IdentityError> {
        let mut errors = Vec::new();
        if user.user_name.trim().is_empty() {
            errors.push(IdentityError::new("InvalidUserName", "User name is required."));
        }
        let taken = users
            .values()
            .any(|u| u.id != user.id && u.user_name == user.user_name);
        if taken {
            errors.push(IdentityError::new(
                "DuplicateUserName",
                format!("User name '{}' is already taken.", user.user_name),
            ));
        }
        errors
    }

    fn user_not_found(user: &User) -> IdentityResult {
        IdentityResult::failed(vec![IdentityError::new(
            "UserNotFound",
            format!("User '{}' does not exist.", user.id),
        )])
    }
}

#[async_trait]
impl IdentityManager for InMemoryIdentityManager {
    async fn create(&self, user: &User, credential: &str) -> IdentityResult {
        let mut users = self.users.write().await;

        let mut errors = Self::validate_user(user, &users);
        if users.contains_key(&user.id) {
            errors.push(IdentityError::new(
                "DuplicateUserId",
                format!("User id '{}' is already taken.", user.id),
            ));
        }
        if credential.chars().count() < self.min_credential_length {
            errors.push(IdentityError::new(
                "PasswordTooShort",
                format!(
                    "Passwords must be at least {} characters.",
                    self.min_credential_length
                ),
            ));
        }
        if !errors.is_empty() {
            return IdentityResult::failed(errors);
        }

        users.insert(user.id.clone(), user.clone());
        IdentityResult::success()
    }

    async fn update(&self, user: &User) -> IdentityResult {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Self::user_not_found(user);
        }

        let errors = Self::validate_user(user, &users);
        if !errors.is_empty() {
            return IdentityResult::failed(errors);
        }

        users.insert(user.id.clone(), user.clone());
        IdentityResult::success()
    }

    async fn delete(&self, user: &User) -> IdentityResult {
        match self.users.write().await.remove(&user.id) {
            Some(_) => IdentityResult::success(),
            None => Self::user_not_found(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            user_name: name.to_string(),
            email: Some(format!("{name}@mail.com")),
        }
    }

    #[tokio::test]
    async fn create_then_update_and_delete() {
        let manager = InMemoryIdentityManager::new(6);

        assert!(manager.create(&user("1", "user1"), "secret1").await.succeeded);
        assert!(manager.update(&user("1", "renamed")).await.succeeded);
        assert_eq!(manager.users().await[0].user_name, "renamed");
        assert!(manager.delete(&user("1", "renamed")).await.succeeded);
        assert!(manager.users().await.is_empty());
    }

    #[tokio::test]
    async fn create_collects_every_validation_error() {
        let manager = InMemoryIdentityManager::new(6);
        manager.create(&user("1", "user1"), "secret1").await;

        let result = manager.create(&user("2", "user1"), "abc").await;

        assert!(!result.succeeded);
        let codes: Vec<_> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["DuplicateUserName", "PasswordTooShort"]);
    }

    #[tokio::test]
    async fn credential_policy_comes_from_config() {
        let config = TicketingConfig {
            min_credential_length: 10,
            ..TicketingConfig::default()
        };
        let manager = InMemoryIdentityManager::from_config(&config);

        let result = manager.create(&user("1", "user1"), "secret1").await;

        assert_eq!(result.errors[0].code, "PasswordTooShort");
    }

    #[tokio::test]
    async fn unknown_users_cannot_be_changed() {
        let manager = InMemoryIdentityManager::new(0);

        let updated = manager.update(&user("9", "ghost")).await;
        let deleted = manager.delete(&user("9", "ghost")).await;

        assert_eq!(updated.errors[0].code, "UserNotFound");
        assert_eq!(deleted.errors[0].code, "UserNotFound");
    }

    #[test]
    fn identity_error_display() {
        let err = IdentityError::new("PasswordTooShort", "too short");
        assert_eq!(err.to_string(), "PasswordTooShort: too short");
    }
}
