//! In-memory credential store for tests and local runs

use super::user_repo::UserRepository;
use crate::{error::AppError, models::user::User};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

fn conflict_for(existing: &User, candidate: &User) -> Option<AppError> {
    if existing.id == candidate.id {
        return None;
    }
    if existing.username == candidate.username {
        return Some(AppError::Conflict("username already exists".to_string()));
    }
    if existing.email == candidate.email {
        return Some(AppError::Conflict("email already registered".to_string()));
    }
    None
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<User, AppError> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.id) {
            return Err(AppError::Conflict("user already exists".to_string()));
        }
        if let Some(err) = users.values().find_map(|existing| conflict_for(existing, user)) {
            return Err(err);
        }

        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user.id) {
            return Err(AppError::NotFound("user".to_string()));
        }
        if let Some(err) = users.values().find_map(|existing| conflict_for(existing, user)) {
            return Err(err);
        }

        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        self.users
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("user".to_string()))
    }
}
