//! In-memory identity store for tests and single-process runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::IdentityRepository;
use common::{AppError, AppResult};
use domain::{Identity, NewIdentity};

#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: Mutex<HashMap<Uuid, Identity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>> {
        let identities = self.identities.lock().await;
        Ok(identities.values().find(|i| i.email == email).cloned())
    }

    async fn create(&self, new: NewIdentity) -> AppResult<Identity> {
        let mut identities = self.identities.lock().await;
        if identities.values().any(|i| i.email == new.email) {
            return Err(AppError::conflict("Email"));
        }

        let identity = Identity::new(new.email, new.password_hash, new.name);
        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut identities = self.identities.lock().await;
        let identity = identities.get_mut(&id).ok_or(AppError::NotFound)?;
        identity.last_login_at = Some(at);
        identity.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            name: "A".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let store = InMemoryIdentityStore::new();
        store.create(new_identity("a@x.com")).await.unwrap();

        let err = store.create(new_identity("a@x.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_record_login() {
        let store = InMemoryIdentityStore::new();
        let identity = store.create(new_identity("a@x.com")).await.unwrap();
        let at = Utc::now();

        store.record_login(identity.id, at).await.unwrap();
        let found = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found.last_login_at, Some(at));

        assert!(matches!(
            store.record_login(Uuid::new_v4(), at).await,
            Err(AppError::NotFound)
        ));
    }
}
