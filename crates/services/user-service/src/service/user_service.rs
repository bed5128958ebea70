//! User service - profile reads and edits.
//!
//! Profiles are never created here; they appear when the projector
//! consumes `user.registered`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use common::{AppError, AppResult, OptionExt};
use domain::{validate_name, ProfileUpdate, UserProfile};

use crate::repository::ProfileRepository;

/// User service trait for dependency injection.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Read the local projection. `NotFound` until registration has been
    /// consumed.
    async fn get_user(&self, id: &str) -> AppResult<UserProfile>;

    /// Partially update name, bio and preferences.
    async fn update_user(&self, id: &str, update: ProfileUpdate) -> AppResult<UserProfile>;
}

/// Concrete implementation of UserService using repository.
pub struct UserManager {
    profiles: Arc<dyn ProfileRepository>,
}

impl UserManager {
    /// Create new user service instance with repository
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }
}

fn require_id(id: &str) -> AppResult<()> {
    if id.trim().is_empty() {
        return Err(AppError::validation("User id is required"));
    }
    Ok(())
}

fn validate_update(mut update: ProfileUpdate) -> AppResult<ProfileUpdate> {
    if let Some(name) = update.name.take() {
        update.name = Some(validate_name(&name)?);
    }
    if let Some(preferences) = update.preferences.as_mut() {
        let theme = preferences.theme.trim();
        if theme.is_empty() {
            return Err(AppError::validation("Theme is required"));
        }
        preferences.theme = theme.to_string();
    }
    Ok(update)
}

#[async_trait]
impl UserService for UserManager {
    async fn get_user(&self, id: &str) -> AppResult<UserProfile> {
        require_id(id)?;
        self.profiles.find_by_id(id).await?.ok_or_not_found()
    }

    async fn update_user(&self, id: &str, update: ProfileUpdate) -> AppResult<UserProfile> {
        require_id(id)?;
        let update = validate_update(update)?;

        if update.is_empty() {
            return self.get_user(id).await;
        }

        let updated = self.profiles.update_profile(id, update).await?;
        if updated.is_none() {
            // Registration event not consumed yet (or lost).
            debug!(user_id = %id, "Update for unknown profile");
        }
        updated.ok_or_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockProfileRepository;
    use domain::Preferences;
    use tokio_test::assert_err;

    fn profile(id: &str) -> UserProfile {
        UserProfile::registered(id.into(), "a@x.com".into(), "A".into(), 3)
    }

    #[tokio::test]
    async fn test_get_user_missing_projection_is_not_found() {
        let mut repo = MockProfileRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));

        let err = assert_err!(UserManager::new(Arc::new(repo)).get_user("u1").await);
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_update_before_registration_is_not_found() {
        let mut repo = MockProfileRepository::new();
        repo.expect_update_profile().times(1).returning(|_, _| Ok(None));

        let err = UserManager::new(Arc::new(repo))
            .update_user(
                "u1",
                ProfileUpdate {
                    bio: Some("hi".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_update_trims_name_and_passes_partial_fields() {
        let mut repo = MockProfileRepository::new();
        repo.expect_update_profile()
            .withf(|id, update| {
                id == "u1"
                    && update.name.as_deref() == Some("Jane")
                    && update.bio.is_none()
                    && update.preferences.is_none()
            })
            .times(1)
            .returning(|id, update| {
                let mut p = profile(id);
                p.apply(update);
                Ok(Some(p))
            });

        let updated = UserManager::new(Arc::new(repo))
            .update_user(
                "u1",
                ProfileUpdate {
                    name: Some("  Jane ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Jane");
        assert_eq!(updated.todo_count, 3);
    }

    #[tokio::test]
    async fn test_update_rejects_blank_fields_before_store() {
        let manager = UserManager::new(Arc::new(MockProfileRepository::new()));

        let err = manager
            .update_user(
                "u1",
                ProfileUpdate {
                    name: Some("   ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = manager
            .update_user(
                "u1",
                ProfileUpdate {
                    preferences: Some(Preferences {
                        theme: " ".into(),
                        notifications: false,
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = manager.get_user("  ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_update_returns_current_profile() {
        let mut repo = MockProfileRepository::new();
        repo.expect_update_profile().never();
        repo.expect_find_by_id()
            .returning(|id| Ok(Some(profile(id))));

        let current = UserManager::new(Arc::new(repo))
            .update_user("u1", ProfileUpdate::default())
            .await
            .unwrap();
        assert_eq!(current.id, "u1");
    }
}
