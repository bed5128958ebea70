//! Identity repository backed by Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr,
};
use uuid::Uuid;

use super::entities::identity::{self, ActiveModel, Entity as IdentityEntity};
use common::{AppError, AppResult};
use domain::{Identity, NewIdentity};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Identity repository trait for dependency injection.
///
/// Emails are stored normalized; callers pass normalized values.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Find identity by normalized email
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>>;

    /// Persist a new identity. A taken email is `Conflict`.
    async fn create(&self, identity: NewIdentity) -> AppResult<Identity>;

    /// Record a successful login
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;
}

/// Concrete implementation of IdentityRepository
pub struct IdentityStore {
    db: DatabaseConnection,
}

impl IdentityStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn map_insert_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::conflict("Email"),
        _ => AppError::from(err),
    }
}

#[async_trait]
impl IdentityRepository for IdentityStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>> {
        let result = IdentityEntity::find()
            .filter(identity::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(AppError::from)?;

        Ok(result.map(Identity::from))
    }

    async fn create(&self, new: NewIdentity) -> AppResult<Identity> {
        let fresh = Identity::new(new.email, new.password_hash, new.name);
        let active_model = ActiveModel {
            id: Set(fresh.id),
            email: Set(fresh.email),
            password_hash: Set(fresh.password_hash),
            name: Set(fresh.name),
            created_at: Set(fresh.created_at),
            updated_at: Set(fresh.updated_at),
            last_login_at: Set(None),
        };

        let model = active_model.insert(&self.db).await.map_err(map_insert_error)?;
        Ok(Identity::from(model))
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let active = ActiveModel {
            id: Set(id),
            last_login_at: Set(Some(at)),
            updated_at: Set(at),
            ..Default::default()
        };

        match active.update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(AppError::NotFound),
            Err(e) => Err(AppError::from(e)),
        }
    }
}
