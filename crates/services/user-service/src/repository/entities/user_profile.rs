//! User profile projection entity for SeaORM.

use sea_orm::entity::prelude::*;

use domain::{Preferences, UserProfile};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_profiles")]
pub struct Model {
    /// Identity id issued by the auth service
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub theme: String,
    pub notifications: bool,
    pub todo_count: i64,
    pub last_login: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Convert database model to domain entity
impl From<Model> for UserProfile {
    fn from(model: Model) -> Self {
        UserProfile {
            id: model.id,
            email: model.email,
            name: model.name,
            bio: model.bio,
            preferences: Preferences {
                theme: model.theme,
                notifications: model.notifications,
            },
            todo_count: u64::try_from(model.todo_count).unwrap_or(0),
            last_login: model.last_login,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
