//! Todo database entity for SeaORM.

use std::collections::BTreeSet;

use sea_orm::entity::prelude::*;

use domain::{Priority, Todo};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "todos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: String,
    pub due_date: Option<DateTimeUtc>,
    /// JSON array of tag strings
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Json,
    pub category: String,
    pub archived: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Tag set as stored in the JSON column.
pub fn tags_to_json(tags: &BTreeSet<String>) -> Json {
    Json::Array(tags.iter().cloned().map(Json::String).collect())
}

/// Convert database model to domain entity
impl From<Model> for Todo {
    fn from(model: Model) -> Self {
        Todo {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            description: model.description,
            completed: model.completed,
            priority: model.priority.parse().unwrap_or(Priority::Medium),
            due_date: model.due_date,
            tags: serde_json::from_value(model.tags).unwrap_or_default(),
            category: model.category,
            archived: model.archived,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
