//! Todo repository backed by Postgres.
//!
//! Every lookup and mutation filters on both the todo id and the owner, so
//! a todo owned by someone else is indistinguishable from a missing one.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set,
};
use uuid::Uuid;

use super::entities::todo::{self, tags_to_json, ActiveModel, Entity as TodoEntity};
use common::AppResult;
use domain::{Todo, TodoFields, TodoFilter};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Todo repository trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// Persist a new todo
    async fn insert(&self, todo: Todo) -> AppResult<Todo>;

    /// Find a todo by id and owner
    async fn find_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>>;

    /// Unarchived todos of `user_id` matching `filter`, newest first
    async fn list(&self, user_id: &str, filter: TodoFilter) -> AppResult<Vec<Todo>>;

    /// Replace the mutable fields. `None` when no todo matches id and owner.
    async fn replace_owned(
        &self,
        id: Uuid,
        user_id: &str,
        fields: TodoFields,
    ) -> AppResult<Option<Todo>>;

    /// Flip the completion flag
    async fn toggle_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>>;

    /// Set the archived flag
    async fn archive_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>>;

    /// Delete by id and owner. Returns whether a row was removed.
    async fn delete_owned(&self, id: Uuid, user_id: &str) -> AppResult<bool>;

    /// Number of todos owned by `user_id`, archived included
    async fn count(&self, user_id: &str) -> AppResult<u64>;
}

/// Concrete implementation of TodoRepository
pub struct TodoStore {
    db: DatabaseConnection,
}

impl TodoStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn owned(id: Uuid, user_id: &str) -> Select<TodoEntity> {
    TodoEntity::find()
        .filter(todo::Column::Id.eq(id))
        .filter(todo::Column::UserId.eq(user_id))
}

#[async_trait]
impl TodoRepository for TodoStore {
    async fn insert(&self, todo: Todo) -> AppResult<Todo> {
        let active_model = ActiveModel {
            id: Set(todo.id),
            user_id: Set(todo.user_id),
            title: Set(todo.title),
            description: Set(todo.description),
            completed: Set(todo.completed),
            priority: Set(todo.priority.as_str().to_string()),
            due_date: Set(todo.due_date),
            tags: Set(tags_to_json(&todo.tags)),
            category: Set(todo.category),
            archived: Set(todo.archived),
            created_at: Set(todo.created_at),
            updated_at: Set(todo.updated_at),
        };

        let model = active_model.insert(&self.db).await?;
        Ok(Todo::from(model))
    }

    async fn find_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>> {
        let model = owned(id, user_id).one(&self.db).await?;
        Ok(model.map(Todo::from))
    }

    async fn list(&self, user_id: &str, filter: TodoFilter) -> AppResult<Vec<Todo>> {
        let mut query = TodoEntity::find()
            .filter(todo::Column::UserId.eq(user_id))
            .filter(todo::Column::Archived.eq(false))
            .order_by_desc(todo::Column::CreatedAt);

        if let Some(completed) = filter.completed {
            query = query.filter(todo::Column::Completed.eq(completed));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(todo::Column::Priority.eq(priority.as_str()));
        }
        if let Some(category) = filter.category.as_deref() {
            query = query.filter(todo::Column::Category.eq(category));
        }

        // Tags live in a JSON column and are matched after loading.
        if filter.tags.is_empty() {
            query = query.limit(u64::from(filter.limit));
        }

        let todos = query
            .all(&self.db)
            .await?
            .into_iter()
            .map(Todo::from)
            .filter(|t| filter.matches(t))
            .take(filter.limit as usize)
            .collect();

        Ok(todos)
    }

    async fn replace_owned(
        &self,
        id: Uuid,
        user_id: &str,
        fields: TodoFields,
    ) -> AppResult<Option<Todo>> {
        let updated = TodoEntity::update_many()
            .col_expr(todo::Column::Title, Expr::value(fields.title))
            .col_expr(todo::Column::Description, Expr::value(fields.description))
            .col_expr(todo::Column::Priority, Expr::value(fields.priority.as_str()))
            .col_expr(todo::Column::DueDate, Expr::value(fields.due_date))
            .col_expr(todo::Column::Tags, Expr::value(tags_to_json(&fields.tags)))
            .col_expr(todo::Column::Category, Expr::value(fields.category))
            .col_expr(todo::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(todo::Column::Id.eq(id))
            .filter(todo::Column::UserId.eq(user_id))
            .exec_with_returning(&self.db)
            .await?;

        Ok(updated.into_iter().next().map(Todo::from))
    }

    async fn toggle_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>> {
        let updated = TodoEntity::update_many()
            .col_expr(
                todo::Column::Completed,
                Expr::col(todo::Column::Completed).not(),
            )
            .col_expr(todo::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(todo::Column::Id.eq(id))
            .filter(todo::Column::UserId.eq(user_id))
            .exec_with_returning(&self.db)
            .await?;

        Ok(updated.into_iter().next().map(Todo::from))
    }

    async fn archive_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>> {
        let updated = TodoEntity::update_many()
            .col_expr(todo::Column::Archived, Expr::value(true))
            .col_expr(todo::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(todo::Column::Id.eq(id))
            .filter(todo::Column::UserId.eq(user_id))
            .exec_with_returning(&self.db)
            .await?;

        Ok(updated.into_iter().next().map(Todo::from))
    }

    async fn delete_owned(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        let result = TodoEntity::delete_many()
            .filter(todo::Column::Id.eq(id))
            .filter(todo::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn count(&self, user_id: &str) -> AppResult<u64> {
        let count = TodoEntity::find()
            .filter(todo::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        Ok(count)
    }
}
