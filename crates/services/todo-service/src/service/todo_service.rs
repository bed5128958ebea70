//! Todo service - Owner-scoped todo management.
//!
//! Every operation takes the caller's verified user id; a todo owned by
//! someone else is reported exactly like a missing one. `todo.created` and
//! `todo.deleted` go out after the store write, best effort.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use bus::EventPublisher;
use common::{AppError, AppResult, OptionExt};
use domain::{DomainEvent, Todo, TodoFields, TodoFilter, TodoInput};

use crate::repository::TodoRepository;

/// Todo service trait for dependency injection.
#[async_trait]
pub trait TodoService: Send + Sync {
    async fn create_todo(&self, user_id: &str, input: TodoInput) -> AppResult<Todo>;

    async fn get_todos(&self, user_id: &str, filter: TodoFilter) -> AppResult<Vec<Todo>>;

    async fn get_todo(&self, todo_id: &str, user_id: &str) -> AppResult<Todo>;

    /// Full replace of the mutable fields
    async fn update_todo(&self, todo_id: &str, user_id: &str, input: TodoInput)
        -> AppResult<Todo>;

    async fn delete_todo(&self, todo_id: &str, user_id: &str) -> AppResult<()>;

    async fn toggle_todo(&self, todo_id: &str, user_id: &str) -> AppResult<Todo>;

    async fn archive_todo(&self, todo_id: &str, user_id: &str) -> AppResult<Todo>;

    /// Todos owned by `user_id`, archived included
    async fn count_todos(&self, user_id: &str) -> AppResult<u64>;
}

/// Concrete implementation of TodoService.
pub struct TodoManager {
    todos: Arc<dyn TodoRepository>,
    publisher: EventPublisher,
}

impl TodoManager {
    pub fn new(todos: Arc<dyn TodoRepository>, publisher: EventPublisher) -> Self {
        Self { todos, publisher }
    }
}

fn require_user(user_id: &str) -> AppResult<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("User id is required"));
    }
    Ok(user_id)
}

/// An id that is not a UUID cannot name any todo.
fn parse_todo_id(todo_id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(todo_id.trim()).map_err(|_| AppError::NotFound)
}

#[async_trait]
impl TodoService for TodoManager {
    async fn create_todo(&self, user_id: &str, input: TodoInput) -> AppResult<Todo> {
        let user_id = require_user(user_id)?;
        let fields = TodoFields::try_from(input)?;

        let todo = self.todos.insert(Todo::new(user_id.to_string(), fields)).await?;

        info!(todo_id = %todo.id, user_id, "Todo created");
        self.publisher
            .publish(&DomainEvent::todo_created(todo.id.to_string(), user_id))
            .await;

        Ok(todo)
    }

    async fn get_todos(&self, user_id: &str, filter: TodoFilter) -> AppResult<Vec<Todo>> {
        let user_id = require_user(user_id)?;
        self.todos.list(user_id, filter).await
    }

    async fn get_todo(&self, todo_id: &str, user_id: &str) -> AppResult<Todo> {
        let user_id = require_user(user_id)?;
        let id = parse_todo_id(todo_id)?;
        self.todos.find_owned(id, user_id).await?.ok_or_not_found()
    }

    async fn update_todo(
        &self,
        todo_id: &str,
        user_id: &str,
        input: TodoInput,
    ) -> AppResult<Todo> {
        let user_id = require_user(user_id)?;
        let id = parse_todo_id(todo_id)?;
        let fields = TodoFields::try_from(input)?;

        self.todos
            .replace_owned(id, user_id, fields)
            .await?
            .ok_or_not_found()
    }

    async fn delete_todo(&self, todo_id: &str, user_id: &str) -> AppResult<()> {
        let user_id = require_user(user_id)?;
        let id = parse_todo_id(todo_id)?;

        if !self.todos.delete_owned(id, user_id).await? {
            return Err(AppError::NotFound);
        }

        info!(todo_id = %id, user_id, "Todo deleted");
        self.publisher
            .publish(&DomainEvent::todo_deleted(id.to_string(), user_id))
            .await;

        Ok(())
    }

    async fn toggle_todo(&self, todo_id: &str, user_id: &str) -> AppResult<Todo> {
        let user_id = require_user(user_id)?;
        let id = parse_todo_id(todo_id)?;
        self.todos.toggle_owned(id, user_id).await?.ok_or_not_found()
    }

    async fn archive_todo(&self, todo_id: &str, user_id: &str) -> AppResult<Todo> {
        let user_id = require_user(user_id)?;
        let id = parse_todo_id(todo_id)?;
        self.todos.archive_owned(id, user_id).await?.ok_or_not_found()
    }

    async fn count_todos(&self, user_id: &str) -> AppResult<u64> {
        let user_id = require_user(user_id)?;
        self.todos.count(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryTodoStore, MockTodoRepository};
    use bus::{topology, InMemoryBus};
    use domain::events::USER_TODO_QUEUE;
    use std::time::Duration;

    fn publisher() -> EventPublisher {
        EventPublisher::new(Arc::new(InMemoryBus::new()), Duration::from_millis(50))
    }

    fn input(title: &str) -> TodoInput {
        TodoInput {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_update_missing_pair_is_not_found_without_mutation() {
        let mut repo = MockTodoRepository::new();
        repo.expect_replace_owned()
            .times(1)
            .returning(|_, _, _| Ok(None));
        repo.expect_insert().never();
        repo.expect_delete_owned().never();

        let service = TodoManager::new(Arc::new(repo), publisher());
        let err = service
            .update_todo(&Uuid::new_v4().to_string(), "alice", input("New title"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_malformed_id_never_reaches_store() {
        // No expectations: any repository call would panic.
        let service = TodoManager::new(Arc::new(MockTodoRepository::new()), publisher());

        let err = service.get_todo("not-a-uuid", "alice").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        let err = service
            .update_todo("not-a-uuid", "alice", input("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_store() {
        let service = TodoManager::new(Arc::new(MockTodoRepository::new()), publisher());

        let err = service.create_todo("alice", input("   ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let bad_priority = TodoInput {
            priority: Some("urgent".into()),
            ..input("Title")
        };
        let err = service.create_todo("alice", bad_priority).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service.create_todo(" ", input("Title")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_and_delete_publish_events() {
        let bus = InMemoryBus::new();
        topology::declare_exchanges(&bus).await.unwrap();
        topology::bind_user_service_queues(&bus).await.unwrap();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), Duration::from_millis(200));
        let service = TodoManager::new(Arc::new(InMemoryTodoStore::new()), publisher);

        let todo = service.create_todo("alice", input("Ship it")).await.unwrap();
        assert_eq!(bus.queue_depth(USER_TODO_QUEUE).await, (1, 0));

        service
            .delete_todo(&todo.id.to_string(), "alice")
            .await
            .unwrap();
        assert_eq!(bus.queue_depth(USER_TODO_QUEUE).await, (2, 0));
    }

    #[tokio::test]
    async fn test_failed_delete_publishes_nothing() {
        let bus = InMemoryBus::new();
        topology::declare_exchanges(&bus).await.unwrap();
        topology::bind_user_service_queues(&bus).await.unwrap();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), Duration::from_millis(200));
        let service = TodoManager::new(Arc::new(InMemoryTodoStore::new()), publisher);

        let todo = service.create_todo("alice", input("Mine")).await.unwrap();
        let err = service
            .delete_todo(&todo.id.to_string(), "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(bus.queue_depth(USER_TODO_QUEUE).await, (1, 0));
    }

    #[tokio::test]
    async fn test_bus_outage_does_not_fail_create() {
        let bus = InMemoryBus::new();
        topology::declare_exchanges(&bus).await.unwrap();
        bus.set_available(false);
        let publisher = EventPublisher::new(Arc::new(bus), Duration::from_millis(50));
        let service = TodoManager::new(Arc::new(InMemoryTodoStore::new()), publisher);

        let todo = service.create_todo("alice", input("Offline")).await.unwrap();
        assert_eq!(service.count_todos("alice").await.unwrap(), 1);
        assert_eq!(todo.title, "Offline");
    }
}
