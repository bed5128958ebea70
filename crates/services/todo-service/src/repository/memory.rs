//! In-memory todo store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::TodoRepository;
use common::{AppError, AppResult};
use domain::{Todo, TodoFields, TodoFilter};

#[derive(Default)]
pub struct InMemoryTodoStore {
    todos: Mutex<HashMap<Uuid, Todo>>,
}

impl InMemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `change` to the todo if `user_id` owns it.
    async fn modify_owned(
        &self,
        id: Uuid,
        user_id: &str,
        change: impl FnOnce(&mut Todo),
    ) -> AppResult<Option<Todo>> {
        let mut todos = self.todos.lock().await;
        Ok(todos
            .get_mut(&id)
            .filter(|t| t.is_owned_by(user_id))
            .map(|todo| {
                change(todo);
                todo.clone()
            }))
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoStore {
    async fn insert(&self, todo: Todo) -> AppResult<Todo> {
        let mut todos = self.todos.lock().await;
        if todos.contains_key(&todo.id) {
            return Err(AppError::conflict("Todo"));
        }
        todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn find_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>> {
        let todos = self.todos.lock().await;
        Ok(todos.get(&id).filter(|t| t.is_owned_by(user_id)).cloned())
    }

    async fn list(&self, user_id: &str, filter: TodoFilter) -> AppResult<Vec<Todo>> {
        let todos = self.todos.lock().await;
        let mut owned: Vec<Todo> = todos
            .values()
            .filter(|t| t.is_owned_by(user_id) && filter.matches(t))
            .cloned()
            .collect();

        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(filter.limit as usize);
        Ok(owned)
    }

    async fn replace_owned(
        &self,
        id: Uuid,
        user_id: &str,
        fields: TodoFields,
    ) -> AppResult<Option<Todo>> {
        self.modify_owned(id, user_id, |todo| todo.replace(fields))
            .await
    }

    async fn toggle_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>> {
        self.modify_owned(id, user_id, Todo::toggle).await
    }

    async fn archive_owned(&self, id: Uuid, user_id: &str) -> AppResult<Option<Todo>> {
        self.modify_owned(id, user_id, Todo::archive).await
    }

    async fn delete_owned(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        let mut todos = self.todos.lock().await;
        if todos.get(&id).is_some_and(|t| t.is_owned_by(user_id)) {
            todos.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn count(&self, user_id: &str) -> AppResult<u64> {
        let todos = self.todos.lock().await;
        Ok(todos.values().filter(|t| t.is_owned_by(user_id)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::{Priority, TodoInput};
    use tokio_test::assert_ok;

    fn fields(title: &str) -> TodoFields {
        TodoFields::try_from(TodoInput {
            title: title.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    async fn seeded(store: &InMemoryTodoStore, user_id: &str, title: &str) -> Todo {
        store
            .insert(Todo::new(user_id.to_string(), fields(title)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_other_owner_sees_nothing() {
        let store = InMemoryTodoStore::new();
        let todo = seeded(&store, "alice", "Secret").await;

        assert!(store.find_owned(todo.id, "bob").await.unwrap().is_none());
        assert!(store.toggle_owned(todo.id, "bob").await.unwrap().is_none());
        assert!(store.archive_owned(todo.id, "bob").await.unwrap().is_none());
        assert!(!store.delete_owned(todo.id, "bob").await.unwrap());

        let untouched = store.find_owned(todo.id, "alice").await.unwrap().unwrap();
        assert!(!untouched.completed);
        assert!(!untouched.archived);
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_flag() {
        let store = InMemoryTodoStore::new();
        let todo = seeded(&store, "alice", "Flip").await;

        let once = assert_ok!(store.toggle_owned(todo.id, "alice").await).unwrap();
        assert!(once.completed);
        let twice = assert_ok!(store.toggle_owned(todo.id, "alice").await).unwrap();
        assert!(!twice.completed);
    }

    #[tokio::test]
    async fn test_list_excludes_archived_and_orders_newest_first() {
        let store = InMemoryTodoStore::new();
        let mut older = Todo::new("alice".into(), fields("Older"));
        older.created_at = Utc::now() - Duration::minutes(5);
        store.insert(older).await.unwrap();
        let newer = seeded(&store, "alice", "Newer").await;
        let archived = seeded(&store, "alice", "Gone").await;
        store.archive_owned(archived.id, "alice").await.unwrap();
        seeded(&store, "bob", "Not mine").await;

        let listed = store.list("alice", TodoFilter::default()).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Newer", "Older"]);
        assert_eq!(listed[0].id, newer.id);

        // Archived todos still count.
        assert_eq!(store.count("alice").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_list_filters_and_limit() {
        let store = InMemoryTodoStore::new();
        let mut urgent = fields("Urgent");
        urgent.priority = Priority::High;
        urgent.tags.insert("work".to_string());
        store
            .insert(Todo::new("alice".into(), urgent))
            .await
            .unwrap();
        seeded(&store, "alice", "Later").await;
        seeded(&store, "alice", "Much later").await;

        let high = TodoFilter {
            priority: Some(Priority::High),
            ..Default::default()
        };
        assert_eq!(store.list("alice", high).await.unwrap().len(), 1);

        let tagged = TodoFilter {
            tags: vec!["home".into(), "work".into()],
            ..Default::default()
        };
        let found = store.list("alice", tagged).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Urgent");

        let limited = TodoFilter {
            limit: 2,
            ..Default::default()
        };
        assert_eq!(store.list("alice", limited).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_keeps_completion_and_owner() {
        let store = InMemoryTodoStore::new();
        let todo = seeded(&store, "alice", "Draft").await;
        store.toggle_owned(todo.id, "alice").await.unwrap();

        let replaced = store
            .replace_owned(todo.id, "alice", fields("Final"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced.title, "Final");
        assert!(replaced.completed);
        assert_eq!(replaced.user_id, "alice");
        assert!(store
            .replace_owned(Uuid::new_v4(), "alice", fields("Nope"))
            .await
            .unwrap()
            .is_none());
    }
}
