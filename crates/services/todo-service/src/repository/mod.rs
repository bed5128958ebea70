//! Repository layer for data access.

pub mod entities;
mod memory;
mod todo_repository;

pub use memory::InMemoryTodoStore;
pub use todo_repository::{TodoRepository, TodoStore};

#[cfg(any(test, feature = "test-utils"))]
pub use todo_repository::MockTodoRepository;
