//! Business logic layer.

mod todo_service;

pub use todo_service::{TodoManager, TodoService};
