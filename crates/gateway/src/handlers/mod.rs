//! HTTP request handlers.

pub mod auth_handler;
pub mod health_handler;
pub mod todo_handler;
pub mod user_handler;

pub use auth_handler::auth_routes;
pub use health_handler::health_routes;
pub use todo_handler::todo_routes;
pub use user_handler::user_routes;
