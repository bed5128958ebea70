//! gRPC protocol buffer definitions.
//!
//! This crate contains the generated gRPC service definitions for:
//! - AuthService: identity issuance (register, login, verify)
//! - UserService: profile projection (get, update, profile with todo count)
//! - TodoService: owner-scoped todo CRUD, toggle, archive and count

/// Authentication service definitions.
pub mod auth {
    tonic::include_proto!("auth");
}

/// User service definitions.
pub mod user {
    tonic::include_proto!("user");
}

/// Todo service definitions.
pub mod todo {
    tonic::include_proto!("todo");
}

// Re-export commonly used items
pub use auth::auth_service_client::AuthServiceClient;
pub use auth::auth_service_server::{AuthService, AuthServiceServer};
pub use todo::todo_service_client::TodoServiceClient;
pub use todo::todo_service_server::{TodoService, TodoServiceServer};
pub use user::user_service_client::UserServiceClient;
pub use user::user_service_server::{UserService, UserServiceServer};
