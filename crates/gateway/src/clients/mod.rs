//! gRPC clients for calling microservices.
//!
//! Each client sits behind a trait so handlers can be exercised without
//! running the services.

mod auth_client;
mod todo_client;
mod user_client;

pub use auth_client::{AuthApi, AuthClient, AuthSession, VerifiedUser};
pub use todo_client::{TodoApi, TodoClient, TodoQuery, TodoResponse};
pub use user_client::{ProfileWithCount, UserApi, UserClient};

#[cfg(test)]
pub use auth_client::MockAuthApi;
#[cfg(test)]
pub use todo_client::MockTodoApi;
#[cfg(test)]
pub use user_client::MockUserApi;
