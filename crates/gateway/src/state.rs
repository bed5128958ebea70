//! Application state for dependency injection.

use std::sync::Arc;

use common::AppResult;

use crate::clients::{AuthApi, AuthClient, TodoApi, TodoClient, UserApi, UserClient};
use crate::config::GatewayConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthApi>,
    pub users: Arc<dyn UserApi>,
    pub todos: Arc<dyn TodoApi>,
}

impl AppState {
    pub fn new(auth: Arc<dyn AuthApi>, users: Arc<dyn UserApi>, todos: Arc<dyn TodoApi>) -> Self {
        Self { auth, users, todos }
    }

    /// Build gRPC-backed state. Channels connect on first use.
    pub fn from_config(config: &GatewayConfig) -> AppResult<Self> {
        Ok(Self::new(
            Arc::new(AuthClient::connect(&config.auth_service)?),
            Arc::new(UserClient::connect(&config.user_service)?),
            Arc::new(TodoClient::connect(&config.todo_service)?),
        ))
    }
}
