//! Gateway configuration.

use common::{env_first, env_parse, AppResult, GrpcClientConfig};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Auth service gRPC client
    pub auth_service: GrpcClientConfig,
    /// User service gRPC client
    pub user_service: GrpcClientConfig,
    /// Todo service gRPC client
    pub todo_service: GrpcClientConfig,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            auth_service: GrpcClientConfig::from_env("AUTH_SERVICE_URL", "http://localhost:50051")?,
            user_service: GrpcClientConfig::from_env("USER_SERVICE_URL", "http://localhost:50052")?,
            todo_service: GrpcClientConfig::from_env("TODO_SERVICE_URL", "http://localhost:50053")?,
            host: env_first(&["GATEWAY_HOST"]).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse(&["GATEWAY_PORT", "PORT"], 3000)?,
        })
    }

    /// Point every client at `host` on the given ports.
    pub fn with_local_services(mut self, host: &str, auth_port: u16, user_port: u16, todo_port: u16) -> Self {
        self.auth_service.endpoint = format!("http://{}:{}", host, auth_port);
        self.user_service.endpoint = format!("http://{}:{}", host, user_port);
        self.todo_service.endpoint = format!("http://{}:{}", host, todo_port);
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let client = |endpoint: &str| GrpcClientConfig {
            endpoint: endpoint.to_string(),
            ..GrpcClientConfig::default()
        };
        Self {
            auth_service: client("http://localhost:50051"),
            user_service: client("http://localhost:50052"),
            todo_service: client("http://localhost:50053"),
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_services_override_endpoints() {
        let config = GatewayConfig::default().with_local_services("127.0.0.1", 1, 2, 3);
        assert_eq!(config.auth_service.endpoint, "http://127.0.0.1:1");
        assert_eq!(config.user_service.endpoint, "http://127.0.0.1:2");
        assert_eq!(config.todo_service.endpoint, "http://127.0.0.1:3");
    }
}
