//! gRPC client channel construction.

use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::config::GrpcClientConfig;
use crate::error::{AppError, AppResult};

/// Build a lazily connecting channel with the configured connect and
/// per-request timeouts. The first call performs the connection.
pub fn lazy_channel(config: &GrpcClientConfig) -> AppResult<Channel> {
    debug!(endpoint = %config.endpoint, "Preparing gRPC channel");
    let endpoint = Endpoint::from_shared(config.endpoint.clone())
        .map_err(|e| AppError::internal(format!("Invalid endpoint {}: {}", config.endpoint, e)))?
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout());

    Ok(endpoint.connect_lazy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_endpoint_rejected() {
        let config = GrpcClientConfig {
            endpoint: "not a uri".to_string(),
            ..Default::default()
        };
        assert!(lazy_channel(&config).is_err());
    }

    #[tokio::test]
    async fn test_lazy_channel_does_not_connect() {
        let config = GrpcClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        assert!(lazy_channel(&config).is_ok());
    }
}
