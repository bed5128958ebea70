//! gRPC client for auth-service.

use async_trait::async_trait;
use serde::Serialize;
use tonic::transport::Channel;
use tracing::debug;

use common::{lazy_channel, AppError, AppResult, GrpcClientConfig};
use proto::auth::{
    auth_service_client::AuthServiceClient as ProtoAuthServiceClient, AuthResponse, LoginRequest,
    RegisterRequest, VerifyTokenRequest,
};

#[cfg(test)]
use mockall::automock;

/// Token issued by register or login.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    #[schema(example = "Login successful")]
    pub message: String,
    pub token: String,
    pub user_id: String,
}

/// Identity behind a valid token.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedUser {
    pub user_id: String,
    pub email: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(&self, email: String, password: String, name: String)
        -> AppResult<AuthSession>;

    async fn login(&self, email: String, password: String) -> AppResult<AuthSession>;

    /// `None` for a malformed, expired or forged token.
    async fn verify_token(&self, token: &str) -> AppResult<Option<VerifiedUser>>;
}

/// gRPC client wrapper for auth-service.
pub struct AuthClient {
    client: ProtoAuthServiceClient<Channel>,
}

impl AuthClient {
    pub fn connect(config: &GrpcClientConfig) -> AppResult<Self> {
        debug!("Connecting to auth-service at {}", config.endpoint);
        Ok(Self {
            client: ProtoAuthServiceClient::new(lazy_channel(config)?),
        })
    }
}

fn into_session(proto: AuthResponse) -> AppResult<AuthSession> {
    if !proto.success {
        return Err(AppError::from_failure(&proto.error_code, proto.message));
    }
    Ok(AuthSession {
        message: proto.message,
        token: proto.token,
        user_id: proto.user_id,
    })
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn register(
        &self,
        email: String,
        password: String,
        name: String,
    ) -> AppResult<AuthSession> {
        let request = tonic::Request::new(RegisterRequest {
            email,
            password,
            name,
        });

        let mut client = self.client.clone();
        let response = client.register(request).await?;
        into_session(response.into_inner())
    }

    async fn login(&self, email: String, password: String) -> AppResult<AuthSession> {
        let request = tonic::Request::new(LoginRequest { email, password });

        let mut client = self.client.clone();
        let response = client.login(request).await?;
        into_session(response.into_inner())
    }

    async fn verify_token(&self, token: &str) -> AppResult<Option<VerifiedUser>> {
        let request = tonic::Request::new(VerifyTokenRequest {
            token: token.to_string(),
        });

        let mut client = self.client.clone();
        let proto = client.verify_token(request).await?.into_inner();

        if !proto.valid {
            return Ok(None);
        }

        Ok(Some(VerifiedUser {
            user_id: proto.user_id,
            email: proto.email,
        }))
    }
}
