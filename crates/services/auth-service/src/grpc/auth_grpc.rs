//! gRPC implementation for AuthService.
//!
//! Business failures travel in the response body (`success = false`);
//! only transport faults and deadline expiry become a `Status`.

use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::service::{AuthService, AuthSession};
use common::{with_deadline, AppResult};
use proto::auth::{
    auth_service_server::AuthService as AuthServiceProto, AuthResponse, LoginRequest,
    RegisterRequest, VerifyTokenRequest, VerifyTokenResponse,
};

/// gRPC service wrapper for AuthService.
pub struct AuthGrpcService {
    service: Arc<dyn AuthService>,
    deadline: Duration,
}

impl AuthGrpcService {
    /// Create a new gRPC service wrapper.
    pub fn new(service: Arc<dyn AuthService>, deadline: Duration) -> Self {
        Self { service, deadline }
    }
}

fn auth_response(result: AppResult<AuthSession>, message: &str) -> Result<Response<AuthResponse>, Status> {
    match result {
        Ok(session) => Ok(Response::new(AuthResponse {
            success: true,
            message: message.to_string(),
            error_code: String::new(),
            token: session.token,
            user_id: session.user_id.to_string(),
        })),
        Err(err) => {
            let failure = err.into_rpc_failure()?;
            Ok(Response::new(AuthResponse {
                success: false,
                message: failure.message,
                error_code: failure.code,
                ..Default::default()
            }))
        }
    }
}

#[tonic::async_trait]
impl AuthServiceProto for AuthGrpcService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(
            self.deadline,
            self.service.register(req.email, req.password, req.name),
        )
        .await;

        auth_response(result, "User registered successfully")
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.login(req.email, req.password)).await;

        auth_response(result, "Login successful")
    }

    async fn verify_token(
        &self,
        request: Request<VerifyTokenRequest>,
    ) -> Result<Response<VerifyTokenResponse>, Status> {
        let req = request.into_inner();

        match self.service.verify_token(&req.token) {
            Ok(claims) => Ok(Response::new(VerifyTokenResponse {
                valid: true,
                user_id: claims.sub.to_string(),
                email: claims.email,
            })),
            Err(err) => {
                debug!(error = %err, "Token rejected");
                Ok(Response::new(VerifyTokenResponse {
                    valid: false,
                    user_id: String::new(),
                    email: String::new(),
                }))
            }
        }
    }
}
