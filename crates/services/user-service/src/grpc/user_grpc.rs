//! gRPC implementation for UserService.
//!
//! Business failures travel in the response body (`success = false`);
//! only transport faults and deadline expiry become a `Status`.

use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};

use crate::service::UserService;
use common::{with_deadline, AppResult, RpcFailure};
use domain::{Preferences, ProfileUpdate, UserProfile};
use proto::user::{
    user_service_server::UserService as UserServiceProto, GetUserRequest, UpdateUserRequest,
    User, UserProfileResponse, UserResponse,
};

/// gRPC service wrapper for UserService.
pub struct UserGrpcService {
    service: Arc<dyn UserService>,
    deadline: Duration,
}

impl UserGrpcService {
    /// Create a new gRPC service wrapper.
    pub fn new(service: Arc<dyn UserService>, deadline: Duration) -> Self {
        Self { service, deadline }
    }
}

/// Convert domain profile to proto message.
fn profile_to_proto(profile: &UserProfile) -> User {
    User {
        id: profile.id.clone(),
        email: profile.email.clone(),
        name: profile.name.clone(),
        bio: profile.bio.clone(),
        preferences: Some(proto::user::Preferences {
            theme: profile.preferences.theme.clone(),
            notifications: profile.preferences.notifications,
        }),
        last_login: profile
            .last_login
            .map(|at| at.to_rfc3339())
            .unwrap_or_default(),
        created_at: profile.created_at.to_rfc3339(),
        updated_at: profile.updated_at.to_rfc3339(),
    }
}

fn split(result: AppResult<UserProfile>) -> Result<Result<UserProfile, RpcFailure>, Status> {
    match result {
        Ok(profile) => Ok(Ok(profile)),
        Err(err) => err.into_rpc_failure().map(Err),
    }
}

fn user_response(result: AppResult<UserProfile>, message: &str) -> Result<Response<UserResponse>, Status> {
    Ok(Response::new(match split(result)? {
        Ok(profile) => UserResponse {
            success: true,
            message: message.to_string(),
            error_code: String::new(),
            user: Some(profile_to_proto(&profile)),
        },
        Err(failure) => UserResponse {
            success: false,
            message: failure.message,
            error_code: failure.code,
            user: None,
        },
    }))
}

#[tonic::async_trait]
impl UserServiceProto for UserGrpcService {
    async fn get_user(
        &self,
        request: Request<GetUserRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.get_user(&req.user_id)).await;

        user_response(result, "User retrieved")
    }

    async fn update_user(
        &self,
        request: Request<UpdateUserRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let req = request.into_inner();
        let update = ProfileUpdate {
            name: req.name,
            bio: req.bio,
            preferences: req.preferences.map(|p| Preferences {
                theme: p.theme,
                notifications: p.notifications,
            }),
        };
        let result = with_deadline(self.deadline, self.service.update_user(&req.user_id, update)).await;

        user_response(result, "Profile updated")
    }

    async fn get_user_profile(
        &self,
        request: Request<GetUserRequest>,
    ) -> Result<Response<UserProfileResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.get_user(&req.user_id)).await;

        Ok(Response::new(match split(result)? {
            Ok(profile) => UserProfileResponse {
                success: true,
                message: "Profile retrieved".to_string(),
                error_code: String::new(),
                user: Some(profile_to_proto(&profile)),
                todo_count: profile.todo_count,
            },
            Err(failure) => UserProfileResponse {
                success: false,
                message: failure.message,
                error_code: failure.code,
                ..Default::default()
            },
        }))
    }
}
