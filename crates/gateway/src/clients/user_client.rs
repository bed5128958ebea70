//! gRPC client for user-service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tonic::transport::Channel;
use tracing::debug;

use common::{lazy_channel, AppError, AppResult, GrpcClientConfig};
use domain::{Preferences, ProfileUpdate, UserResponse};
use proto::user::{
    user_service_client::UserServiceClient as ProtoUserServiceClient, GetUserRequest,
    UpdateUserRequest,
};

#[cfg(test)]
use mockall::automock;

/// Profile together with its event-maintained todo count.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileWithCount {
    pub user: UserResponse,
    /// Derived from todo events; may lag the todo store
    pub todo_count: u64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserApi: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> AppResult<ProfileWithCount>;

    async fn get_user(&self, user_id: &str) -> AppResult<UserResponse>;

    async fn update_user(&self, user_id: &str, update: ProfileUpdate) -> AppResult<UserResponse>;
}

/// gRPC client wrapper for user-service.
pub struct UserClient {
    client: ProtoUserServiceClient<Channel>,
}

impl UserClient {
    pub fn connect(config: &GrpcClientConfig) -> AppResult<Self> {
        debug!("Connecting to user-service at {}", config.endpoint);
        Ok(Self {
            client: ProtoUserServiceClient::new(lazy_channel(config)?),
        })
    }
}

fn parse_timestamp(value: &str, field: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| AppError::internal(format!("Invalid {} from user-service", field)))
}

/// Convert proto User to the HTTP response shape.
fn proto_to_user(proto: Option<proto::user::User>) -> AppResult<UserResponse> {
    let proto = proto.ok_or_else(|| AppError::internal("user-service returned no user"))?;

    let last_login = if proto.last_login.is_empty() {
        None
    } else {
        Some(parse_timestamp(&proto.last_login, "last_login")?)
    };

    Ok(UserResponse {
        id: proto.id,
        email: proto.email,
        name: proto.name,
        bio: proto.bio,
        preferences: proto
            .preferences
            .map(|p| Preferences {
                theme: p.theme,
                notifications: p.notifications,
            })
            .unwrap_or_default(),
        last_login,
        created_at: parse_timestamp(&proto.created_at, "created_at")?,
    })
}

#[async_trait]
impl UserApi for UserClient {
    async fn get_profile(&self, user_id: &str) -> AppResult<ProfileWithCount> {
        let request = tonic::Request::new(GetUserRequest {
            user_id: user_id.to_string(),
        });

        let mut client = self.client.clone();
        let proto = client.get_user_profile(request).await?.into_inner();
        if !proto.success {
            return Err(AppError::from_failure(&proto.error_code, proto.message));
        }

        Ok(ProfileWithCount {
            user: proto_to_user(proto.user)?,
            todo_count: proto.todo_count,
        })
    }

    async fn get_user(&self, user_id: &str) -> AppResult<UserResponse> {
        let request = tonic::Request::new(GetUserRequest {
            user_id: user_id.to_string(),
        });

        let mut client = self.client.clone();
        let proto = client.get_user(request).await?.into_inner();
        if !proto.success {
            return Err(AppError::from_failure(&proto.error_code, proto.message));
        }
        proto_to_user(proto.user)
    }

    async fn update_user(&self, user_id: &str, update: ProfileUpdate) -> AppResult<UserResponse> {
        let request = tonic::Request::new(UpdateUserRequest {
            user_id: user_id.to_string(),
            name: update.name,
            bio: update.bio,
            preferences: update.preferences.map(|p| proto::user::Preferences {
                theme: p.theme,
                notifications: p.notifications,
            }),
        });

        let mut client = self.client.clone();
        let proto = client.update_user(request).await?.into_inner();
        if !proto.success {
            return Err(AppError::from_failure(&proto.error_code, proto.message));
        }
        proto_to_user(proto.user)
    }
}
