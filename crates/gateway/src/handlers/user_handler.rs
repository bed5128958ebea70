//! Profile handlers.
//!
//! Profiles are projections materialised from `user.registered`; right
//! after registration a profile may briefly be `404`.

use axum::{
    extract::{Extension, Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use common::AppResult;
use domain::{Preferences, ProfileUpdate, UserResponse};

use crate::clients::ProfileWithCount;
use crate::extractors::ValidatedJson;
use crate::middleware::CurrentUser;
use crate::state::AppState;

/// Partial profile update. Omitted fields are left unchanged.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<String>,
    pub preferences: Option<Preferences>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub message: String,
    pub user: UserResponse,
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/profile/:id", get(get_user))
}

/// Current user's profile with todo count
#[utoipa::path(
    get,
    path = "/api/users/profile",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile and derived todo count", body = ProfileWithCount),
        (status = 401, description = "Missing bearer token"),
        (status = 403, description = "Invalid token"),
        (status = 404, description = "Profile not materialised yet")
    )
)]
pub async fn get_profile(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
) -> AppResult<Json<ProfileWithCount>> {
    let profile = state.users.get_profile(&current_user.id).await?;
    Ok(Json(profile))
}

/// Update the current user's profile
#[utoipa::path(
    put,
    path = "/api/users/profile",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserEnvelope),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Profile not materialised yet")
    )
)]
pub async fn update_profile(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<UpdateProfileRequest>,
) -> AppResult<Json<UserEnvelope>> {
    let update = ProfileUpdate {
        name: payload.name,
        bio: payload.bio,
        preferences: payload.preferences,
    };
    let user = state.users.update_user(&current_user.id, update).await?;

    Ok(Json(UserEnvelope {
        message: "Profile updated successfully".to_string(),
        user,
    }))
}

/// Public profile of any user
#[utoipa::path(
    get,
    path = "/api/users/profile/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = UserResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let user = state.users.get_user(&id).await?;
    Ok(Json(user))
}
