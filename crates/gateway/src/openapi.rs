//! OpenAPI documentation.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::clients::{AuthSession, ProfileWithCount, TodoResponse};
use crate::handlers::auth_handler::{
    LoginRequest, RegisterRequest, VerifyTokenRequest, VerifyTokenResponse,
};
use crate::handlers::todo_handler::{
    MessageResponse, TodoEnvelope, TodoListEnvelope, TodoRequest,
};
use crate::handlers::user_handler::{UpdateProfileRequest, UserEnvelope};
use domain::{Preferences, UserResponse};

/// API documentation struct.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::auth_handler::register,
        crate::handlers::auth_handler::login,
        crate::handlers::auth_handler::verify_token,
        crate::handlers::user_handler::get_profile,
        crate::handlers::user_handler::update_profile,
        crate::handlers::user_handler::get_user,
        crate::handlers::todo_handler::create_todo,
        crate::handlers::todo_handler::list_todos,
        crate::handlers::todo_handler::get_todo,
        crate::handlers::todo_handler::update_todo,
        crate::handlers::todo_handler::delete_todo,
        crate::handlers::todo_handler::toggle_todo,
        crate::handlers::todo_handler::archive_todo,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            VerifyTokenRequest,
            VerifyTokenResponse,
            AuthSession,
            UserResponse,
            Preferences,
            ProfileWithCount,
            UpdateProfileRequest,
            UserEnvelope,
            TodoRequest,
            TodoResponse,
            TodoEnvelope,
            TodoListEnvelope,
            MessageResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and token checks"),
        (name = "Users", description = "Profiles projected from identity events"),
        (name = "Todos", description = "Owner-scoped todo management"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
