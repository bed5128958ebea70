//! Bearer token authentication middleware.
//!
//! A missing or malformed `Authorization` header is `401`; a token the
//! auth service rejects is `403`.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use common::{AppError, AppResult};
use domain::BEARER_TOKEN_PREFIX;

use crate::state::AppState;

/// Verified caller identity, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request)?;

    let verified = state
        .auth
        .verify_token(&token)
        .await?
        .ok_or(AppError::Forbidden)?;

    request.extensions_mut().insert(CurrentUser {
        id: verified.user_id,
        email: verified.email,
    });

    Ok(next.run(request).await)
}

fn extract_token(request: &Request<Body>) -> AppResult<String> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    match header.strip_prefix(BEARER_TOKEN_PREFIX).map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AppError::Unauthorized),
    }
}
