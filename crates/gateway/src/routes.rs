//! Route configuration.

use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{auth_routes, health_routes, todo_routes, user_routes};
use crate::middleware::auth_middleware;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Public
        .nest("/auth", auth_routes())
        // Bearer token required
        .nest(
            "/users",
            user_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/todos",
            todo_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        );

    Router::new()
        .nest("/health", health_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::clients::{
        AuthSession, MockAuthApi, MockTodoApi, MockUserApi, TodoResponse, VerifiedUser,
    };
    use common::AppError;

    const TOKEN: &str = "good-token";

    fn verifying_auth() -> MockAuthApi {
        let mut auth = MockAuthApi::new();
        auth.expect_verify_token().returning(|token| {
            Ok((token == TOKEN).then(|| VerifiedUser {
                user_id: "alice".into(),
                email: "alice@example.com".into(),
            }))
        });
        auth
    }

    fn router(auth: MockAuthApi, users: MockUserApi, todos: MockTodoApi) -> Router {
        create_router(AppState::new(Arc::new(auth), Arc::new(users), Arc::new(todos)))
    }

    fn todo(id: &str, user_id: &str) -> TodoResponse {
        TodoResponse {
            id: id.into(),
            user_id: user_id.into(),
            title: "Buy milk".into(),
            description: String::new(),
            completed: false,
            priority: "medium".into(),
            due_date: None,
            tags: Vec::new(),
            category: "general".into(),
            archived: false,
            created_at: "2025-01-01T00:00:00+00:00".into(),
            updated_at: "2025-01-01T00:00:00+00:00".into(),
        }
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = router(MockAuthApi::new(), MockUserApi::new(), MockTodoApi::new());
        let response = app
            .oneshot(request(Method::GET, "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let mut auth = MockAuthApi::new();
        auth.expect_verify_token().never();
        let app = router(auth, MockUserApi::new(), MockTodoApi::new());

        let response = app
            .oneshot(request(Method::GET, "/api/todos", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_is_403() {
        let mut todos = MockTodoApi::new();
        todos.expect_list_todos().never();
        let app = router(verifying_auth(), MockUserApi::new(), todos);

        let response = app
            .oneshot(request(Method::GET, "/api/todos", Some("forged"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_register_returns_201_with_token() {
        let mut auth = MockAuthApi::new();
        auth.expect_register()
            .withf(|email, _, name| email == "bob@example.com" && name == "Bob")
            .returning(|_, _, _| {
                Ok(AuthSession {
                    message: "User registered successfully".into(),
                    token: "jwt".into(),
                    user_id: "u-1".into(),
                })
            });
        let app = router(auth, MockUserApi::new(), MockTodoApi::new());

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"email": "bob@example.com", "password": "Password123", "name": "Bob"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["token"], "jwt");
        assert_eq!(body["userId"], "u-1");
    }

    #[tokio::test]
    async fn test_register_validation_never_reaches_service() {
        let mut auth = MockAuthApi::new();
        auth.expect_register().never();
        let app = router(auth, MockUserApi::new(), MockTodoApi::new());

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"email": "not-an-email", "password": "Password123", "name": "Bob"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_409() {
        let mut auth = MockAuthApi::new();
        auth.expect_register()
            .returning(|_, _, _| Err(AppError::from_failure("CONFLICT", "Email already exists")));
        let app = router(auth, MockUserApi::new(), MockTodoApi::new());

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"email": "bob@example.com", "password": "Password123", "name": "Bob"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_todo_scoped_to_caller() {
        let mut todos = MockTodoApi::new();
        todos
            .expect_create_todo()
            .withf(|user_id, input| user_id == "alice" && input.title == "Buy milk")
            .times(1)
            .returning(|user_id, _| Ok(todo("t-1", user_id)));
        let app = router(verifying_auth(), MockUserApi::new(), todos);

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/todos",
                Some(TOKEN),
                Some(json!({"title": "Buy milk"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["todo"]["userId"], "alice");
        assert_eq!(body["todo"]["category"], "general");
    }

    #[tokio::test]
    async fn test_foreign_todo_is_404() {
        let mut todos = MockTodoApi::new();
        todos
            .expect_toggle_todo()
            .withf(|user_id, todo_id| user_id == "alice" && todo_id == "bobs-todo")
            .returning(|_, _| Err(AppError::NotFound));
        let app = router(verifying_auth(), MockUserApi::new(), todos);

        let response = app
            .oneshot(request(Method::PATCH, "/api/todos/bobs-todo/toggle", Some(TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_forwards_filters() {
        let mut todos = MockTodoApi::new();
        todos
            .expect_list_todos()
            .withf(|_, query| {
                query.completed == Some(false)
                    && query.tags == vec!["work".to_string()]
                    && query.limit == 10
            })
            .returning(|user_id, _| Ok(vec![todo("t-1", user_id)]));
        let app = router(verifying_auth(), MockUserApi::new(), todos);

        let response = app
            .oneshot(request(
                Method::GET,
                "/api/todos?completed=false&tags=work&limit=10",
                Some(TOKEN),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["todos"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_before_projection_is_404() {
        let mut users = MockUserApi::new();
        users
            .expect_get_profile()
            .withf(|user_id| user_id == "alice")
            .returning(|_| Err(AppError::NotFound));
        let app = router(verifying_auth(), users, MockTodoApi::new());

        let response = app
            .oneshot(request(Method::GET, "/api/users/profile", Some(TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let app = router(MockAuthApi::new(), MockUserApi::new(), MockTodoApi::new());
        let response = app
            .oneshot(request(Method::GET, "/api-docs/openapi.json", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert!(doc["paths"]["/api/todos/{id}/toggle"].is_object());
    }
}
