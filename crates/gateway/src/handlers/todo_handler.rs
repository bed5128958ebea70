//! Todo handlers. Every call is scoped to the authenticated user.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use common::AppResult;
use domain::TodoInput;

use crate::clients::{TodoQuery, TodoResponse};
use crate::extractors::ValidatedJson;
use crate::middleware::CurrentUser;
use crate::state::AppState;

/// Create or full-replace body. Omitted optional fields take their defaults.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodoRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    #[schema(example = "Buy milk")]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: String,
    /// low, medium or high
    #[schema(example = "high")]
    pub priority: Option<String>,
    /// RFC 3339 or YYYY-MM-DD
    #[schema(example = "2030-01-31")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[schema(example = "work")]
    pub category: Option<String>,
}

impl From<TodoRequest> for TodoInput {
    fn from(req: TodoRequest) -> Self {
        TodoInput {
            title: req.title,
            description: req.description,
            priority: req.priority,
            due_date: req.due_date,
            tags: req.tags,
            category: req.category,
        }
    }
}

/// Listing filters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTodosQuery {
    pub completed: Option<bool>,
    pub priority: Option<String>,
    pub category: Option<String>,
    /// Comma-separated; matches todos carrying any of them
    pub tags: Option<String>,
    pub limit: Option<u32>,
}

impl From<ListTodosQuery> for TodoQuery {
    fn from(query: ListTodosQuery) -> Self {
        TodoQuery {
            completed: query.completed,
            priority: query.priority,
            category: query.category,
            tags: query
                .tags
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            limit: query.limit.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TodoEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub todo: TodoResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TodoListEnvelope {
    pub todos: Vec<TodoResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn envelope(message: &str, todo: TodoResponse) -> Json<TodoEnvelope> {
    Json(TodoEnvelope {
        message: Some(message.to_string()),
        todo,
    })
}

pub fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/:id", get(get_todo).put(update_todo).delete(delete_todo))
        .route("/:id/toggle", patch(toggle_todo))
        .route("/:id/archive", patch(archive_todo))
}

/// Create a todo
#[utoipa::path(
    post,
    path = "/api/todos",
    tag = "Todos",
    security(("bearer_auth" = [])),
    request_body = TodoRequest,
    responses(
        (status = 201, description = "Todo created", body = TodoEnvelope),
        (status = 400, description = "Validation error")
    )
)]
pub async fn create_todo(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<TodoRequest>,
) -> AppResult<(StatusCode, Json<TodoEnvelope>)> {
    let todo = state
        .todos
        .create_todo(&current_user.id, payload.into())
        .await?;

    Ok((StatusCode::CREATED, envelope("Todo created successfully", todo)))
}

/// List the caller's unarchived todos, newest first
#[utoipa::path(
    get,
    path = "/api/todos",
    tag = "Todos",
    security(("bearer_auth" = [])),
    params(ListTodosQuery),
    responses(
        (status = 200, description = "Matching todos", body = TodoListEnvelope),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_todos(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Query(query): Query<ListTodosQuery>,
) -> AppResult<Json<TodoListEnvelope>> {
    let todos = state
        .todos
        .list_todos(&current_user.id, query.into())
        .await?;

    Ok(Json(TodoListEnvelope { todos }))
}

/// Get one todo
#[utoipa::path(
    get,
    path = "/api/todos/{id}",
    tag = "Todos",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "The todo", body = TodoEnvelope),
        (status = 404, description = "No such todo for this user")
    )
)]
pub async fn get_todo(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TodoEnvelope>> {
    let todo = state.todos.get_todo(&current_user.id, &id).await?;
    Ok(Json(TodoEnvelope { message: None, todo }))
}

/// Replace a todo's mutable fields
#[utoipa::path(
    put,
    path = "/api/todos/{id}",
    tag = "Todos",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Todo ID")),
    request_body = TodoRequest,
    responses(
        (status = 200, description = "Todo updated", body = TodoEnvelope),
        (status = 400, description = "Validation error"),
        (status = 404, description = "No such todo for this user")
    )
)]
pub async fn update_todo(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<TodoRequest>,
) -> AppResult<Json<TodoEnvelope>> {
    let todo = state
        .todos
        .update_todo(&current_user.id, &id, payload.into())
        .await?;

    Ok(envelope("Todo updated successfully", todo))
}

/// Delete a todo
#[utoipa::path(
    delete,
    path = "/api/todos/{id}",
    tag = "Todos",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "Todo deleted", body = MessageResponse),
        (status = 404, description = "No such todo for this user")
    )
)]
pub async fn delete_todo(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.todos.delete_todo(&current_user.id, &id).await?;

    Ok(Json(MessageResponse {
        message: "Todo deleted successfully".to_string(),
    }))
}

/// Flip the completion flag
#[utoipa::path(
    patch,
    path = "/api/todos/{id}/toggle",
    tag = "Todos",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "Todo toggled", body = TodoEnvelope),
        (status = 404, description = "No such todo for this user")
    )
)]
pub async fn toggle_todo(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TodoEnvelope>> {
    let todo = state.todos.toggle_todo(&current_user.id, &id).await?;
    Ok(envelope("Todo toggled successfully", todo))
}

/// Archive a todo. Archived todos drop out of listings.
#[utoipa::path(
    patch,
    path = "/api/todos/{id}/archive",
    tag = "Todos",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "Todo archived", body = TodoEnvelope),
        (status = 404, description = "No such todo for this user")
    )
)]
pub async fn archive_todo(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TodoEnvelope>> {
    let todo = state.todos.archive_todo(&current_user.id, &id).await?;
    Ok(envelope("Todo archived successfully", todo))
}
