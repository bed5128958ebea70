//! gRPC client for todo-service.

use async_trait::async_trait;
use serde::Serialize;
use tonic::transport::Channel;
use tracing::debug;

use common::{lazy_channel, AppError, AppResult, GrpcClientConfig};
use domain::TodoInput;
use proto::todo::{
    todo_service_client::TodoServiceClient as ProtoTodoServiceClient, CreateTodoRequest,
    GetTodosRequest, TodoIdRequest, UpdateTodoRequest,
};

#[cfg(test)]
use mockall::automock;

/// Todo as returned to HTTP clients.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodoResponse {
    pub id: String,
    pub user_id: String,
    #[schema(example = "Buy milk")]
    pub title: String,
    pub description: String,
    pub completed: bool,
    #[schema(example = "medium")]
    pub priority: String,
    /// RFC 3339
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    #[schema(example = "general")]
    pub category: String,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<proto::todo::Todo> for TodoResponse {
    fn from(proto: proto::todo::Todo) -> Self {
        Self {
            id: proto.id,
            user_id: proto.user_id,
            title: proto.title,
            description: proto.description,
            completed: proto.completed,
            priority: proto.priority,
            due_date: Some(proto.due_date).filter(|d| !d.is_empty()),
            tags: proto.tags,
            category: proto.category,
            archived: proto.archived,
            created_at: proto.created_at,
            updated_at: proto.updated_at,
        }
    }
}

/// Listing filters forwarded to `GetTodos`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoQuery {
    pub completed: Option<bool>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// 0 means the service default
    pub limit: u32,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TodoApi: Send + Sync {
    async fn create_todo(&self, user_id: &str, input: TodoInput) -> AppResult<TodoResponse>;

    async fn list_todos(&self, user_id: &str, query: TodoQuery) -> AppResult<Vec<TodoResponse>>;

    async fn get_todo(&self, user_id: &str, todo_id: &str) -> AppResult<TodoResponse>;

    async fn update_todo(
        &self,
        user_id: &str,
        todo_id: &str,
        input: TodoInput,
    ) -> AppResult<TodoResponse>;

    async fn delete_todo(&self, user_id: &str, todo_id: &str) -> AppResult<()>;

    async fn toggle_todo(&self, user_id: &str, todo_id: &str) -> AppResult<TodoResponse>;

    async fn archive_todo(&self, user_id: &str, todo_id: &str) -> AppResult<TodoResponse>;
}

/// gRPC client wrapper for todo-service.
pub struct TodoClient {
    client: ProtoTodoServiceClient<Channel>,
}

impl TodoClient {
    pub fn connect(config: &GrpcClientConfig) -> AppResult<Self> {
        debug!("Connecting to todo-service at {}", config.endpoint);
        Ok(Self {
            client: ProtoTodoServiceClient::new(lazy_channel(config)?),
        })
    }

    fn id_request(user_id: &str, todo_id: &str) -> tonic::Request<TodoIdRequest> {
        tonic::Request::new(TodoIdRequest {
            todo_id: todo_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

fn single(proto: proto::todo::TodoResponse) -> AppResult<TodoResponse> {
    if !proto.success {
        return Err(AppError::from_failure(&proto.error_code, proto.message));
    }
    proto
        .todo
        .map(TodoResponse::from)
        .ok_or_else(|| AppError::internal("todo-service returned no todo"))
}

#[async_trait]
impl TodoApi for TodoClient {
    async fn create_todo(&self, user_id: &str, input: TodoInput) -> AppResult<TodoResponse> {
        let request = tonic::Request::new(CreateTodoRequest {
            user_id: user_id.to_string(),
            title: input.title,
            description: input.description,
            priority: input.priority.unwrap_or_default(),
            due_date: input.due_date.unwrap_or_default(),
            tags: input.tags,
            category: input.category.unwrap_or_default(),
        });

        let mut client = self.client.clone();
        single(client.create_todo(request).await?.into_inner())
    }

    async fn list_todos(&self, user_id: &str, query: TodoQuery) -> AppResult<Vec<TodoResponse>> {
        let request = tonic::Request::new(GetTodosRequest {
            user_id: user_id.to_string(),
            completed: query.completed,
            priority: query.priority,
            category: query.category,
            tags: query.tags,
            limit: query.limit,
        });

        let mut client = self.client.clone();
        let proto = client.get_todos(request).await?.into_inner();
        if !proto.success {
            return Err(AppError::from_failure(&proto.error_code, proto.message));
        }
        Ok(proto.todos.into_iter().map(TodoResponse::from).collect())
    }

    async fn get_todo(&self, user_id: &str, todo_id: &str) -> AppResult<TodoResponse> {
        let mut client = self.client.clone();
        single(client.get_todo(Self::id_request(user_id, todo_id)).await?.into_inner())
    }

    async fn update_todo(
        &self,
        user_id: &str,
        todo_id: &str,
        input: TodoInput,
    ) -> AppResult<TodoResponse> {
        let request = tonic::Request::new(UpdateTodoRequest {
            todo_id: todo_id.to_string(),
            user_id: user_id.to_string(),
            title: input.title,
            description: input.description,
            priority: input.priority.unwrap_or_default(),
            due_date: input.due_date.unwrap_or_default(),
            tags: input.tags,
            category: input.category.unwrap_or_default(),
        });

        let mut client = self.client.clone();
        single(client.update_todo(request).await?.into_inner())
    }

    async fn delete_todo(&self, user_id: &str, todo_id: &str) -> AppResult<()> {
        let mut client = self.client.clone();
        let proto = client
            .delete_todo(Self::id_request(user_id, todo_id))
            .await?
            .into_inner();
        if !proto.success {
            return Err(AppError::from_failure(&proto.error_code, proto.message));
        }
        Ok(())
    }

    async fn toggle_todo(&self, user_id: &str, todo_id: &str) -> AppResult<TodoResponse> {
        let mut client = self.client.clone();
        single(client.toggle_todo(Self::id_request(user_id, todo_id)).await?.into_inner())
    }

    async fn archive_todo(&self, user_id: &str, todo_id: &str) -> AppResult<TodoResponse> {
        let mut client = self.client.clone();
        single(client.archive_todo(Self::id_request(user_id, todo_id)).await?.into_inner())
    }
}
