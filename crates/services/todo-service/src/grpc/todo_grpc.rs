//! gRPC implementation for TodoService.

use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};

use crate::service::TodoService;
use common::{with_deadline, AppResult, RpcFailure};
use domain::{Priority, Todo, TodoFilter, TodoInput};
use proto::todo::{
    todo_service_server::TodoService as TodoServiceProto, CountTodosRequest, CountTodosResponse,
    CreateTodoRequest, DeleteTodoResponse, GetTodosRequest, TodoIdRequest, TodoListResponse,
    TodoResponse, UpdateTodoRequest,
};

/// gRPC service wrapper for TodoService.
pub struct TodoGrpcService {
    service: Arc<dyn TodoService>,
    deadline: Duration,
}

impl TodoGrpcService {
    pub fn new(service: Arc<dyn TodoService>, deadline: Duration) -> Self {
        Self { service, deadline }
    }
}

fn todo_to_proto(todo: &Todo) -> proto::todo::Todo {
    proto::todo::Todo {
        id: todo.id.to_string(),
        user_id: todo.user_id.clone(),
        title: todo.title.clone(),
        description: todo.description.clone(),
        completed: todo.completed,
        priority: todo.priority.as_str().to_string(),
        due_date: todo.due_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
        tags: todo.tags.iter().cloned().collect(),
        category: todo.category.clone(),
        archived: todo.archived,
        created_at: todo.created_at.to_rfc3339(),
        updated_at: todo.updated_at.to_rfc3339(),
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Build the listing filter. A zero limit means the default page size.
fn filter_from_request(req: &GetTodosRequest) -> AppResult<TodoFilter> {
    let defaults = TodoFilter::default();
    let priority = match req.priority.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<Priority>()?),
    };

    Ok(TodoFilter {
        completed: req.completed,
        priority,
        category: req.category.clone().and_then(non_blank),
        tags: req.tags.clone(),
        limit: if req.limit == 0 { defaults.limit } else { req.limit },
    })
}

fn split<T>(result: AppResult<T>) -> Result<Result<T, RpcFailure>, Status> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(err) => err.into_rpc_failure().map(Err),
    }
}

fn todo_response(result: AppResult<Todo>, message: &str) -> Result<Response<TodoResponse>, Status> {
    Ok(Response::new(match split(result)? {
        Ok(todo) => TodoResponse {
            success: true,
            message: message.to_string(),
            error_code: String::new(),
            todo: Some(todo_to_proto(&todo)),
        },
        Err(failure) => TodoResponse {
            success: false,
            message: failure.message,
            error_code: failure.code,
            todo: None,
        },
    }))
}

#[tonic::async_trait]
impl TodoServiceProto for TodoGrpcService {
    async fn create_todo(
        &self,
        request: Request<CreateTodoRequest>,
    ) -> Result<Response<TodoResponse>, Status> {
        let req = request.into_inner();
        let input = TodoInput {
            title: req.title,
            description: req.description,
            priority: non_blank(req.priority),
            due_date: non_blank(req.due_date),
            tags: req.tags,
            category: non_blank(req.category),
        };
        let result = with_deadline(self.deadline, self.service.create_todo(&req.user_id, input)).await;

        todo_response(result, "Todo created")
    }

    async fn get_todos(
        &self,
        request: Request<GetTodosRequest>,
    ) -> Result<Response<TodoListResponse>, Status> {
        let req = request.into_inner();
        let result = match filter_from_request(&req) {
            Ok(filter) => with_deadline(self.deadline, self.service.get_todos(&req.user_id, filter)).await,
            Err(e) => Err(e),
        };

        Ok(Response::new(match split(result)? {
            Ok(todos) => TodoListResponse {
                success: true,
                message: format!("{} todos", todos.len()),
                error_code: String::new(),
                todos: todos.iter().map(todo_to_proto).collect(),
            },
            Err(failure) => TodoListResponse {
                success: false,
                message: failure.message,
                error_code: failure.code,
                todos: Vec::new(),
            },
        }))
    }

    async fn get_todo(
        &self,
        request: Request<TodoIdRequest>,
    ) -> Result<Response<TodoResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.get_todo(&req.todo_id, &req.user_id)).await;

        todo_response(result, "Todo retrieved")
    }

    async fn update_todo(
        &self,
        request: Request<UpdateTodoRequest>,
    ) -> Result<Response<TodoResponse>, Status> {
        let req = request.into_inner();
        let input = TodoInput {
            title: req.title,
            description: req.description,
            priority: non_blank(req.priority),
            due_date: non_blank(req.due_date),
            tags: req.tags,
            category: non_blank(req.category),
        };
        let result = with_deadline(
            self.deadline,
            self.service.update_todo(&req.todo_id, &req.user_id, input),
        )
        .await;

        todo_response(result, "Todo updated")
    }

    async fn delete_todo(
        &self,
        request: Request<TodoIdRequest>,
    ) -> Result<Response<DeleteTodoResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.delete_todo(&req.todo_id, &req.user_id)).await;

        Ok(Response::new(match split(result)? {
            Ok(()) => DeleteTodoResponse {
                success: true,
                message: "Todo deleted".to_string(),
                error_code: String::new(),
            },
            Err(failure) => DeleteTodoResponse {
                success: false,
                message: failure.message,
                error_code: failure.code,
            },
        }))
    }

    async fn toggle_todo(
        &self,
        request: Request<TodoIdRequest>,
    ) -> Result<Response<TodoResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.toggle_todo(&req.todo_id, &req.user_id)).await;

        todo_response(result, "Todo toggled")
    }

    async fn archive_todo(
        &self,
        request: Request<TodoIdRequest>,
    ) -> Result<Response<TodoResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.archive_todo(&req.todo_id, &req.user_id)).await;

        todo_response(result, "Todo archived")
    }

    async fn count_todos(
        &self,
        request: Request<CountTodosRequest>,
    ) -> Result<Response<CountTodosResponse>, Status> {
        let req = request.into_inner();
        let result = with_deadline(self.deadline, self.service.count_todos(&req.user_id)).await;

        Ok(Response::new(match split(result)? {
            Ok(count) => CountTodosResponse {
                success: true,
                message: String::new(),
                error_code: String::new(),
                count,
            },
            Err(failure) => CountTodosResponse {
                success: false,
                message: failure.message,
                error_code: failure.code,
                count: 0,
            },
        }))
    }
}
