//! Todo Service Library
//!
//! Owns todo records: owner-scoped CRUD, toggle, archive and the internal
//! count used for profile reconciliation. Publishes `todo.created` and
//! `todo.deleted` events.

pub mod config;
pub mod grpc;
pub mod infra;
pub mod repository;
pub mod service;

use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::Server;
use tracing::info;

use bus::{EventBus, EventPublisher};
use common::database;
use common::{DatabaseConfig, StorageBackend};

use crate::config::{TodoServiceConfig, DEFAULT_DATABASE_URL};
use crate::grpc::TodoGrpcService;
use crate::infra::Migrator;
use crate::repository::{InMemoryTodoStore, TodoRepository, TodoStore};
use crate::service::{TodoManager, TodoService};

pub use common::database::MigrateAction;

/// Wire the service against the configured store and the given bus.
pub async fn build_service(
    config: &TodoServiceConfig,
    bus: Arc<dyn EventBus>,
) -> Result<Arc<dyn TodoService>, Box<dyn std::error::Error>> {
    let todos: Arc<dyn TodoRepository> = match config.storage {
        StorageBackend::Postgres => {
            let db = database::connect_and_migrate::<Migrator>(&config.database).await?;
            Arc::new(TodoStore::new(db))
        }
        StorageBackend::Memory => {
            info!("Using in-memory todo store");
            Arc::new(InMemoryTodoStore::new())
        }
    };

    bus::topology::declare_exchanges(bus.as_ref()).await?;
    let publisher = EventPublisher::new(bus, config.bus.publish_timeout());

    Ok(Arc::new(TodoManager::new(todos, publisher)))
}

/// Standalone entry point: configuration from the environment and a bus
/// connection of its own.
pub async fn run(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = TodoServiceConfig::from_env()?;
    let bus = bus::connect(&config.bus).await?;
    run_with_bus(host, port, config, bus).await
}

/// Run the gRPC server publishing to an existing bus.
pub async fn run_with_bus(
    host: &str,
    port: u16,
    config: TodoServiceConfig,
    bus: Arc<dyn EventBus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = build_service(&config, bus).await?;
    let grpc_service = TodoGrpcService::new(service, config.rpc_timeout);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Todo service listening on {}", addr);

    Server::builder()
        .add_service(proto::TodoServiceServer::new(grpc_service))
        .serve(addr)
        .await?;

    Ok(())
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = DatabaseConfig::from_env("TODO_SERVICE", DEFAULT_DATABASE_URL)?;
    let connection = database::connect(&config).await?;
    database::migrate::<Migrator>(&connection, action).await?;
    Ok(())
}
