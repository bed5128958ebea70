//! User Service Library
//!
//! Maintains the profile projection: materialised from `user.registered`,
//! kept current from `user.logged_in`, `todo.created` and `todo.deleted`,
//! and served over gRPC. It can be run as a standalone service or embedded
//! in the combined binary.

pub mod config;
pub mod grpc;
pub mod infra;
pub mod repository;
pub mod service;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tonic::transport::Server;
use tracing::{error, info};

use bus::{topology, Consumer, ConsumerOptions, EventBus};
use common::database;
use common::{DatabaseConfig, StorageBackend};
use domain::events::{USER_SERVICE_QUEUE, USER_TODO_QUEUE};

use crate::config::{UserServiceConfig, DEFAULT_DATABASE_URL};
use crate::grpc::UserGrpcService;
use crate::infra::Migrator;
use crate::repository::{InMemoryProfileStore, ProfileRepository, ProfileStore};
use crate::service::{
    GrpcTodoCounter, LedgerPruner, Projector, Reconciler, UserManager, UserService,
};

pub use common::database::MigrateAction;

const LEDGER_PRUNE_PERIOD: Duration = Duration::from_secs(3600);

/// Wired service parts sharing one profile store.
pub struct UserComponents {
    pub profiles: Arc<dyn ProfileRepository>,
    pub service: Arc<dyn UserService>,
    pub projector: Arc<Projector>,
}

/// Open the configured store and build the service and projector on it.
pub async fn build_components(
    config: &UserServiceConfig,
) -> Result<UserComponents, Box<dyn std::error::Error>> {
    let profiles: Arc<dyn ProfileRepository> = match config.storage {
        StorageBackend::Postgres => {
            let db = database::connect_and_migrate::<Migrator>(&config.database).await?;
            Arc::new(ProfileStore::new(db))
        }
        StorageBackend::Memory => {
            info!("Using in-memory profile store");
            Arc::new(InMemoryProfileStore::new())
        }
    };

    Ok(UserComponents {
        service: Arc::new(UserManager::new(profiles.clone())),
        projector: Arc::new(Projector::new(profiles.clone())),
        profiles,
    })
}

/// Standalone entry point: configuration from the environment and a bus
/// connection of its own.
pub async fn run(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = UserServiceConfig::from_env()?;
    let bus = bus::connect(&config.bus).await?;
    run_with_bus(host, port, config, bus).await
}

/// Run the gRPC server, the event consumers and, when configured, the
/// reconciliation job until the process is interrupted.
pub async fn run_with_bus(
    host: &str,
    port: u16,
    config: UserServiceConfig,
    bus: Arc<dyn EventBus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let components = build_components(&config).await?;
    topology::bind_user_service_queues(bus.as_ref()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = JoinSet::new();

    let options = ConsumerOptions::from(&config.bus);
    for queue in [USER_SERVICE_QUEUE, USER_TODO_QUEUE] {
        let consumer = Consumer::new(bus.clone(), queue, components.projector.clone(), options.clone());
        let shutdown = shutdown_rx.clone();
        background.spawn(async move {
            if let Err(e) = consumer.run(shutdown).await {
                error!(queue, error = %e, "Event consumer failed");
            }
        });
    }

    if let Some(period) = config.reconcile_interval {
        let counter = GrpcTodoCounter::new(&config.todo_service)?;
        let reconciler = Reconciler::new(components.profiles.clone(), Arc::new(counter));
        background.spawn(reconciler.run(period, shutdown_rx.clone()));
    }

    if let Some(retention) = config.tombstone_retention {
        let pruner = LedgerPruner::new(components.profiles.clone(), retention);
        background.spawn(pruner.run(LEDGER_PRUNE_PERIOD, shutdown_rx.clone()));
    }

    let grpc_service = UserGrpcService::new(components.service, config.rpc_timeout);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("User service listening on {}", addr);

    let served = Server::builder()
        .add_service(proto::UserServiceServer::new(grpc_service))
        .serve_with_shutdown(addr, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    shutdown_tx.send(true).ok();
    while background.join_next().await.is_some() {}

    served?;
    Ok(())
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = DatabaseConfig::from_env("USER_SERVICE", DEFAULT_DATABASE_URL)?;
    let connection = database::connect(&config).await?;
    database::migrate::<Migrator>(&connection, action).await?;
    Ok(())
}
