//! Combined binary for development - runs every service in one process
//! over a single shared event bus.

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth_service_lib::config::AuthServiceConfig;
use common::BusConfig;
use todo_service_lib::config::TodoServiceConfig;
use user_service_lib::config::UserServiceConfig;
use user_service_lib::MigrateAction;

#[derive(Parser)]
#[command(name = "todo-platform")]
#[command(about = "Combined microservices binary for development")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all services in a single process (development mode)
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value = "3000")]
        gateway_port: u16,
        #[arg(long, default_value = "50051")]
        auth_port: u16,
        #[arg(long, default_value = "50052")]
        user_port: u16,
        #[arg(long, default_value = "50053")]
        todo_port: u16,
    },
    /// Run database migrations for all services
    Migrate {
        #[command(subcommand)]
        action: MigrateCommands,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum MigrateCommands {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Reset database and run all migrations
    Fresh,
}

impl From<MigrateCommands> for MigrateAction {
    fn from(command: MigrateCommands) -> Self {
        match command {
            MigrateCommands::Up => MigrateAction::Up,
            MigrateCommands::Down => MigrateAction::Down,
            MigrateCommands::Status => MigrateAction::Status,
            MigrateCommands::Fresh => MigrateAction::Fresh,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            gateway_port,
            auth_port,
            user_port,
            todo_port,
        } => {
            info!("Starting combined services in development mode");
            info!("  Gateway:      http://{}:{}", host, gateway_port);
            info!("  Auth service: http://{}:{}", host, auth_port);
            info!("  User service: http://{}:{}", host, user_port);
            info!("  Todo service: http://{}:{}", host, todo_port);

            let user_config = UserServiceConfig::from_env()?;
            let auth_config = AuthServiceConfig::from_env()?;
            let todo_config = TodoServiceConfig::from_env()?;

            // One bus for every component, so the in-memory backend routes
            // between them.
            let bus = bus::connect(&BusConfig::from_env()?).await?;
            // Queues must exist before the first event is published.
            bus::topology::bind_user_service_queues(bus.as_ref()).await?;

            let user_host = host.clone();
            let user_bus = bus.clone();
            let user_handle = tokio::spawn(async move {
                if let Err(e) =
                    user_service_lib::run_with_bus(&user_host, user_port, user_config, user_bus).await
                {
                    error!("User service failed: {}", e);
                }
            });

            let auth_host = host.clone();
            let auth_bus = bus.clone();
            let auth_handle = tokio::spawn(async move {
                if let Err(e) =
                    auth_service_lib::run_with_bus(&auth_host, auth_port, auth_config, auth_bus).await
                {
                    error!("Auth service failed: {}", e);
                }
            });

            let todo_host = host.clone();
            let todo_handle = tokio::spawn(async move {
                if let Err(e) =
                    todo_service_lib::run_with_bus(&todo_host, todo_port, todo_config, bus).await
                {
                    error!("Todo service failed: {}", e);
                }
            });

            let gateway_host = host.clone();
            let gateway_handle = tokio::spawn(async move {
                if let Err(e) = gateway_lib::run_embedded(
                    &gateway_host,
                    gateway_port,
                    auth_port,
                    user_port,
                    todo_port,
                )
                .await
                {
                    error!("Gateway failed: {}", e);
                }
            });

            // Any component exiting ends the process
            tokio::select! {
                _ = user_handle => {
                    error!("User service exited");
                }
                _ = auth_handle => {
                    error!("Auth service exited");
                }
                _ = todo_handle => {
                    error!("Todo service exited");
                }
                _ = gateway_handle => {
                    error!("Gateway exited");
                }
            }
        }
        Commands::Migrate { action } => {
            let action = MigrateAction::from(action);
            auth_service_lib::run_migrations(action).await?;
            user_service_lib::run_migrations(action).await?;
            todo_service_lib::run_migrations(action).await?;
        }
    }

    Ok(())
}
