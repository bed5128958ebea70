//! Database connection and migration helpers shared by services that own a
//! SQL schema.

use std::collections::HashSet;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Statement};
use sea_orm_migration::{seaql_migrations, MigratorTrait};
use tracing::info;

use crate::config::DatabaseConfig;

/// Migration action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}

/// Open a pooled connection using the configured limits.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout())
        .acquire_timeout(config.acquire_timeout())
        .sqlx_logging(false);

    Database::connect(options).await
}

/// Connect and apply pending migrations.
pub async fn connect_and_migrate<M: MigratorTrait>(
    config: &DatabaseConfig,
) -> Result<DatabaseConnection, DbErr> {
    let connection = connect(config).await?;
    M::up(&connection, None).await?;
    info!("Database connected and migrations applied");
    Ok(connection)
}

/// Run a migration command against `connection`.
pub async fn migrate<M: MigratorTrait>(
    connection: &DatabaseConnection,
    action: MigrateAction,
) -> Result<(), DbErr> {
    match action {
        MigrateAction::Up => {
            M::up(connection, None).await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            M::down(connection, Some(1)).await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            for (name, applied) in migration_status::<M>(connection).await? {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            M::fresh(connection).await?;
            info!("Database reset and migrations applied");
        }
    }
    Ok(())
}

/// All defined migrations with their applied status.
pub async fn migration_status<M: MigratorTrait>(
    connection: &DatabaseConnection,
) -> Result<Vec<(String, bool)>, DbErr> {
    let applied: HashSet<String> = seaql_migrations::Entity::find()
        .order_by_asc(seaql_migrations::Column::Version)
        .all(connection)
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    Ok(M::migrations()
        .iter()
        .map(|m| {
            let name = m.name().to_string();
            let is_applied = applied.contains(&name);
            (name, is_applied)
        })
        .collect())
}

/// Check database connectivity by executing a simple query.
pub async fn ping(connection: &DatabaseConnection) -> Result<(), DbErr> {
    connection
        .execute(Statement::from_string(
            connection.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await?;
    Ok(())
}
