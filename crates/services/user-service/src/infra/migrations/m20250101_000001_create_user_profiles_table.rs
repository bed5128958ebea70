//! Migration: Create user_profiles table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserProfiles::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserProfiles::Email).string_len(255).not_null())
                    .col(ColumnDef::new(UserProfiles::Name).string_len(255).not_null())
                    .col(ColumnDef::new(UserProfiles::Bio).text().not_null().default(""))
                    .col(
                        ColumnDef::new(UserProfiles::Theme)
                            .string_len(32)
                            .not_null()
                            .default("light"),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::Notifications)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::TodoCount)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(UserProfiles::TodoCount).gte(0)),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::LastLogin)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserProfiles::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserProfiles {
    Table,
    Id,
    Email,
    Name,
    Bio,
    Theme,
    Notifications,
    TodoCount,
    LastLogin,
    CreatedAt,
    UpdatedAt,
}
