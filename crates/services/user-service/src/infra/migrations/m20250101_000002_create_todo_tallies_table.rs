//! Migration: Create todo_tallies table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TodoTallies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TodoTallies::TodoId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TodoTallies::UserId).string_len(64).not_null())
                    .col(ColumnDef::new(TodoTallies::Deleted).boolean().not_null())
                    .col(
                        ColumnDef::new(TodoTallies::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_todo_tallies_user_id")
                    .table(TodoTallies::Table)
                    .col(TodoTallies::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TodoTallies::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum TodoTallies {
    Table,
    TodoId,
    UserId,
    Deleted,
    RecordedAt,
}
