//! Ledger of todo events applied to the counters, keyed by todo id.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "todo_tallies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub todo_id: String,
    pub user_id: String,
    /// Set once `todo.deleted` has been seen, with or without a prior creation
    pub deleted: bool,
    pub recorded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
