//! Profile projection repository backed by Postgres.
//!
//! Todo counters are maintained through a ledger keyed by todo id, so a
//! redelivered or reordered todo event never moves a counter twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    Set, Statement, TransactionTrait,
};

use super::entities::todo_tally::{self, Entity as TallyEntity};
use super::entities::user_profile::{self, Entity as ProfileEntity};
use common::AppResult;
use domain::{ProfileUpdate, UserProfile};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Todo lifecycle step fed into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyChange {
    Created,
    Deleted,
}

/// Result of applying a todo event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyOutcome {
    /// The ledger accepted the event. `todo_count` is `None` when the user
    /// has no projection yet; `floored` is set when a decrement was refused
    /// at zero.
    Counted { todo_count: Option<u64>, floored: bool },
    /// Deletion seen before any creation. A later creation is ignored.
    Tombstoned,
    /// Already applied.
    Duplicate,
}

/// Result of recording a login time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Recorded,
    /// A later login is already stored
    Stale,
    /// No projection for the user
    Missing,
}

/// Profile repository trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Find projection by user id
    async fn find_by_id(&self, id: &str) -> AppResult<Option<UserProfile>>;

    /// Insert unless a projection with the same id exists and report
    /// whether it was inserted. `todo_count` is seeded from the live ledger
    /// entries already recorded for the user.
    async fn create_if_absent(&self, profile: UserProfile) -> AppResult<bool>;

    /// Apply a partial update. `None` when no projection exists.
    async fn update_profile(&self, id: &str, update: ProfileUpdate)
        -> AppResult<Option<UserProfile>>;

    /// Store `at` as the last login unless a later value is present.
    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> AppResult<LoginOutcome>;

    /// Apply one todo event. Ledger write and counter update are atomic.
    async fn apply_tally(
        &self,
        user_id: &str,
        todo_id: &str,
        change: TallyChange,
    ) -> AppResult<TallyOutcome>;

    /// Overwrite `todo_count` with `actual` only while it still equals
    /// `expected`. Returns whether the row changed.
    async fn correct_todo_count(&self, id: &str, expected: u64, actual: u64) -> AppResult<bool>;

    /// Ids of every materialised projection
    async fn list_ids(&self) -> AppResult<Vec<String>>;

    /// Drop ledger entries for deleted todos last touched before
    /// `older_than`. Returns how many were removed.
    async fn prune_tombstones(&self, older_than: DateTime<Utc>) -> AppResult<u64>;
}

/// Concrete implementation of ProfileRepository
pub struct ProfileStore {
    db: DatabaseConnection,
}

impl ProfileStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn db_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Serialize every ledger and counter write for one user until the
/// transaction ends. Registration and todo events arrive on separate queues.
async fn lock_user(txn: &DatabaseTransaction, user_id: &str) -> Result<(), DbErr> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        [user_id.into()],
    ))
    .await?;
    Ok(())
}

/// Insert a ledger row; `false` when the todo id is already recorded.
async fn insert_tally(
    txn: &DatabaseTransaction,
    user_id: &str,
    todo_id: &str,
    deleted: bool,
) -> Result<bool, DbErr> {
    let row = todo_tally::ActiveModel {
        todo_id: Set(todo_id.to_string()),
        user_id: Set(user_id.to_string()),
        deleted: Set(deleted),
        recorded_at: Set(Utc::now()),
    };

    let inserted = TallyEntity::insert(row)
        .on_conflict(
            OnConflict::column(todo_tally::Column::TodoId)
                .do_nothing()
                .to_owned(),
        )
        .exec(txn)
        .await;

    match inserted {
        Ok(_) => Ok(true),
        Err(DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Move the counter by `delta` in SQL. Decrements never go below zero.
async fn shift_count(
    txn: &DatabaseTransaction,
    user_id: &str,
    delta: i64,
) -> Result<(Option<u64>, bool), DbErr> {
    let update = ProfileEntity::update_many()
        .col_expr(
            user_profile::Column::TodoCount,
            Expr::col(user_profile::Column::TodoCount).add(delta),
        )
        .filter(user_profile::Column::Id.eq(user_id));
    let update = if delta < 0 {
        update.filter(user_profile::Column::TodoCount.gt(0))
    } else {
        update
    };
    let applied = update.exec(txn).await?.rows_affected > 0;

    let current = ProfileEntity::find_by_id(user_id.to_string()).one(txn).await?;
    Ok(match current {
        Some(model) => (Some(u64::try_from(model.todo_count).unwrap_or(0)), !applied),
        None => (None, false),
    })
}

#[async_trait]
impl ProfileRepository for ProfileStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<UserProfile>> {
        let model = ProfileEntity::find_by_id(id.to_string()).one(&self.db).await?;
        Ok(model.map(UserProfile::from))
    }

    async fn create_if_absent(&self, profile: UserProfile) -> AppResult<bool> {
        let txn = self.db.begin().await?;
        lock_user(&txn, &profile.id).await?;

        let live = TallyEntity::find()
            .filter(todo_tally::Column::UserId.eq(profile.id.as_str()))
            .filter(todo_tally::Column::Deleted.eq(false))
            .count(&txn)
            .await?;

        let row = user_profile::ActiveModel {
            id: Set(profile.id),
            email: Set(profile.email),
            name: Set(profile.name),
            bio: Set(profile.bio),
            theme: Set(profile.preferences.theme),
            notifications: Set(profile.preferences.notifications),
            todo_count: Set(db_count(live)),
            last_login: Set(profile.last_login),
            created_at: Set(profile.created_at),
            updated_at: Set(profile.updated_at),
        };

        let inserted = ProfileEntity::insert(row)
            .on_conflict(
                OnConflict::column(user_profile::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&txn)
            .await;

        let inserted = match inserted {
            Ok(_) => true,
            Err(DbErr::RecordNotInserted) => false,
            Err(e) => return Err(e.into()),
        };

        txn.commit().await?;
        Ok(inserted)
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> AppResult<Option<UserProfile>> {
        // Only the edited columns are written; counters stay untouched.
        let mut active = user_profile::ActiveModel {
            id: Set(id.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(name) = update.name {
            active.name = Set(name);
        }
        if let Some(bio) = update.bio {
            active.bio = Set(bio);
        }
        if let Some(preferences) = update.preferences {
            active.theme = Set(preferences.theme);
            active.notifications = Set(preferences.notifications);
        }

        match active.update(&self.db).await {
            Ok(model) => Ok(Some(UserProfile::from(model))),
            Err(DbErr::RecordNotUpdated) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> AppResult<LoginOutcome> {
        let result = ProfileEntity::update_many()
            .col_expr(user_profile::Column::LastLogin, Expr::value(at))
            .filter(user_profile::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(user_profile::Column::LastLogin.is_null())
                    .add(user_profile::Column::LastLogin.lt(at)),
            )
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(LoginOutcome::Recorded);
        }

        let exists = ProfileEntity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .is_some();
        Ok(if exists {
            LoginOutcome::Stale
        } else {
            LoginOutcome::Missing
        })
    }

    async fn apply_tally(
        &self,
        user_id: &str,
        todo_id: &str,
        change: TallyChange,
    ) -> AppResult<TallyOutcome> {
        let txn = self.db.begin().await?;
        lock_user(&txn, user_id).await?;

        let outcome = match change {
            TallyChange::Created => {
                if insert_tally(&txn, user_id, todo_id, false).await? {
                    let (todo_count, floored) = shift_count(&txn, user_id, 1).await?;
                    TallyOutcome::Counted { todo_count, floored }
                } else {
                    TallyOutcome::Duplicate
                }
            }
            TallyChange::Deleted => {
                if insert_tally(&txn, user_id, todo_id, true).await? {
                    TallyOutcome::Tombstoned
                } else {
                    let marked = TallyEntity::update_many()
                        .col_expr(todo_tally::Column::Deleted, Expr::value(true))
                        .col_expr(todo_tally::Column::RecordedAt, Expr::value(Utc::now()))
                        .filter(todo_tally::Column::TodoId.eq(todo_id))
                        .filter(todo_tally::Column::Deleted.eq(false))
                        .exec(&txn)
                        .await?;

                    if marked.rows_affected == 0 {
                        TallyOutcome::Duplicate
                    } else {
                        let (todo_count, floored) = shift_count(&txn, user_id, -1).await?;
                        TallyOutcome::Counted { todo_count, floored }
                    }
                }
            }
        };

        txn.commit().await?;
        Ok(outcome)
    }

    async fn correct_todo_count(&self, id: &str, expected: u64, actual: u64) -> AppResult<bool> {
        let result = ProfileEntity::update_many()
            .col_expr(user_profile::Column::TodoCount, Expr::value(db_count(actual)))
            .filter(user_profile::Column::Id.eq(id))
            .filter(user_profile::Column::TodoCount.eq(db_count(expected)))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn list_ids(&self) -> AppResult<Vec<String>> {
        let ids = ProfileEntity::find()
            .select_only()
            .column(user_profile::Column::Id)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;

        Ok(ids)
    }
    async fn prune_tombstones(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let result = TallyEntity::delete_many()
            .filter(todo_tally::Column::Deleted.eq(true))
            .filter(todo_tally::Column::RecordedAt.lt(older_than))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
