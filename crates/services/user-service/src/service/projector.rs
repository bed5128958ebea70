//! Event projector - materialises profiles and todo counts from domain
//! events.
//!
//! Every handler tolerates redelivery: registration is create-if-absent,
//! logins keep the latest timestamp and todo events pass through the ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use bus::{EventHandler, HandlerError};
use common::AppResult;
use domain::events::{TodoCreated, TodoDeleted, UserLoggedIn, UserRegistered};
use domain::{DomainEvent, UserProfile};

use crate::repository::{LoginOutcome, ProfileRepository, TallyChange, TallyOutcome};

/// Projection counters. `orphaned` and `floor_hits` indicate drift
/// between the projection and the owning services.
#[derive(Debug, Default)]
pub struct ProjectionStats {
    registered: AtomicU64,
    duplicates: AtomicU64,
    orphaned: AtomicU64,
    floor_hits: AtomicU64,
}

impl ProjectionStats {
    pub fn registered(&self) -> u64 {
        self.registered.load(Ordering::Relaxed)
    }

    /// Events that had already been applied
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Events for users with no projection
    pub fn orphaned(&self) -> u64 {
        self.orphaned.load(Ordering::Relaxed)
    }

    /// Decrements refused at zero
    pub fn floor_hits(&self) -> u64 {
        self.floor_hits.load(Ordering::Relaxed)
    }
}

/// Applies identity and todo events to the profile store.
pub struct Projector {
    profiles: Arc<dyn ProfileRepository>,
    stats: Arc<ProjectionStats>,
}

impl Projector {
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self {
            profiles,
            stats: Arc::new(ProjectionStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ProjectionStats> {
        self.stats.clone()
    }

    pub async fn apply(&self, event: &DomainEvent) -> AppResult<()> {
        match event {
            DomainEvent::UserRegistered(e) => self.on_user_registered(e).await,
            DomainEvent::UserLoggedIn(e) => self.on_user_logged_in(e).await,
            DomainEvent::TodoCreated(e) => self.on_todo_created(e).await,
            DomainEvent::TodoDeleted(e) => self.on_todo_deleted(e).await,
        }
    }

    pub async fn on_user_registered(&self, event: &UserRegistered) -> AppResult<()> {
        let mut profile = UserProfile::registered(
            event.user_id.clone(),
            event.email.clone(),
            event.name.clone(),
            0,
        );
        profile.created_at = event.timestamp;
        profile.updated_at = event.timestamp;

        if self.profiles.create_if_absent(profile).await? {
            self.stats.registered.fetch_add(1, Ordering::Relaxed);
            info!(user_id = %event.user_id, "Profile materialised");
        } else {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(user_id = %event.user_id, "Profile already exists, registration ignored");
        }
        Ok(())
    }

    pub async fn on_user_logged_in(&self, event: &UserLoggedIn) -> AppResult<()> {
        match self.profiles.record_login(&event.user_id, event.timestamp).await? {
            LoginOutcome::Recorded => {
                debug!(user_id = %event.user_id, "Last login recorded");
            }
            LoginOutcome::Stale => {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            }
            LoginOutcome::Missing => {
                self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "consistency",
                    user_id = %event.user_id,
                    "Login for user without profile"
                );
            }
        }
        Ok(())
    }

    pub async fn on_todo_created(&self, event: &TodoCreated) -> AppResult<()> {
        let outcome = self
            .profiles
            .apply_tally(&event.user_id, &event.todo_id, TallyChange::Created)
            .await?;
        self.observe(&event.user_id, &event.todo_id, outcome);
        Ok(())
    }

    pub async fn on_todo_deleted(&self, event: &TodoDeleted) -> AppResult<()> {
        let outcome = self
            .profiles
            .apply_tally(&event.user_id, &event.todo_id, TallyChange::Deleted)
            .await?;
        self.observe(&event.user_id, &event.todo_id, outcome);
        Ok(())
    }

    fn observe(&self, user_id: &str, todo_id: &str, outcome: TallyOutcome) {
        match outcome {
            TallyOutcome::Counted {
                todo_count: Some(count),
                floored: false,
            } => {
                debug!(user_id, todo_id, todo_count = count, "Todo count updated");
            }
            TallyOutcome::Counted {
                todo_count: Some(_),
                floored: true,
            } => {
                self.stats.floor_hits.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "consistency",
                    user_id,
                    todo_id,
                    "Todo count already zero, decrement skipped"
                );
            }
            TallyOutcome::Counted {
                todo_count: None, ..
            } => {
                // Recorded in the ledger; seeds the count at registration.
                self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "consistency",
                    user_id,
                    todo_id,
                    "Todo event for user without profile"
                );
            }
            TallyOutcome::Tombstoned => {
                debug!(user_id, todo_id, "Deletion arrived before creation");
            }
            TallyOutcome::Duplicate => {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(user_id, todo_id, "Todo event already applied");
            }
        }
    }
}

#[async_trait]
impl EventHandler for Projector {
    async fn handle(
        &self,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        let event = DomainEvent::decode(routing_key, payload.clone())
            .map_err(|e| HandlerError::Malformed(e.to_string()))?;

        self.apply(&event)
            .await
            .map_err(|e| HandlerError::Retryable(e.to_string()))
    }
}
