//! Periodic todo count reconciliation.
//!
//! Compares each projection's `todo_count` with the todo service and
//! corrects drift left by lost events. A correction is applied only when
//! the same mismatch is observed on two consecutive passes, so counts
//! with events still in flight are left alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tonic::transport::Channel;
use tracing::{debug, info, warn};

use common::{lazy_channel, AppError, AppResult, GrpcClientConfig};
use proto::todo::CountTodosRequest;
use proto::TodoServiceClient;

use crate::repository::ProfileRepository;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Source of truth for per-user todo counts.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait TodoCounter: Send + Sync {
    async fn count_todos(&self, user_id: &str) -> AppResult<u64>;
}

/// `TodoCounter` backed by the todo service's `CountTodos` RPC.
pub struct GrpcTodoCounter {
    client: TodoServiceClient<Channel>,
}

impl GrpcTodoCounter {
    pub fn new(config: &GrpcClientConfig) -> AppResult<Self> {
        Ok(Self {
            client: TodoServiceClient::new(lazy_channel(config)?),
        })
    }
}

#[async_trait]
impl TodoCounter for GrpcTodoCounter {
    async fn count_todos(&self, user_id: &str) -> AppResult<u64> {
        let request = tonic::Request::new(CountTodosRequest {
            user_id: user_id.to_string(),
        });

        let mut client = self.client.clone();
        let response = client.count_todos(request).await?.into_inner();
        if response.success {
            Ok(response.count)
        } else {
            Err(AppError::from_failure(&response.error_code, response.message))
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    /// Mismatches seen for the first time
    pub suspected: usize,
    pub corrected: usize,
    pub failed: usize,
}

pub struct Reconciler {
    profiles: Arc<dyn ProfileRepository>,
    counter: Arc<dyn TodoCounter>,
    /// `user_id -> (stored, actual)` mismatches from the previous pass
    suspects: Mutex<HashMap<String, (u64, u64)>>,
}

impl Reconciler {
    pub fn new(profiles: Arc<dyn ProfileRepository>, counter: Arc<dyn TodoCounter>) -> Self {
        Self {
            profiles,
            counter,
            suspects: Mutex::new(HashMap::new()),
        }
    }

    /// Check every projection once.
    pub async fn reconcile_all(&self) -> AppResult<ReconcileReport> {
        let ids = self.profiles.list_ids().await?;
        let mut report = ReconcileReport::default();
        let mut previous = std::mem::take(&mut *self.suspects.lock().await);
        let mut current = HashMap::new();

        for user_id in ids {
            report.checked += 1;
            match self.check(&user_id, previous.remove(&user_id)).await {
                Ok(Check::Consistent) => {}
                Ok(Check::Suspected(pair)) => {
                    report.suspected += 1;
                    current.insert(user_id, pair);
                }
                Ok(Check::Corrected) => report.corrected += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(user_id = %user_id, error = %e, "Reconciliation check failed");
                }
            }
        }

        *self.suspects.lock().await = current;
        Ok(report)
    }

    async fn check(&self, user_id: &str, previous: Option<(u64, u64)>) -> AppResult<Check> {
        let Some(profile) = self.profiles.find_by_id(user_id).await? else {
            return Ok(Check::Consistent);
        };
        let actual = self.counter.count_todos(user_id).await?;
        let stored = profile.todo_count;

        if stored == actual {
            return Ok(Check::Consistent);
        }
        if previous != Some((stored, actual)) {
            debug!(user_id, stored, actual, "Todo count mismatch, rechecking next pass");
            return Ok(Check::Suspected((stored, actual)));
        }

        if self.profiles.correct_todo_count(user_id, stored, actual).await? {
            warn!(
                target: "consistency",
                user_id,
                stored,
                actual,
                "Todo count drift corrected"
            );
            Ok(Check::Corrected)
        } else {
            // Moved by an event since it was read.
            Ok(Check::Consistent)
        }
    }

    /// Run a pass every `period` until `shutdown` flips.
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(period_secs = period.as_secs(), "Todo count reconciliation started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile_all().await {
                        Ok(report) => debug!(?report, "Reconciliation pass finished"),
                        Err(e) => warn!(error = %e, "Reconciliation pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Todo count reconciliation stopped");
    }
}

enum Check {
    Consistent,
    Suspected((u64, u64)),
    Corrected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryProfileStore, TallyChange};
    use domain::UserProfile;

    async fn store_with_count(count: u64) -> Arc<InMemoryProfileStore> {
        let store = Arc::new(InMemoryProfileStore::new());
        store
            .create_if_absent(UserProfile::registered("u1".into(), "a@x.com".into(), "A".into(), 0))
            .await
            .unwrap();
        for i in 0..count {
            store
                .apply_tally("u1", &format!("t{}", i), TallyChange::Created)
                .await
                .unwrap();
        }
        store
    }

    fn counter(count: u64) -> Arc<MockTodoCounter> {
        let mut counter = MockTodoCounter::new();
        counter.expect_count_todos().returning(move |_| Ok(count));
        Arc::new(counter)
    }

    #[tokio::test]
    async fn test_drift_corrected_after_second_pass() {
        let store = store_with_count(1).await;
        let reconciler = Reconciler::new(store.clone(), counter(3));

        let first = reconciler.reconcile_all().await.unwrap();
        assert_eq!(first.suspected, 1);
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 1);

        let second = reconciler.reconcile_all().await.unwrap();
        assert_eq!(second.corrected, 1);
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 3);
    }

    #[tokio::test]
    async fn test_moving_count_is_not_corrected() {
        let store = store_with_count(1).await;
        let reconciler = Reconciler::new(store.clone(), counter(3));

        reconciler.reconcile_all().await.unwrap();
        // An in-flight event lands between passes.
        store.apply_tally("u1", "late", TallyChange::Created).await.unwrap();

        let second = reconciler.reconcile_all().await.unwrap();
        assert_eq!(second.corrected, 0);
        assert_eq!(second.suspected, 1);
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 2);
    }

    #[tokio::test]
    async fn test_counter_failure_is_reported_not_fatal() {
        let store = store_with_count(0).await;
        let mut failing = MockTodoCounter::new();
        failing
            .expect_count_todos()
            .returning(|_| Err(AppError::service_unavailable("todo-service")));
        let reconciler = Reconciler::new(store, Arc::new(failing));

        let report = reconciler.reconcile_all().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.failed, 1);
    }
}
