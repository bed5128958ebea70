//! In-memory profile store for tests and single-process runs.
//!
//! Profiles and the todo ledger sit behind one mutex, so every operation
//! is a single critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{LoginOutcome, ProfileRepository, TallyChange, TallyOutcome};
use common::AppResult;
use domain::{ProfileUpdate, UserProfile};

struct Tally {
    user_id: String,
    deleted: bool,
    recorded_at: DateTime<Utc>,
}

impl Tally {
    fn new(user_id: &str, deleted: bool) -> Self {
        Self {
            user_id: user_id.to_string(),
            deleted,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct State {
    profiles: HashMap<String, UserProfile>,
    tallies: HashMap<String, Tally>,
    /// Live ledger entries per user
    live: HashMap<String, u64>,
}

impl State {
    fn live_tallies(&self, user_id: &str) -> u64 {
        self.live.get(user_id).copied().unwrap_or(0)
    }

    fn track_live(&mut self, user_id: &str, increment: bool) {
        if increment {
            *self.live.entry(user_id.to_string()).or_default() += 1;
        } else if let Some(count) = self.live.get_mut(user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.live.remove(user_id);
            }
        }
    }

    fn shift_count(&mut self, user_id: &str, increment: bool) -> TallyOutcome {
        match self.profiles.get_mut(user_id) {
            Some(profile) => {
                let floored = !increment && profile.todo_count == 0;
                if increment {
                    profile.todo_count += 1;
                } else if !floored {
                    profile.todo_count -= 1;
                }
                TallyOutcome::Counted {
                    todo_count: Some(profile.todo_count),
                    floored,
                }
            }
            None => TallyOutcome::Counted {
                todo_count: None,
                floored: false,
            },
        }
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    state: Mutex<State>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.state.lock().await.profiles.get(id).cloned())
    }

    async fn create_if_absent(&self, mut profile: UserProfile) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.profiles.contains_key(&profile.id) {
            return Ok(false);
        }

        profile.todo_count = state.live_tallies(&profile.id);
        state.profiles.insert(profile.id.clone(), profile);
        Ok(true)
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> AppResult<Option<UserProfile>> {
        let mut state = self.state.lock().await;
        Ok(state.profiles.get_mut(id).map(|profile| {
            profile.apply(update);
            profile.clone()
        }))
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> AppResult<LoginOutcome> {
        let mut state = self.state.lock().await;
        Ok(match state.profiles.get_mut(id) {
            Some(profile) => {
                if profile.record_login(at) {
                    LoginOutcome::Recorded
                } else {
                    LoginOutcome::Stale
                }
            }
            None => LoginOutcome::Missing,
        })
    }

    async fn apply_tally(
        &self,
        user_id: &str,
        todo_id: &str,
        change: TallyChange,
    ) -> AppResult<TallyOutcome> {
        let mut state = self.state.lock().await;

        let seen = state.tallies.get(todo_id).map(|t| t.deleted);

        let outcome = match (change, seen) {
            (TallyChange::Created, Some(_)) | (TallyChange::Deleted, Some(true)) => {
                TallyOutcome::Duplicate
            }
            (TallyChange::Created, None) => {
                state
                    .tallies
                    .insert(todo_id.to_string(), Tally::new(user_id, false));
                state.track_live(user_id, true);
                state.shift_count(user_id, true)
            }
            (TallyChange::Deleted, Some(false)) => {
                if let Some(tally) = state.tallies.get_mut(todo_id) {
                    tally.deleted = true;
                    tally.recorded_at = Utc::now();
                }
                state.track_live(user_id, false);
                state.shift_count(user_id, false)
            }
            (TallyChange::Deleted, None) => {
                state
                    .tallies
                    .insert(todo_id.to_string(), Tally::new(user_id, true));
                TallyOutcome::Tombstoned
            }
        };

        Ok(outcome)
    }

    async fn correct_todo_count(&self, id: &str, expected: u64, actual: u64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        Ok(match state.profiles.get_mut(id) {
            Some(profile) if profile.todo_count == expected => {
                profile.todo_count = actual;
                true
            }
            _ => false,
        })
    }

    async fn list_ids(&self) -> AppResult<Vec<String>> {
        Ok(self.state.lock().await.profiles.keys().cloned().collect())
    }

    async fn prune_tombstones(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.tallies.len();
        state
            .tallies
            .retain(|_, t| !(t.deleted && t.recorded_at < older_than));
        Ok((before - state.tallies.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> UserProfile {
        UserProfile::registered(id.into(), "a@x.com".into(), "A".into(), 0)
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_first() {
        let store = InMemoryProfileStore::new();
        assert!(store.create_if_absent(profile("u1")).await.unwrap());

        let mut second = profile("u1");
        second.name = "Other".into();
        assert!(!store.create_if_absent(second).await.unwrap());
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().name, "A");
    }

    #[tokio::test]
    async fn test_registration_seeds_count_from_ledger() {
        let store = InMemoryProfileStore::new();
        store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        store.apply_tally("u1", "t2", TallyChange::Created).await.unwrap();
        store.apply_tally("u1", "t2", TallyChange::Deleted).await.unwrap();

        store.create_if_absent(profile("u1")).await.unwrap();
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_events_count_once() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(profile("u1")).await.unwrap();

        let first = store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        let again = store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        assert_eq!(
            first,
            TallyOutcome::Counted {
                todo_count: Some(1),
                floored: false
            }
        );
        assert_eq!(again, TallyOutcome::Duplicate);

        store.apply_tally("u1", "t1", TallyChange::Deleted).await.unwrap();
        let again = store.apply_tally("u1", "t1", TallyChange::Deleted).await.unwrap();
        assert_eq!(again, TallyOutcome::Duplicate);
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 0);
    }

    #[tokio::test]
    async fn test_delete_before_create_is_tombstoned() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(profile("u1")).await.unwrap();

        let deleted = store.apply_tally("u1", "t1", TallyChange::Deleted).await.unwrap();
        let created = store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        assert_eq!(deleted, TallyOutcome::Tombstoned);
        assert_eq!(created, TallyOutcome::Duplicate);
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 0);
    }

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let store = InMemoryProfileStore::new();
        store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        store.create_if_absent(profile("u1")).await.unwrap();
        store.correct_todo_count("u1", 1, 0).await.unwrap();

        let outcome = store.apply_tally("u1", "t1", TallyChange::Deleted).await.unwrap();
        assert_eq!(
            outcome,
            TallyOutcome::Counted {
                todo_count: Some(0),
                floored: true
            }
        );
    }

    #[tokio::test]
    async fn test_correct_todo_count_is_conditional() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(profile("u1")).await.unwrap();

        assert!(!store.correct_todo_count("u1", 3, 5).await.unwrap());
        assert!(store.correct_todo_count("u1", 0, 5).await.unwrap());
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 5);
    }

    #[tokio::test]
    async fn test_record_login_outcomes() {
        let store = InMemoryProfileStore::new();
        let now = Utc::now();
        assert_eq!(store.record_login("u1", now).await.unwrap(), LoginOutcome::Missing);

        store.create_if_absent(profile("u1")).await.unwrap();
        assert_eq!(store.record_login("u1", now).await.unwrap(), LoginOutcome::Recorded);
        assert_eq!(
            store
                .record_login("u1", now - chrono::Duration::seconds(1))
                .await
                .unwrap(),
            LoginOutcome::Stale
        );
    }

    #[tokio::test]
    async fn test_prune_tombstones_keeps_live_entries() {
        let store = InMemoryProfileStore::new();
        store.create_if_absent(profile("u1")).await.unwrap();
        store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        store.apply_tally("u1", "t2", TallyChange::Created).await.unwrap();
        store.apply_tally("u1", "t2", TallyChange::Deleted).await.unwrap();
        store.apply_tally("u1", "t3", TallyChange::Deleted).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.prune_tombstones(cutoff).await.unwrap(), 2);
        assert_eq!(store.prune_tombstones(cutoff).await.unwrap(), 0);

        // The live entry still deduplicates and still seeds late registrations.
        let again = store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        assert_eq!(again, TallyOutcome::Duplicate);
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 1);
    }

    #[tokio::test]
    async fn test_prune_tombstones_respects_cutoff() {
        let store = InMemoryProfileStore::new();
        store.apply_tally("u1", "t1", TallyChange::Deleted).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.prune_tombstones(cutoff).await.unwrap(), 0);
        let created = store.apply_tally("u1", "t1", TallyChange::Created).await.unwrap();
        assert_eq!(created, TallyOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_live_count_follows_deletes_for_seeding() {
        let store = InMemoryProfileStore::new();
        store.apply_tally("u2", "t1", TallyChange::Created).await.unwrap();
        store.apply_tally("u1", "t2", TallyChange::Created).await.unwrap();
        store.apply_tally("u1", "t2", TallyChange::Deleted).await.unwrap();

        store.create_if_absent(profile("u1")).await.unwrap();
        store.create_if_absent(profile("u2")).await.unwrap();
        assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().todo_count, 0);
        assert_eq!(store.find_by_id("u2").await.unwrap().unwrap().todo_count, 1);
    }
}
