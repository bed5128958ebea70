//! Postgres-backed profile store checks.
//!
//! Skipped unless `USER_SERVICE_TEST_DATABASE_URL` points at a scratch
//! database; the migrations are applied on first use.

use std::sync::Arc;

use chrono::Utc;
use domain::UserProfile;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tokio::sync::Mutex;
use user_service_lib::infra::Migrator;
use user_service_lib::repository::{ProfileRepository, ProfileStore, TallyChange, TallyOutcome};

static MIGRATE: Mutex<()> = Mutex::const_new(());

async fn store() -> Option<Arc<ProfileStore>> {
    let url = std::env::var("USER_SERVICE_TEST_DATABASE_URL").ok()?;
    let db = Database::connect(url).await.unwrap();
    {
        let _guard = MIGRATE.lock().await;
        Migrator::up(&db, None).await.unwrap();
    }
    Some(Arc::new(ProfileStore::new(db)))
}

fn run_id() -> String {
    Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
}

fn profile(id: &str) -> UserProfile {
    UserProfile::registered(id.to_string(), format!("{}@x.com", id), "Racer".into(), 0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registration_racing_todo_created_keeps_count() {
    let Some(store) = store().await else {
        return;
    };
    let run = run_id();

    for i in 0..100 {
        let user_id = format!("race-{}-{}", run, i);
        let todo_id = format!("race-todo-{}-{}", run, i);

        let register = {
            let store = store.clone();
            let user = profile(&user_id);
            tokio::spawn(async move { store.create_if_absent(user).await })
        };
        let created = {
            let store = store.clone();
            let user_id = user_id.clone();
            tokio::spawn(async move {
                store
                    .apply_tally(&user_id, &todo_id, TallyChange::Created)
                    .await
            })
        };

        assert!(register.await.unwrap().unwrap());
        created.await.unwrap().unwrap();

        let stored = store.find_by_id(&user_id).await.unwrap().unwrap();
        assert_eq!(stored.todo_count, 1, "user {}", user_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_converge_in_sql() {
    let Some(store) = store().await else {
        return;
    };
    let run = run_id();
    let user_id = format!("burst-{}", run);
    assert!(store.create_if_absent(profile(&user_id)).await.unwrap());

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let store = store.clone();
            let user_id = user_id.clone();
            let todo_id = format!("burst-todo-{}-{}", run, i);
            tokio::spawn(async move {
                store
                    .apply_tally(&user_id, &todo_id, TallyChange::Created)
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = store.find_by_id(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.todo_count, 10);
}

#[tokio::test]
async fn test_prune_tombstones_leaves_live_entries_in_sql() {
    let Some(store) = store().await else {
        return;
    };
    let run = run_id();
    let user_id = format!("prune-{}", run);
    let live = format!("prune-live-{}", run);
    let gone = format!("prune-gone-{}", run);

    store.apply_tally(&user_id, &live, TallyChange::Created).await.unwrap();
    store.apply_tally(&user_id, &gone, TallyChange::Deleted).await.unwrap();
    store
        .prune_tombstones(Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(
        store.apply_tally(&user_id, &live, TallyChange::Created).await.unwrap(),
        TallyOutcome::Duplicate
    );
    assert!(store.create_if_absent(profile(&user_id)).await.unwrap());
    let stored = store.find_by_id(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.todo_count, 1);
}
