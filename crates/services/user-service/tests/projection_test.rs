//! Profile projection driven through the in-memory bus.

use std::sync::Arc;
use std::time::Duration;

use bus::{topology, Consumer, ConsumerOptions, EventPublisher, InMemoryBus};
use domain::events::{USER_SERVICE_QUEUE, USER_TODO_QUEUE};
use domain::DomainEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use user_service_lib::repository::{InMemoryProfileStore, ProfileRepository};
use user_service_lib::service::Projector;

struct Harness {
    bus: InMemoryBus,
    store: Arc<InMemoryProfileStore>,
    publisher: EventPublisher,
    shutdown: watch::Sender<bool>,
    consumers: Vec<JoinHandle<()>>,
}

impl Harness {
    async fn start(workers: usize) -> Self {
        let bus = InMemoryBus::with_poll_interval(Duration::from_millis(10));
        topology::bind_user_service_queues(&bus).await.unwrap();

        let store = Arc::new(InMemoryProfileStore::new());
        let projector = Arc::new(Projector::new(store.clone()));
        let options = ConsumerOptions {
            workers,
            handler_timeout: Duration::from_secs(1),
            requeue_delay: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
        };

        let (shutdown, rx) = watch::channel(false);
        let consumers = [USER_SERVICE_QUEUE, USER_TODO_QUEUE]
            .into_iter()
            .map(|queue| {
                let consumer = Consumer::new(
                    Arc::new(bus.clone()),
                    queue,
                    projector.clone(),
                    options.clone(),
                );
                let rx = rx.clone();
                tokio::spawn(async move {
                    consumer.run(rx).await.unwrap();
                })
            })
            .collect();

        Self {
            publisher: EventPublisher::new(Arc::new(bus.clone()), Duration::from_millis(200)),
            bus,
            store,
            shutdown,
            consumers,
        }
    }

    async fn publish(&self, event: DomainEvent) {
        assert!(self.publisher.publish(&event).await);
    }

    /// Poll until `todo_count` for `user_id` equals `expected`.
    async fn wait_for_count(&self, user_id: &str, expected: u64) -> Option<u64> {
        let mut last = None;
        for _ in 0..300 {
            last = self
                .store
                .find_by_id(user_id)
                .await
                .unwrap()
                .map(|p| p.todo_count);
            if last == Some(expected) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        last
    }

    /// Wait until both queues have no ready or in-flight messages.
    async fn drain(&self) {
        for _ in 0..300 {
            let identity = self.bus.queue_depth(USER_SERVICE_QUEUE).await;
            let todos = self.bus.queue_depth(USER_TODO_QUEUE).await;
            if identity == (0, 0) && todos == (0, 0) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queues did not drain");
    }

    async fn count(&self, user_id: &str) -> u64 {
        self.store
            .find_by_id(user_id)
            .await
            .unwrap()
            .map(|p| p.todo_count)
            .unwrap()
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for consumer in self.consumers {
            consumer.await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_registration_materialises_projection_with_zero_count() {
    let harness = Harness::start(1).await;
    harness
        .publish(DomainEvent::user_registered("u1", "a@x.com", "A"))
        .await;

    assert_eq!(harness.wait_for_count("u1", 0).await, Some(0));
    let profile = harness.store.find_by_id("u1").await.unwrap().unwrap();
    assert_eq!(profile.email, "a@x.com");
    assert_eq!(profile.name, "A");

    harness.stop().await;
}

#[tokio::test]
async fn test_create_then_delete_returns_to_zero() {
    let harness = Harness::start(1).await;
    harness
        .publish(DomainEvent::user_registered("u1", "a@x.com", "A"))
        .await;
    assert_eq!(harness.wait_for_count("u1", 0).await, Some(0));

    harness.publish(DomainEvent::todo_created("t1", "u1")).await;
    harness.publish(DomainEvent::todo_deleted("t1", "u1")).await;
    harness.drain().await;

    assert_eq!(harness.count("u1").await, 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_delete_then_create_never_goes_negative() {
    let harness = Harness::start(1).await;
    harness
        .publish(DomainEvent::user_registered("u1", "a@x.com", "A"))
        .await;
    assert_eq!(harness.wait_for_count("u1", 0).await, Some(0));

    harness.publish(DomainEvent::todo_deleted("t1", "u1")).await;
    harness.publish(DomainEvent::todo_created("t1", "u1")).await;
    harness.drain().await;

    assert_eq!(harness.count("u1").await, 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_concurrent_creates_through_bus_converge() {
    let harness = Harness::start(4).await;
    harness
        .publish(DomainEvent::user_registered("u1", "a@x.com", "A"))
        .await;
    assert_eq!(harness.wait_for_count("u1", 0).await, Some(0));

    for i in 0..10 {
        harness
            .publish(DomainEvent::todo_created(format!("t{}", i), "u1"))
            .await;
    }

    harness.drain().await;

    assert_eq!(harness.count("u1").await, 10);
    harness.stop().await;
}

#[tokio::test]
async fn test_concurrent_handler_invocations_do_not_lose_updates() {
    let store = Arc::new(InMemoryProfileStore::new());
    let projector = Arc::new(Projector::new(store.clone()));
    projector
        .apply(&DomainEvent::user_registered("u1", "a@x.com", "A"))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let projector = projector.clone();
            tokio::spawn(async move {
                projector
                    .apply(&DomainEvent::todo_created(format!("t{}", i), "u1"))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let profile = store.find_by_id("u1").await.unwrap().unwrap();
    assert_eq!(profile.todo_count, 10);
}

#[tokio::test]
async fn test_redelivered_events_are_counted_once() {
    let harness = Harness::start(2).await;
    harness
        .publish(DomainEvent::user_registered("u1", "a@x.com", "A"))
        .await;
    harness
        .publish(DomainEvent::user_registered("u1", "a@x.com", "A"))
        .await;
    assert_eq!(harness.wait_for_count("u1", 0).await, Some(0));

    let created = DomainEvent::todo_created("t1", "u1");
    harness.publish(created.clone()).await;
    harness.publish(created).await;
    harness.publish(DomainEvent::todo_created("t2", "u1")).await;

    harness.drain().await;

    assert_eq!(harness.count("u1").await, 2);
    harness.stop().await;
}
