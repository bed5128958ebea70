//! Exchange and queue layout shared by every service.

use domain::events::{
    TODO_CREATED, TODO_DELETED, TODO_EVENTS_EXCHANGE, USER_EVENTS_EXCHANGE, USER_LOGGED_IN,
    USER_REGISTERED, USER_SERVICE_QUEUE, USER_TODO_QUEUE,
};

use crate::error::BusResult;
use crate::transport::EventBus;

/// `(queue, exchange, pattern)` bindings consumed by the user service.
pub const USER_SERVICE_BINDINGS: &[(&str, &str, &str)] = &[
    (USER_SERVICE_QUEUE, USER_EVENTS_EXCHANGE, USER_REGISTERED),
    (USER_SERVICE_QUEUE, USER_EVENTS_EXCHANGE, USER_LOGGED_IN),
    (USER_TODO_QUEUE, TODO_EVENTS_EXCHANGE, TODO_CREATED),
    (USER_TODO_QUEUE, TODO_EVENTS_EXCHANGE, TODO_DELETED),
];

/// Declare both topic exchanges. Safe to call from every service.
pub async fn declare_exchanges<B: EventBus + ?Sized>(bus: &B) -> BusResult<()> {
    bus.declare_exchange(USER_EVENTS_EXCHANGE).await?;
    bus.declare_exchange(TODO_EVENTS_EXCHANGE).await?;
    Ok(())
}

/// Declare and bind the user service's durable queues.
pub async fn bind_user_service_queues<B: EventBus + ?Sized>(bus: &B) -> BusResult<()> {
    declare_exchanges(bus).await?;
    for (queue, exchange, pattern) in USER_SERVICE_BINDINGS {
        bus.bind(queue, exchange, pattern).await?;
    }
    Ok(())
}
