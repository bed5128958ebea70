//! Service layer - business logic.

mod projector;
mod reconcile;
mod retention;
mod user_service;

pub use projector::{ProjectionStats, Projector};
pub use reconcile::{GrpcTodoCounter, ReconcileReport, Reconciler, TodoCounter};
pub use retention::LedgerPruner;
pub use user_service::{UserManager, UserService};

#[cfg(any(test, feature = "test-utils"))]
pub use reconcile::MockTodoCounter;
