//! Domain layer - Core business entities, value objects and events.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! Every service and the gateway share these types.

pub mod constants;
pub mod error;
pub mod events;
pub mod identity;
pub mod password;
pub mod todo;
pub mod user;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use events::{DomainEvent, EventDecodeError};
pub use identity::{normalize_email, validate_email, validate_name, Identity, NewIdentity};
pub use password::Password;
pub use todo::{parse_due_date, Priority, Todo, TodoFields, TodoFilter, TodoInput};
pub use user::{Preferences, ProfileUpdate, UserProfile, UserResponse};
