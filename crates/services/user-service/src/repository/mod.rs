//! Repository layer for data access.

pub mod entities;
mod memory;
mod profile_repository;

pub use memory::InMemoryProfileStore;
pub use profile_repository::{LoginOutcome, ProfileRepository, ProfileStore, TallyChange, TallyOutcome};

#[cfg(any(test, feature = "test-utils"))]
pub use profile_repository::MockProfileRepository;
