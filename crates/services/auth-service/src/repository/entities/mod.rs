//! SeaORM entities.

pub mod identity;
