//! SeaORM entities.

pub mod todo;
