//! SeaORM entities.

pub mod todo_tally;
pub mod user_profile;
