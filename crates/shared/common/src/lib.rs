//! Common utilities shared across all microservices.
//!
//! This crate provides:
//! - Unified error handling for HTTP and gRPC
//! - Structured RPC failure results
//! - Deadline helpers
//! - Configuration structures
//! - gRPC client channels with timeouts
//! - Database connection and migration helpers (`database` feature)

pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod deadline;
pub mod error;
pub mod grpc;

pub use config::*;
pub use deadline::with_deadline;
pub use error::{AppError, AppResult, OptionExt, RpcFailure};
pub use grpc::lazy_channel;
