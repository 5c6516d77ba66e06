//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod mock;
pub mod telemetry;
pub mod timeout;
