//! Domain layer types and invariants.

pub mod cases;
pub mod entities;
pub mod error;
pub mod types;
