//! Application services: the data-service contract and the Case deployment
//! of the cache engine.

pub mod api;
pub mod client;
pub mod error;
pub mod policy;
