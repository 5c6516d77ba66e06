//! Optimistic status updates for cases, backed by a reconciling read cache.
//!
//! - [`cache`]: the resource-agnostic engine (store, queries, mutations)
//! - [`domain`]: case records, statuses and the status-change rules
//! - [`application`]: the data-service contract, the case policy and the
//!   presentation-facing [`application::client::CaseClient`]
//! - [`infra`]: simulated service, call timeouts and telemetry
//! - [`config`]: layered settings and the CLI definition

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
