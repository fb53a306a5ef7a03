//! # Fieldbell Gateway
//! Small HTTP surface for external systems: queue a report for a named
//! operator record, and a health check.

pub mod server;

pub use server::{AppState, build_router, serve};
