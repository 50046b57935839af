//! Bankroll ledger REST server library.
//!
//! Exposes the router, configuration, logging, and metrics so the
//! binary and the integration tests share one construction path.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
