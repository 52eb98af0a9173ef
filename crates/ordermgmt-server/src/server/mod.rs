//! Server-side implementation of the order-management service.
//!
//! - [`config`] - CLI/env configuration.
//! - [`store`] - shared in-memory product and order stores.
//! - [`streaming`] - search, bulk update and shipment batching flows.
//! - [`service`] - the tonic service facade and stream lifecycle.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;
