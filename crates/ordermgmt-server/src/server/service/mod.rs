//! gRPC service implementation and stream lifecycle management.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`OrderService`).
//! - [`lifecycle`] - in-flight stream tracking and graceful shutdown.

pub mod handler;
pub mod lifecycle;
