//! In-memory stores shared by every RPC.
//!
//! Both stores are owned objects injected into the service at construction
//! and guarded internally by a [`parking_lot::RwLock`]. Locks are only held
//! for the duration of a single map operation and never across an `.await`.
//!
//! - [`catalog`] - products keyed by a server-assigned id.
//! - [`orders`] - orders keyed by order id, seeded from a JSON file.

pub mod catalog;
pub mod orders;
