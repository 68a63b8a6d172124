//! Core infrastructure for replica-router.
//!
//! This crate provides the shared functionality the router crate is built on:
//! - Event system for observability
//! - The coordination store seam (`CoordinationStore`) that all cross-instance
//!   state goes through

pub mod events;
pub mod store;

pub use events::{EventListener, RoutingEvent};
pub use store::{CoordinationStore, StoreError};
