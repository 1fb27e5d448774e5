//! Cart Upsell Core - Shared types library.
//!
//! This crate provides the types and pure logic used by the upsell widget:
//! - [`types`] - Newtype IDs, prices, catalog products, cart payloads
//! - [`config`] - The widget configuration supplied by the host page
//! - [`selection`] - The policy that filters and bounds upsell candidates
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no timers. This keeps the selection policy testable in isolation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod selection;
pub mod types;

pub use config::{ConfigError, ConfigIssue, RecommendationStrategy, UpsellConfig};
pub use selection::select_upsells;
pub use types::*;
