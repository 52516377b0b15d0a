//! Common types for the transit upload broker.
//!
//! This crate defines the data model shared by every other transit crate:
//! the order row and its lifecycle enums, the wire types exchanged with the
//! ledger gateway and with bundlers, the HTTP response bodies, events, and
//! configuration schema validation.

/// HTTP response bodies returned by the service.
pub mod api;
/// Types returned by bundler nodes.
pub mod bundler;
/// Types returned by the staking contract.
pub mod contract;
/// Lifecycle events published on the event bus.
pub mod events;
/// Ledger transaction and confirmation types.
pub mod ledger;
/// Order rows, filters and patches.
pub mod order;
/// Configuration schema validation.
pub mod validation;

pub use api::*;
pub use bundler::*;
pub use contract::*;
pub use events::*;
pub use ledger::*;
pub use order::*;
pub use validation::*;
