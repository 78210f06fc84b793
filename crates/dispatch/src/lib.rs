//! Servant registry and dispatch routing.
//!
//! A [`ServantRegistry`] owns the authoritative mapping from addressable
//! identity to dispatch target and routes incoming requests to a servant,
//! a per-category default servant, or a locator-produced servant.

#![warn(missing_docs)]

pub mod registry;

pub use registry::ServantRegistry;
