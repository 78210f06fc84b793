//! Adapter and replica-group endpoint registry.
//!
//! A [`LocationRegistry`] maintains the mapping from logical adapter and
//! replica-group identifiers to physical endpoints, kept separately per
//! wire-protocol generation, and resolves well-known objects by probing
//! candidates through a [`Pinger`].

#![warn(missing_docs)]

pub mod pinger;
pub mod registry;

pub use pinger::Pinger;
pub use registry::LocationRegistry;
