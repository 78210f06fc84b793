//! In-process ("collocated") invocation handler.
//!
//! When caller and callee live in the same process, a
//! [`CollocatedHandler`] bypasses the network stack entirely while
//! preserving the request/response/exception semantics, correlation,
//! batching, and cancellation behavior of a networked call.

#![warn(missing_docs)]

pub mod handler;

pub use handler::CollocatedHandler;
