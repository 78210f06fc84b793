//! Shared data model and collaborator interfaces for the tether RPC dispatch core.
//!
//! This crate defines the vocabulary the dispatch crates build on:
//! * `Identity`, `Protocol`, `Endpoint`, `Proxy`: addressing primitives
//! * `IncomingRequest`/`OutgoingResponse`: the dispatch request/response pair
//! * `Servant`/`ServantLocator`: dispatch target capabilities
//! * `ObjectAdapter`/`ThreadPool`/`DirectCount`: host-adapter collaborator surface
//! * `PendingInvocation`: single-shot completion bookkeeping for in-flight calls

#![warn(missing_docs)]

pub mod adapter;
pub mod error;
pub mod identity;
pub mod invocation;
pub mod request;
pub mod servant;

pub use adapter::{DirectCount, ObjectAdapter, PoolTask, ThreadPool, TokioThreadPool};
pub use error::{DispatchError, RegisteredKind, RegistryError};
pub use identity::{Endpoint, Identity, Protocol, Proxy};
pub use invocation::{AsyncStatus, CompletionReceiver, InvocationMode, PendingInvocation, RequestHandler};
pub use request::{Current, IncomingRequest, OutgoingResponse, Payload};
pub use servant::{Cookie, Servant, ServantLocator};
