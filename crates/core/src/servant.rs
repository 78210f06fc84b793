//! Dispatch target capabilities: servants and servant locators.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::request::{Current, IncomingRequest, OutgoingResponse};

/// A dispatch target: handle one request, produce a response or fail.
///
/// Directly registered servants, per-category default servants, and
/// locator-produced transient servants all implement this one trait;
/// the servant registry resolves which of them handles a request.
#[async_trait]
pub trait Servant: Send + Sync {
	/// Handles one request.
	async fn dispatch(&self, request: IncomingRequest) -> Result<OutgoingResponse, DispatchError>;
}

/// Opaque per-call state passed from `locate` to `finished`.
pub type Cookie = Option<Box<dyn Any + Send>>;

/// Just-in-time servant resolver for a category.
///
/// Consulted by the servant registry when no direct or default servant is
/// registered for an identity. `finished` is called exactly once for every
/// `locate` that returned a servant, whether or not the forwarded dispatch
/// succeeded.
pub trait ServantLocator: Send + Sync {
	/// Resolves a servant for the request, or `None` to decline.
	fn locate(&self, current: &Current) -> Result<Option<(Arc<dyn Servant>, Cookie)>, DispatchError>;

	/// Releases per-call resources after the dispatch has run.
	fn finished(&self, current: &Current, servant: &Arc<dyn Servant>, cookie: Cookie) -> Result<(), DispatchError>;

	/// Detaches the locator from its category during registry shutdown.
	fn deactivate(&self, category: &str) -> Result<(), DispatchError>;
}
