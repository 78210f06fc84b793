use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex as PlMutex;
use pretty_assertions::assert_eq;
use tether_core::Current;

use super::*;

struct EchoServant {
	reply: &'static str,
}

#[async_trait]
impl Servant for EchoServant {
	async fn dispatch(&self, _request: IncomingRequest) -> Result<OutgoingResponse, DispatchError> {
		Ok(OutgoingResponse::new(Bytes::from_static(self.reply.as_bytes())))
	}
}

struct FailingServant;

#[async_trait]
impl Servant for FailingServant {
	async fn dispatch(&self, request: IncomingRequest) -> Result<OutgoingResponse, DispatchError> {
		Err(DispatchError::ServantFailure(request.current.operation.clone()))
	}
}

#[derive(Default)]
struct RecordingLocator {
	locate_result: PlMutex<Option<Result<Option<Arc<dyn Servant>>, DispatchError>>>,
	locate_calls: AtomicUsize,
	finished_calls: AtomicUsize,
	finished_error: PlMutex<Option<DispatchError>>,
	deactivated: PlMutex<Vec<String>>,
	deactivate_error: PlMutex<Option<DispatchError>>,
}

impl RecordingLocator {
	fn yielding(servant: Arc<dyn Servant>) -> Self {
		let locator = Self::default();
		*locator.locate_result.lock() = Some(Ok(Some(servant)));
		locator
	}

	fn declining() -> Self {
		let locator = Self::default();
		*locator.locate_result.lock() = Some(Ok(None));
		locator
	}

	fn failing(err: DispatchError) -> Self {
		let locator = Self::default();
		*locator.locate_result.lock() = Some(Err(err));
		locator
	}
}

impl ServantLocator for RecordingLocator {
	fn locate(&self, _current: &Current) -> Result<Option<(Arc<dyn Servant>, Cookie)>, DispatchError> {
		self.locate_calls.fetch_add(1, Ordering::SeqCst);
		match self.locate_result.lock().clone() {
			Some(Ok(Some(servant))) => Ok(Some((servant, Some(Box::new(42_u32))))),
			Some(Ok(None)) | None => Ok(None),
			Some(Err(err)) => Err(err),
		}
	}

	fn finished(&self, _current: &Current, _servant: &Arc<dyn Servant>, cookie: Cookie) -> Result<(), DispatchError> {
		self.finished_calls.fetch_add(1, Ordering::SeqCst);
		let cookie = cookie.expect("cookie lost between locate and finished");
		assert_eq!(*cookie.downcast::<u32>().expect("cookie type changed"), 42);
		match self.finished_error.lock().take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	fn deactivate(&self, category: &str) -> Result<(), DispatchError> {
		self.deactivated.lock().push(category.to_owned());
		match self.deactivate_error.lock().take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

fn echo(reply: &'static str) -> Arc<dyn Servant> {
	Arc::new(EchoServant { reply })
}

fn request_for(identity: Identity, facet: &str) -> IncomingRequest {
	IncomingRequest::with_payload(
		Current::new(identity, "op").with_facet(facet),
		Bytes::from_static(b"args"),
	)
}

#[test]
fn test_add_find_remove_servant() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::new("counter", "stats");
	let servant = echo("pong");

	registry.add_servant(servant.clone(), identity.clone(), "").expect("add failed");
	assert!(registry.find_servant(&identity, "").is_some());
	assert!(registry.has_servant(&identity));

	registry.remove_servant(&identity, "").expect("remove failed");
	assert!(registry.find_servant(&identity, "").is_none());
	assert!(!registry.has_servant(&identity));
}

#[test]
fn test_duplicate_registration_fails_and_keeps_first() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::named("obj");
	registry.add_servant(echo("first"), identity.clone(), "").expect("add failed");

	let err = registry.add_servant(echo("second"), identity.clone(), "").expect_err("duplicate accepted");
	assert_eq!(
		err,
		RegistryError::AlreadyRegistered {
			kind: RegisteredKind::Servant,
			id: "obj".to_owned(),
		}
	);
	assert!(registry.find_servant(&identity, "").is_some());
}

#[test]
fn test_facet_key_includes_facet_in_error() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::new("obj", "cat");
	registry.add_servant(echo("a"), identity.clone(), "admin").expect("add failed");
	let err = registry.add_servant(echo("b"), identity, "admin").expect_err("duplicate accepted");
	assert_eq!(
		err,
		RegistryError::AlreadyRegistered {
			kind: RegisteredKind::Servant,
			id: "cat/obj -f admin".to_owned(),
		}
	);
}

#[test]
fn test_remove_missing_servant_fails() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::named("ghost");
	let err = registry.remove_servant(&identity, "").err().expect("remove succeeded");
	assert!(matches!(err, RegistryError::NotRegistered { kind: RegisteredKind::Servant, .. }));
	assert!(matches!(
		registry.remove_all_facets(&identity),
		Err(RegistryError::NotRegistered { .. })
	));
}

#[test]
fn test_removing_last_facet_drops_identity_entry() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::named("obj");
	registry.add_servant(echo("a"), identity.clone(), "").expect("add failed");
	registry.add_servant(echo("b"), identity.clone(), "admin").expect("add failed");

	registry.remove_servant(&identity, "").expect("remove failed");
	assert!(registry.has_servant(&identity));
	registry.remove_servant(&identity, "admin").expect("remove failed");
	assert!(!registry.has_servant(&identity));
	assert!(registry.find_all_facets(&identity).is_empty());
}

#[test]
fn test_find_all_facets_returns_defensive_copy() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::named("obj");
	registry.add_servant(echo("a"), identity.clone(), "").expect("add failed");

	let mut copy = registry.find_all_facets(&identity);
	copy.clear();
	assert_eq!(registry.find_all_facets(&identity).len(), 1);
}

#[test]
fn test_default_servant_fallback_order() {
	let registry = ServantRegistry::new("adapter");
	registry.add_default_servant(echo("category"), "stats").expect("add failed");
	registry.add_default_servant(echo("catchall"), "").expect("add failed");

	// No direct entry: category default wins, then the "" fallback.
	assert!(registry.find_servant(&Identity::new("x", "stats"), "").is_some());
	assert!(registry.find_servant(&Identity::new("x", "other"), "").is_some());

	// A direct entry for the identity disables the default fallback.
	let identity = Identity::new("direct", "stats");
	registry.add_servant(echo("direct"), identity.clone(), "admin").expect("add failed");
	assert!(registry.find_servant(&identity, "").is_none());
}

#[test]
fn test_default_servant_duplicate_and_removal() {
	let registry = ServantRegistry::new("adapter");
	registry.add_default_servant(echo("a"), "cat").expect("add failed");
	assert!(matches!(
		registry.add_default_servant(echo("b"), "cat"),
		Err(RegistryError::AlreadyRegistered {
			kind: RegisteredKind::DefaultServant,
			..
		})
	));
	registry.remove_default_servant("cat").expect("remove failed");
	assert!(registry.find_default_servant("cat").is_none());
	assert!(matches!(
		registry.remove_default_servant("cat"),
		Err(RegistryError::NotRegistered { .. })
	));
}

#[tokio::test]
async fn test_dispatch_direct_servant() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::named("obj");
	registry.add_servant(echo("pong"), identity.clone(), "").expect("add failed");

	let response = registry.dispatch(request_for(identity, "")).await.expect("dispatch failed");
	assert_eq!(response.payload, Bytes::from_static(b"pong"));
}

#[tokio::test]
async fn test_dispatch_unknown_identity_is_object_not_exist() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::named("ghost");
	let err = registry.dispatch(request_for(identity.clone(), "")).await.expect_err("dispatch succeeded");
	assert_eq!(
		err,
		DispatchError::ObjectNotExist {
			identity,
			facet: String::new(),
		}
	);
}

#[tokio::test]
async fn test_dispatch_known_identity_unknown_facet_is_facet_not_exist() {
	let registry = ServantRegistry::new("adapter");
	let identity = Identity::named("obj");
	registry.add_servant(echo("a"), identity.clone(), "").expect("add failed");

	let err = registry
		.dispatch(request_for(identity.clone(), "missing"))
		.await
		.expect_err("dispatch succeeded");
	assert_eq!(
		err,
		DispatchError::FacetNotExist {
			identity,
			facet: "missing".to_owned(),
		}
	);
}

#[tokio::test]
async fn test_locator_finished_called_once_on_success() {
	let registry = ServantRegistry::new("adapter");
	let locator = Arc::new(RecordingLocator::yielding(echo("located")));
	registry.add_servant_locator(locator.clone(), "cat").expect("add failed");

	let response = registry
		.dispatch(request_for(Identity::new("obj", "cat"), ""))
		.await
		.expect("dispatch failed");
	assert_eq!(response.payload, Bytes::from_static(b"located"));
	assert_eq!(locator.locate_calls.load(Ordering::SeqCst), 1);
	assert_eq!(locator.finished_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_locator_finished_called_once_on_dispatch_failure() {
	let registry = ServantRegistry::new("adapter");
	let locator = Arc::new(RecordingLocator::yielding(Arc::new(FailingServant)));
	registry.add_servant_locator(locator.clone(), "cat").expect("add failed");

	let err = registry
		.dispatch(request_for(Identity::new("obj", "cat"), ""))
		.await
		.expect_err("dispatch succeeded");
	assert_eq!(err, DispatchError::ServantFailure("op".to_owned()));
	assert_eq!(locator.finished_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_finished_error_becomes_outcome_of_successful_dispatch() {
	let registry = ServantRegistry::new("adapter");
	let locator = Arc::new(RecordingLocator::yielding(echo("located")));
	*locator.finished_error.lock() = Some(DispatchError::LocatorFailure("cleanup".to_owned()));
	registry.add_servant_locator(locator.clone(), "cat").expect("add failed");

	let err = registry
		.dispatch(request_for(Identity::new("obj", "cat"), ""))
		.await
		.expect_err("dispatch succeeded");
	assert_eq!(err, DispatchError::LocatorFailure("cleanup".to_owned()));
	assert_eq!(locator.finished_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispatch_error_wins_over_finished_error() {
	let registry = ServantRegistry::new("adapter");
	let locator = Arc::new(RecordingLocator::yielding(Arc::new(FailingServant)));
	*locator.finished_error.lock() = Some(DispatchError::LocatorFailure("cleanup".to_owned()));
	registry.add_servant_locator(locator.clone(), "cat").expect("add failed");

	let err = registry
		.dispatch(request_for(Identity::new("obj", "cat"), ""))
		.await
		.expect_err("dispatch succeeded");
	assert_eq!(err, DispatchError::ServantFailure("op".to_owned()));
	assert_eq!(locator.finished_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_locator_error_propagates() {
	let registry = ServantRegistry::new("adapter");
	let locator = Arc::new(RecordingLocator::failing(DispatchError::LocatorFailure("boom".to_owned())));
	registry.add_servant_locator(locator.clone(), "cat").expect("add failed");

	let err = registry
		.dispatch(request_for(Identity::new("obj", "cat"), ""))
		.await
		.expect_err("dispatch succeeded");
	assert_eq!(err, DispatchError::LocatorFailure("boom".to_owned()));
	assert_eq!(locator.finished_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_locator_declining_falls_through_to_not_exist() {
	let registry = ServantRegistry::new("adapter");
	let locator = Arc::new(RecordingLocator::declining());
	registry.add_servant_locator(locator.clone(), "cat").expect("add failed");

	let err = registry
		.dispatch(request_for(Identity::new("obj", "cat"), ""))
		.await
		.expect_err("dispatch succeeded");
	assert!(matches!(err, DispatchError::ObjectNotExist { .. }));
	assert_eq!(locator.finished_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_category_locator_is_fallback() {
	let registry = ServantRegistry::new("adapter");
	let fallback = Arc::new(RecordingLocator::yielding(echo("fallback")));
	registry.add_servant_locator(fallback.clone(), "").expect("add failed");

	let response = registry
		.dispatch(request_for(Identity::new("obj", "anything"), ""))
		.await
		.expect("dispatch failed");
	assert_eq!(response.payload, Bytes::from_static(b"fallback"));
	assert_eq!(fallback.locate_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_locator_duplicate_and_removal() {
	let registry = ServantRegistry::new("adapter");
	let locator = Arc::new(RecordingLocator::declining());
	registry.add_servant_locator(locator.clone(), "cat").expect("add failed");
	assert!(matches!(
		registry.add_servant_locator(locator.clone(), "cat"),
		Err(RegistryError::AlreadyRegistered {
			kind: RegisteredKind::ServantLocator,
			..
		})
	));
	registry.remove_servant_locator("cat").expect("remove failed");
	assert!(registry.find_servant_locator("cat").is_none());
	assert!(matches!(
		registry.remove_servant_locator("cat"),
		Err(RegistryError::NotRegistered { .. })
	));
}

#[test]
fn test_destroy_deactivates_every_locator_despite_failures() {
	let registry = ServantRegistry::new("adapter");
	let failing = Arc::new(RecordingLocator::declining());
	*failing.deactivate_error.lock() = Some(DispatchError::LocatorFailure("deactivate".to_owned()));
	let healthy = Arc::new(RecordingLocator::declining());

	registry.add_servant_locator(failing.clone(), "a").expect("add failed");
	registry.add_servant_locator(healthy.clone(), "b").expect("add failed");
	registry.add_servant(echo("x"), Identity::named("obj"), "").expect("add failed");

	registry.destroy();

	assert_eq!(failing.deactivated.lock().as_slice(), &["a".to_owned()]);
	assert_eq!(healthy.deactivated.lock().as_slice(), &["b".to_owned()]);
	assert!(!registry.has_servant(&Identity::named("obj")));

	// Idempotent: a second destroy does not deactivate again.
	registry.destroy();
	assert_eq!(failing.deactivated.lock().len(), 1);
	assert_eq!(healthy.deactivated.lock().len(), 1);
}
