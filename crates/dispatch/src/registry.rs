//! The servant registry and its dispatch algorithm.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::{
	Cookie, DispatchError, Identity, IncomingRequest, OutgoingResponse, RegisteredKind, RegistryError, Servant,
	ServantLocator,
};

#[cfg(test)]
mod tests;

struct RegistryState {
	servants: HashMap<Identity, HashMap<String, Arc<dyn Servant>>>,
	default_servants: HashMap<String, Arc<dyn Servant>>,
	locators: HashMap<String, Arc<dyn ServantLocator>>,
	destroyed: bool,
}

/// Authoritative mapping from `(identity, facet)` to dispatch target.
///
/// All three mappings (direct servants, per-category default servants,
/// per-category servant locators) live behind one lock. The lock is held
/// only to read or mutate the maps; it is always released before a servant
/// or locator is invoked.
pub struct ServantRegistry {
	adapter_name: String,
	state: Mutex<RegistryState>,
}

impl ServantRegistry {
	/// Creates an empty registry owned by the named adapter.
	pub fn new(adapter_name: impl Into<String>) -> Self {
		Self {
			adapter_name: adapter_name.into(),
			state: Mutex::new(RegistryState {
				servants: HashMap::new(),
				default_servants: HashMap::new(),
				locators: HashMap::new(),
				destroyed: false,
			}),
		}
	}

	fn servant_id(identity: &Identity, facet: &str) -> String {
		if facet.is_empty() {
			identity.to_string()
		} else {
			format!("{identity} -f {facet}")
		}
	}

	/// Registers a servant under `(identity, facet)`.
	pub fn add_servant(
		&self,
		servant: Arc<dyn Servant>,
		identity: Identity,
		facet: impl Into<String>,
	) -> Result<(), RegistryError> {
		let facet = facet.into();
		let mut state = self.state.lock();
		let facets = state.servants.entry(identity.clone()).or_default();
		if facets.contains_key(&facet) {
			return Err(RegistryError::AlreadyRegistered {
				kind: RegisteredKind::Servant,
				id: Self::servant_id(&identity, &facet),
			});
		}
		facets.insert(facet, servant);
		Ok(())
	}

	/// Registers a default servant for a category; category `""` is the
	/// fallback for every category.
	pub fn add_default_servant(&self, servant: Arc<dyn Servant>, category: impl Into<String>) -> Result<(), RegistryError> {
		let category = category.into();
		let mut state = self.state.lock();
		if state.default_servants.contains_key(&category) {
			return Err(RegistryError::AlreadyRegistered {
				kind: RegisteredKind::DefaultServant,
				id: category,
			});
		}
		state.default_servants.insert(category, servant);
		Ok(())
	}

	/// Registers a servant locator for a category; category `""` is the
	/// fallback locator.
	pub fn add_servant_locator(
		&self,
		locator: Arc<dyn ServantLocator>,
		category: impl Into<String>,
	) -> Result<(), RegistryError> {
		let category = category.into();
		let mut state = self.state.lock();
		if state.locators.contains_key(&category) {
			return Err(RegistryError::AlreadyRegistered {
				kind: RegisteredKind::ServantLocator,
				id: category,
			});
		}
		state.locators.insert(category, locator);
		Ok(())
	}

	/// Removes and returns the servant under `(identity, facet)`.
	///
	/// Removing the last facet removes the identity entry entirely.
	pub fn remove_servant(&self, identity: &Identity, facet: &str) -> Result<Arc<dyn Servant>, RegistryError> {
		let mut state = self.state.lock();
		let not_registered = || RegistryError::NotRegistered {
			kind: RegisteredKind::Servant,
			id: Self::servant_id(identity, facet),
		};
		let facets = state.servants.get_mut(identity).ok_or_else(not_registered)?;
		let servant = facets.remove(facet).ok_or_else(not_registered)?;
		if facets.is_empty() {
			state.servants.remove(identity);
		}
		Ok(servant)
	}

	/// Removes and returns every facet registered for an identity.
	pub fn remove_all_facets(&self, identity: &Identity) -> Result<HashMap<String, Arc<dyn Servant>>, RegistryError> {
		let mut state = self.state.lock();
		state.servants.remove(identity).ok_or_else(|| RegistryError::NotRegistered {
			kind: RegisteredKind::Servant,
			id: identity.to_string(),
		})
	}

	/// Removes and returns the default servant for a category.
	pub fn remove_default_servant(&self, category: &str) -> Result<Arc<dyn Servant>, RegistryError> {
		let mut state = self.state.lock();
		state.default_servants.remove(category).ok_or_else(|| RegistryError::NotRegistered {
			kind: RegisteredKind::DefaultServant,
			id: category.to_owned(),
		})
	}

	/// Removes and returns the servant locator for a category.
	pub fn remove_servant_locator(&self, category: &str) -> Result<Arc<dyn ServantLocator>, RegistryError> {
		let mut state = self.state.lock();
		state.locators.remove(category).ok_or_else(|| RegistryError::NotRegistered {
			kind: RegisteredKind::ServantLocator,
			id: category.to_owned(),
		})
	}

	/// Looks up the servant for `(identity, facet)`.
	///
	/// When the identity has no direct entry at all, falls back to the
	/// default servant for its category, then to the `""` default.
	pub fn find_servant(&self, identity: &Identity, facet: &str) -> Option<Arc<dyn Servant>> {
		let state = self.state.lock();
		match state.servants.get(identity) {
			Some(facets) => facets.get(facet).cloned(),
			None => state
				.default_servants
				.get(&identity.category)
				.or_else(|| state.default_servants.get(""))
				.cloned(),
		}
	}

	/// Looks up the default servant registered for a category.
	pub fn find_default_servant(&self, category: &str) -> Option<Arc<dyn Servant>> {
		self.state.lock().default_servants.get(category).cloned()
	}

	/// Looks up the servant locator registered for a category.
	pub fn find_servant_locator(&self, category: &str) -> Option<Arc<dyn ServantLocator>> {
		self.state.lock().locators.get(category).cloned()
	}

	/// Returns a copy of every facet registered for an identity.
	pub fn find_all_facets(&self, identity: &Identity) -> HashMap<String, Arc<dyn Servant>> {
		self.state.lock().servants.get(identity).cloned().unwrap_or_default()
	}

	/// True when the identity is registered under at least one facet.
	pub fn has_servant(&self, identity: &Identity) -> bool {
		self.state.lock().servants.get(identity).is_some_and(|facets| !facets.is_empty())
	}

	/// Routes one request to its dispatch target.
	///
	/// Resolution order: exact `(identity, facet)` servant (with default-
	/// servant fallback), then the category's servant locator, then the
	/// `""` locator. With no servant obtained, the unread payload is
	/// skipped so sibling batched requests stay parseable, and the failure
	/// distinguishes a known identity (`FacetNotExist`) from an unknown
	/// one (`ObjectNotExist`).
	pub async fn dispatch(&self, mut request: IncomingRequest) -> Result<OutgoingResponse, DispatchError> {
		let current = request.current.clone();

		if let Some(servant) = self.find_servant(&current.identity, &current.facet) {
			// the simple, common path
			return servant.dispatch(request).await;
		}

		let mut locator = self.find_servant_locator(&current.identity.category);
		if locator.is_none() && !current.identity.category.is_empty() {
			locator = self.find_servant_locator("");
		}

		if let Some(locator) = locator {
			let located = match locator.locate(&current) {
				Ok(located) => located,
				Err(err) => {
					request.payload.skip_remaining();
					return Err(err);
				}
			};

			if let Some((servant, cookie)) = located {
				return self.dispatch_located(request, &locator, servant, cookie).await;
			}
		}

		request.payload.skip_remaining();
		if self.has_servant(&current.identity) {
			Err(DispatchError::FacetNotExist {
				identity: current.identity,
				facet: current.facet,
			})
		} else {
			Err(DispatchError::ObjectNotExist {
				identity: current.identity,
				facet: current.facet,
			})
		}
	}

	/// Forwards to a locator-produced servant, calling `finished` exactly
	/// once regardless of the dispatch outcome.
	async fn dispatch_located(
		&self,
		request: IncomingRequest,
		locator: &Arc<dyn ServantLocator>,
		servant: Arc<dyn Servant>,
		cookie: Cookie,
	) -> Result<OutgoingResponse, DispatchError> {
		let current = request.current.clone();
		let outcome = servant.dispatch(request).await;
		let finished = locator.finished(&current, &servant, cookie);
		match (outcome, finished) {
			(outcome, Ok(())) => outcome,
			(Ok(_), Err(err)) => Err(err),
			(Err(err), Err(finished_err)) => {
				tracing::error!(
					adapter = %self.adapter_name,
					identity = %current.identity,
					error = %finished_err,
					"locator finished failed after failed dispatch"
				);
				Err(err)
			}
		}
	}

	/// Shuts the registry down: clears all mappings and deactivates every
	/// locator. Idempotent; locator deactivation failures are logged and
	/// do not abort deactivation of the remaining locators.
	pub fn destroy(&self) {
		let locators: Vec<(String, Arc<dyn ServantLocator>)> = {
			let mut state = self.state.lock();
			if state.destroyed {
				return;
			}
			state.destroyed = true;
			state.servants.clear();
			state.default_servants.clear();
			state.locators.drain().collect()
		};

		for (category, locator) in locators {
			if let Err(err) = locator.deactivate(&category) {
				tracing::error!(
					adapter = %self.adapter_name,
					category = %category,
					error = %err,
					"exception during locator deactivation"
				);
			}
		}
	}
}
