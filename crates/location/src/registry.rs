//! The dual-protocol location registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::{Endpoint, Identity, Protocol, Proxy, RegistryError};

use crate::pinger::Pinger;


struct RegistryState {
	/// Legacy generation: caller-supplied reachable proxies.
	v1_adapters: HashMap<String, Proxy>,
	/// Current generation: raw endpoint lists.
	v2_adapters: HashMap<String, Vec<Endpoint>>,
	replica_groups: HashMap<(String, Protocol), HashSet<String>>,
}

impl RegistryState {
	fn endpoints_of(&self, adapter_id: &str, protocol: Protocol) -> Option<Vec<Endpoint>> {
		match protocol {
			Protocol::V1 => self.v1_adapters.get(adapter_id).map(|proxy| proxy.endpoints.clone()),
			Protocol::V2 => self.v2_adapters.get(adapter_id).cloned(),
		}
	}

	fn link_group(&mut self, adapter_id: &str, replica_group_id: &str, protocol: Protocol) {
		if !replica_group_id.is_empty() {
			self.replica_groups
				.entry((replica_group_id.to_owned(), protocol))
				.or_default()
				.insert(adapter_id.to_owned());
		}
	}

	fn unlink_group(&mut self, adapter_id: &str, replica_group_id: &str, protocol: Protocol) {
		if replica_group_id.is_empty() {
			return;
		}
		let key = (replica_group_id.to_owned(), protocol);
		if let Some(members) = self.replica_groups.get_mut(&key) {
			members.remove(adapter_id);
			if members.is_empty() {
				self.replica_groups.remove(&key);
			}
		}
	}
}

/// Registry of logical-name to physical-endpoint mappings for two
/// coexisting protocol generations.
///
/// The legacy generation registers caller-supplied reachable proxies; the
/// current generation registers raw endpoint lists. The two mappings never
/// mix. All registry state sits behind one lock. Well-known-object
/// resolution snapshots its candidate list under the lock and probes
/// outside it, so probe I/O never blocks concurrent registrations.
pub struct LocationRegistry {
	pinger: Arc<dyn Pinger>,
	state: Mutex<RegistryState>,
}

impl LocationRegistry {
	/// Creates an empty registry probing through the given pinger.
	pub fn new(pinger: Arc<dyn Pinger>) -> Self {
		Self {
			pinger,
			state: Mutex::new(RegistryState {
				v1_adapters: HashMap::new(),
				v2_adapters: HashMap::new(),
				replica_groups: HashMap::new(),
			}),
		}
	}

	fn check_adapter_id(adapter_id: &str) -> Result<(), RegistryError> {
		if adapter_id.is_empty() {
			return Err(RegistryError::InvalidArgument("adapter id cannot be empty".to_owned()));
		}
		Ok(())
	}

	/// Registers (or overwrites) an adapter's endpoint list under the
	/// current protocol generation.
	///
	/// A non-empty `replica_group_id` also adds the adapter to that group,
	/// creating the group record on first use.
	pub fn register_adapter_endpoints(
		&self,
		adapter_id: &str,
		replica_group_id: &str,
		endpoints: Vec<Endpoint>,
	) -> Result<(), RegistryError> {
		if endpoints.is_empty() {
			return Err(RegistryError::InvalidArgument("endpoints cannot be empty".to_owned()));
		}
		Self::check_adapter_id(adapter_id)?;

		let mut state = self.state.lock();
		state.v2_adapters.insert(adapter_id.to_owned(), endpoints);
		state.link_group(adapter_id, replica_group_id, Protocol::V2);
		tracing::trace!(adapter_id, replica_group_id, protocol = %Protocol::V2, "location.register");
		Ok(())
	}

	/// Removes an adapter's endpoint entry under the current protocol
	/// generation; also removes it from its replica group, deleting the
	/// group once its last member is gone.
	pub fn unregister_adapter_endpoints(&self, adapter_id: &str, replica_group_id: &str) -> Result<(), RegistryError> {
		Self::check_adapter_id(adapter_id)?;

		let mut state = self.state.lock();
		state.v2_adapters.remove(adapter_id);
		state.unlink_group(adapter_id, replica_group_id, Protocol::V2);
		tracing::trace!(adapter_id, replica_group_id, protocol = %Protocol::V2, "location.unregister");
		Ok(())
	}

	/// Legacy-protocol registration of an ungrouped adapter.
	pub fn set_adapter_direct_proxy(&self, adapter_id: &str, proxy: Option<Proxy>) -> Result<(), RegistryError> {
		self.set_replicated_adapter_direct_proxy(adapter_id, "", proxy)
	}

	/// Legacy-protocol registration: stores a caller-supplied reachable
	/// proxy for the adapter. Passing `None` unregisters the adapter.
	pub fn set_replicated_adapter_direct_proxy(
		&self,
		adapter_id: &str,
		replica_group_id: &str,
		proxy: Option<Proxy>,
	) -> Result<(), RegistryError> {
		Self::check_adapter_id(adapter_id)?;

		let mut state = self.state.lock();
		match proxy {
			Some(proxy) => {
				state.v1_adapters.insert(adapter_id.to_owned(), proxy);
				state.link_group(adapter_id, replica_group_id, Protocol::V1);
				tracing::trace!(adapter_id, replica_group_id, protocol = %Protocol::V1, "location.register");
			}
			None => {
				state.v1_adapters.remove(adapter_id);
				state.unlink_group(adapter_id, replica_group_id, Protocol::V1);
				tracing::trace!(adapter_id, replica_group_id, protocol = %Protocol::V1, "location.unregister");
			}
		}
		Ok(())
	}

	/// Resolves an adapter or replica-group id to endpoints under one
	/// protocol generation.
	///
	/// A direct adapter entry wins over a replica group of the same name.
	/// For a group, the union of all member endpoints is returned and the
	/// result is flagged as coming from a replica group; callers must not
	/// cache per-member addressing decisions from it. An unknown id yields
	/// an empty, unflagged result.
	pub fn resolve_adapter_id(&self, adapter_id: &str, protocol: Protocol) -> (Vec<Endpoint>, bool) {
		let state = self.state.lock();

		if let Some(endpoints) = state.endpoints_of(adapter_id, protocol) {
			return (endpoints, false);
		}

		if let Some(members) = state.replica_groups.get(&(adapter_id.to_owned(), protocol)) {
			let endpoints = members
				.iter()
				.filter_map(|id| state.endpoints_of(id, protocol))
				.flatten()
				.collect();
			return (endpoints, true);
		}

		(Vec::new(), false)
	}

	/// Legacy-protocol, proxy-typed equivalent of
	/// [`LocationRegistry::resolve_adapter_id`].
	///
	/// For a replica group, a proxy is synthesized whose endpoint set is
	/// the union of all member endpoints.
	pub fn find_adapter(&self, adapter_id: &str) -> (Option<Proxy>, bool) {
		let state = self.state.lock();

		if let Some(proxy) = state.v1_adapters.get(adapter_id) {
			return (Some(proxy.clone()), false);
		}

		if let Some(members) = state.replica_groups.get(&(adapter_id.to_owned(), Protocol::V1)) {
			let endpoints: Vec<Endpoint> = members
				.iter()
				.filter_map(|id| state.v1_adapters.get(id))
				.flat_map(|proxy| proxy.endpoints.iter().cloned())
				.collect();
			return (Some(Self::dummy_proxy(endpoints)), true);
		}

		(None, false)
	}

	fn dummy_proxy(endpoints: Vec<Endpoint>) -> Proxy {
		Proxy::direct(Identity::named("dummy"), endpoints)
	}

	fn well_known_candidates(&self, protocol: Protocol) -> Vec<String> {
		let state = self.state.lock();
		// Replica groups are probed before plain adapters so a
		// load-balanced member is preferred over a single fixed adapter.
		let mut candidates: Vec<String> = state
			.replica_groups
			.keys()
			.filter(|(_, p)| *p == protocol)
			.map(|(id, _)| id.clone())
			.collect();
		match protocol {
			Protocol::V1 => candidates.extend(state.v1_adapters.keys().cloned()),
			Protocol::V2 => candidates.extend(state.v2_adapters.keys().cloned()),
		}
		candidates
	}

	async fn probe_candidates(&self, identity: &Identity, protocol: Protocol) -> Option<Proxy> {
		if identity.name.is_empty() {
			return None;
		}

		for id in self.well_known_candidates(protocol) {
			// An indirect reference scoped to the replica-group or adapter
			// id; the probe resolves it like any other indirect proxy.
			let proxy = Proxy::indirect(identity.clone(), id);
			if self.pinger.ping(&proxy).await {
				tracing::trace!(%identity, location = proxy.location.as_deref().unwrap_or(""), %protocol, "location.well_known_hit");
				return Some(proxy);
			}
			// Probe failure is a normal outcome for a stale entry; try the
			// next candidate.
		}
		None
	}

	/// Resolves a well-known object to the replica-group or adapter id
	/// that answers a liveness probe for it, under the current protocol
	/// generation. Returns `None` when no candidate answers.
	pub async fn resolve_well_known_proxy(&self, identity: &Identity) -> Option<String> {
		self.probe_candidates(identity, Protocol::V2).await.and_then(|proxy| proxy.location)
	}

	/// Legacy-protocol well-known-object resolution: returns the resolved
	/// indirect proxy itself.
	pub async fn find_object(&self, identity: &Identity) -> Option<Proxy> {
		self.probe_candidates(identity, Protocol::V1).await
	}
}
