//! Addressing primitives: identities, protocol generations, endpoints, proxies.

use std::fmt;

/// Name of a remote-addressable object: a `(name, category)` pair.
///
/// The `name` must be non-empty for the object to be resolvable; the
/// `category` groups identities for default servants and servant locators.
/// Equality and ordering are value-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
	/// Object name, non-empty for resolvable objects.
	pub name: String,
	/// Grouping category, may be empty.
	pub category: String,
}

impl Identity {
	/// Creates an identity from a name and category.
	pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			category: category.into(),
		}
	}

	/// Creates an identity with an empty category.
	pub fn named(name: impl Into<String>) -> Self {
		Self::new(name, "")
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.category.is_empty() {
			write!(f, "{}", self.name)
		} else {
			write!(f, "{}/{}", self.category, self.name)
		}
	}
}

/// Wire-protocol generation tag.
///
/// The two generations encode endpoints differently and must never be
/// conflated: the location registry keeps fully separate adapter and
/// replica-group mappings per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
	/// Legacy generation; adapters are registered as reachable proxies.
	V1,
	/// Current generation; adapters are registered as raw endpoint lists.
	V2,
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::V1 => f.write_str("v1"),
			Self::V2 => f.write_str("v2"),
		}
	}
}

/// Opaque physical endpoint.
///
/// Transport selection and endpoint syntax belong to the transport layer;
/// this core only stores, compares, and unions endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
	/// Creates an endpoint from its opaque string form.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the opaque string form.
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Minimal proxy representation for the legacy protocol generation.
///
/// A proxy is either direct (carries endpoints) or indirect (carries an
/// adapter or replica-group id as its location). Proxy string parsing and
/// the full proxy surface live in the proxy layer, outside this core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
	/// Identity the proxy addresses.
	pub identity: Identity,
	/// Adapter or replica-group id for indirect proxies.
	pub location: Option<String>,
	/// Physical endpoints for direct proxies.
	pub endpoints: Vec<Endpoint>,
}

impl Proxy {
	/// Creates a direct proxy from an identity and endpoints.
	pub fn direct(identity: Identity, endpoints: Vec<Endpoint>) -> Self {
		Self {
			identity,
			location: None,
			endpoints,
		}
	}

	/// Creates an indirect proxy scoped to an adapter or replica-group id.
	pub fn indirect(identity: Identity, location: impl Into<String>) -> Self {
		Self {
			identity,
			location: Some(location.into()),
			endpoints: Vec::new(),
		}
	}

	/// Returns a copy of this proxy with the endpoints replaced.
	#[must_use]
	pub fn with_endpoints(&self, endpoints: Vec<Endpoint>) -> Self {
		Self {
			identity: self.identity.clone(),
			location: None,
			endpoints,
		}
	}
}
