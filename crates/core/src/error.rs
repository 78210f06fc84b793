//! Error types shared by the registries and the invocation path.

use std::fmt;

use thiserror::Error;

use crate::identity::Identity;

/// Kind of entry a registry operation targeted.
///
/// Carried by [`RegistryError`] so conflict and absence reports name what
/// was (or was not) registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisteredKind {
	/// A directly registered servant.
	Servant,
	/// A per-category default servant.
	DefaultServant,
	/// A per-category servant locator.
	ServantLocator,
}

impl fmt::Display for RegisteredKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Servant => f.write_str("servant"),
			Self::DefaultServant => f.write_str("default servant"),
			Self::ServantLocator => f.write_str("servant locator"),
		}
	}
}

/// Errors surfaced synchronously by registration and removal operations.
///
/// These are ordinary result variants, never retried internally; a failed
/// registration leaves the registry unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
	/// The key is already bound; remove the existing entry first.
	#[error("{kind} `{id}` is already registered")]
	AlreadyRegistered {
		/// What kind of entry the key addresses.
		kind: RegisteredKind,
		/// Display form of the conflicting key.
		id: String,
	},

	/// The key is not bound.
	#[error("no {kind} is registered under `{id}`")]
	NotRegistered {
		/// What kind of entry the key addresses.
		kind: RegisteredKind,
		/// Display form of the missing key.
		id: String,
	},

	/// An empty identifier or empty endpoint list was supplied.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
}

/// Errors surfaced as the failure result of a dispatch or invocation.
///
/// Every two-way invocation resolves to exactly one of a response or one of
/// these; one-way invocations never surface dispatch-time servant errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
	/// The identity is not known under any facet and no locator produced a
	/// servant for it.
	#[error("object `{identity}` does not exist")]
	ObjectNotExist {
		/// The unresolvable identity.
		identity: Identity,
		/// The facet that was requested.
		facet: String,
	},

	/// The identity is known, but not under the requested facet.
	#[error("facet `{facet}` of object `{identity}` does not exist")]
	FacetNotExist {
		/// The identity that is known under at least one other facet.
		identity: Identity,
		/// The facet that was requested.
		facet: String,
	},

	/// The object adapter has begun deactivating; no new dispatches are
	/// accepted.
	#[error("object adapter `{0}` is deactivated")]
	AdapterDeactivated(String),

	/// The invocation was canceled before it completed.
	#[error("invocation canceled: {0}")]
	InvocationCanceled(String),

	/// The invocation's timeout elapsed before completion.
	#[error("invocation timed out")]
	InvocationTimedOut,

	/// The servant's dispatch failed.
	#[error("servant failure: {0}")]
	ServantFailure(String),

	/// A servant locator's `locate` or `finished` failed.
	#[error("servant locator failure: {0}")]
	LocatorFailure(String),
}

impl DispatchError {
	/// True for the two dispatch-time not-found variants.
	#[must_use]
	pub const fn is_not_exist(&self) -> bool {
		matches!(self, Self::ObjectNotExist { .. } | Self::FacetNotExist { .. })
	}
}
