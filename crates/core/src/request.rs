//! Dispatch request and response types.

use std::collections::HashMap;

use bytes::Bytes;

use crate::identity::Identity;


/// Per-request dispatch context handed to servants and locators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Current {
	/// Target identity.
	pub identity: Identity,
	/// Target facet; `""` is the primary facet.
	pub facet: String,
	/// Operation name.
	pub operation: String,
	/// Caller-supplied request context.
	pub context: HashMap<String, String>,
}

impl Current {
	/// Creates a context for an operation on the primary facet.
	pub fn new(identity: Identity, operation: impl Into<String>) -> Self {
		Self {
			identity,
			facet: String::new(),
			operation: operation.into(),
			context: HashMap::new(),
		}
	}

	/// Returns a copy of this context targeting a different facet.
	#[must_use]
	pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
		self.facet = facet.into();
		self
	}
}

/// Marshaled request arguments, read as a cursor.
///
/// Decoding the arguments is the servant's business; this core only needs
/// to skip whatever the servant did not read, so that further batched
/// requests sharing the same input buffer remain parseable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
	data: Bytes,
	pos: usize,
}

impl Payload {
	/// Wraps a marshaled argument buffer.
	pub fn new(data: Bytes) -> Self {
		Self { data, pos: 0 }
	}

	/// Creates an empty payload.
	#[must_use]
	pub fn empty() -> Self {
		Self::new(Bytes::new())
	}

	/// Returns the unread portion of the buffer.
	#[must_use]
	pub fn remaining(&self) -> &[u8] {
		&self.data[self.pos..]
	}

	/// Consumes up to `n` bytes and returns them.
	pub fn read(&mut self, n: usize) -> Bytes {
		let end = (self.pos + n).min(self.data.len());
		let chunk = self.data.slice(self.pos..end);
		self.pos = end;
		chunk
	}

	/// Marks the rest of the buffer as consumed.
	pub fn skip_remaining(&mut self) {
		self.pos = self.data.len();
	}

	/// True once every byte has been consumed or skipped.
	#[must_use]
	pub const fn is_fully_consumed(&self) -> bool {
		self.pos == self.data.len()
	}
}

/// One logical incoming request: dispatch context plus unread arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
	/// Dispatch context.
	pub current: Current,
	/// Marshaled arguments.
	pub payload: Payload,
}

impl IncomingRequest {
	/// Creates a request with an empty payload.
	pub fn new(current: Current) -> Self {
		Self {
			current,
			payload: Payload::empty(),
		}
	}

	/// Creates a request carrying marshaled arguments.
	pub fn with_payload(current: Current, payload: Bytes) -> Self {
		Self {
			current,
			payload: Payload::new(payload),
		}
	}
}

/// Marshaled result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
	/// Marshaled result payload.
	pub payload: Bytes,
}

impl OutgoingResponse {
	/// Wraps a marshaled result buffer.
	pub fn new(payload: Bytes) -> Self {
		Self { payload }
	}

	/// Creates an empty (void) response.
	#[must_use]
	pub fn empty() -> Self {
		Self::new(Bytes::new())
	}
}
