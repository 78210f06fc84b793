//! Pending-invocation bookkeeping shared by the request-handler
//! implementations.
//!
//! A [`PendingInvocation`] represents one in-flight outgoing call. Its
//! completion is a single-shot channel: exactly one of response, exception,
//! or cancellation is ever delivered to the caller, enforced by the type
//! rather than by convention.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::DispatchError;
use crate::request::{IncomingRequest, OutgoingResponse};


/// Delivery expectation of an outgoing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
	/// Expects a correlated response; gets a non-zero request id.
	TwoWay,
	/// No response expected; completes when sent.
	OneWay,
	/// Several one-way requests packed into one send; completes when sent.
	BatchOneWay,
}

/// Status returned by `invoke`: completion is always delivered
/// asynchronously through the invocation, never via the return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
	/// The invocation was accepted and queued.
	Queued,
}

/// Cancellation target an invocation registers against.
///
/// Implemented by the collocated request handler; the connection-based
/// handler honors the same contract.
pub trait RequestHandler: Send + Sync {
	/// Delivers a cancellation for a not-yet-completed invocation.
	fn async_request_canceled(&self, invocation: &PendingInvocation, reason: DispatchError);
}

/// Final outcome delivered to the caller.
pub type InvocationOutcome = Result<OutgoingResponse, DispatchError>;

struct InvocationState {
	handler: Option<Weak<dyn RequestHandler>>,
	canceled: Option<DispatchError>,
	sent: bool,
	completed: bool,
	tx: Option<oneshot::Sender<InvocationOutcome>>,
}

struct Shared {
	mode: InvocationMode,
	timeout: Option<Duration>,
	frames: Mutex<Vec<IncomingRequest>>,
	state: Mutex<InvocationState>,
}

/// One in-flight outgoing call.
///
/// Cheaply cloneable; all clones share the same completion channel. The
/// handler keys its tables by [`PendingInvocation::key`].
#[derive(Clone)]
pub struct PendingInvocation {
	inner: Arc<Shared>,
}

/// Caller-side receiving end of an invocation's completion.
pub struct CompletionReceiver {
	rx: oneshot::Receiver<InvocationOutcome>,
}

impl CompletionReceiver {
	/// Waits for the invocation's single completion.
	pub async fn recv(self) -> InvocationOutcome {
		self.rx
			.await
			.unwrap_or_else(|_| Err(DispatchError::InvocationCanceled("invocation dropped without completion".to_owned())))
	}
}

impl PendingInvocation {
	fn new(mode: InvocationMode, frames: Vec<IncomingRequest>) -> (Self, CompletionReceiver) {
		let (tx, rx) = oneshot::channel();
		let invocation = Self {
			inner: Arc::new(Shared {
				mode,
				timeout: None,
				frames: Mutex::new(frames),
				state: Mutex::new(InvocationState {
					handler: None,
					canceled: None,
					sent: false,
					completed: false,
					tx: Some(tx),
				}),
			}),
		};
		(invocation, CompletionReceiver { rx })
	}

	/// Creates a two-way invocation carrying one request.
	pub fn two_way(request: IncomingRequest) -> (Self, CompletionReceiver) {
		Self::new(InvocationMode::TwoWay, vec![request])
	}

	/// Creates a one-way invocation carrying one request.
	pub fn one_way(request: IncomingRequest) -> (Self, CompletionReceiver) {
		Self::new(InvocationMode::OneWay, vec![request])
	}

	/// Creates a batch invocation carrying several one-way requests that
	/// share one send.
	pub fn batch_one_way(requests: Vec<IncomingRequest>) -> (Self, CompletionReceiver) {
		Self::new(InvocationMode::BatchOneWay, requests)
	}

	/// Sets a non-default invocation timeout.
	///
	/// Enforcement belongs to the proxy layer (which cancels the invocation
	/// with [`DispatchError::InvocationTimedOut`]); handlers only consult
	/// the value when choosing a scheduling path.
	#[must_use]
	pub fn with_timeout(self, timeout: Duration) -> Self {
		// Shared state is not yet aliased at builder time.
		let mut inner = self.inner;
		if let Some(shared) = Arc::get_mut(&mut inner) {
			shared.timeout = Some(timeout);
		}
		Self { inner }
	}

	/// Delivery mode of this invocation.
	pub fn mode(&self) -> InvocationMode {
		self.inner.mode
	}

	/// True for two-way invocations.
	pub fn expects_response(&self) -> bool {
		self.inner.mode == InvocationMode::TwoWay
	}

	/// Configured invocation timeout, if any.
	pub fn invocation_timeout(&self) -> Option<Duration> {
		self.inner.timeout
	}

	/// Stable key for handler bookkeeping tables.
	pub fn key(&self) -> usize {
		Arc::as_ptr(&self.inner) as usize
	}

	/// Takes the serialized requests out of the send buffer.
	///
	/// Called once by the handler's dispatch phase.
	pub fn take_frames(&self) -> Vec<IncomingRequest> {
		std::mem::take(&mut *self.inner.frames.lock())
	}

	/// Registers the invocation as cancelable against a handler.
	///
	/// Fails with the cancellation reason if the invocation was already
	/// canceled, in which case it must never be sent.
	pub fn register_cancelable(&self, handler: Weak<dyn RequestHandler>) -> Result<(), DispatchError> {
		let mut state = self.inner.state.lock();
		if let Some(reason) = &state.canceled {
			return Err(reason.clone());
		}
		state.handler = Some(handler);
		Ok(())
	}

	/// Notifies the invocation that its request has been written.
	///
	/// One-way and batch invocations resolve at this point with an empty
	/// success. Returns true only when the invocation had already fully
	/// completed beforehand, meaning dispatch can be skipped.
	pub fn notify_sent(&self) -> bool {
		let (tx, was_completed) = {
			let mut state = self.inner.state.lock();
			if state.completed {
				return true;
			}
			state.sent = true;
			match self.inner.mode {
				InvocationMode::TwoWay => (None, false),
				InvocationMode::OneWay | InvocationMode::BatchOneWay => {
					state.completed = true;
					(state.tx.take(), false)
				}
			}
		};
		if let Some(tx) = tx {
			let _ = tx.send(Ok(OutgoingResponse::empty()));
		}
		was_completed
	}

	/// Delivers the response. Returns false if the invocation no longer
	/// accepts it (already completed or canceled).
	pub fn complete_response(&self, response: OutgoingResponse) -> bool {
		self.complete(Ok(response))
	}

	/// Delivers the exception. Returns false if the invocation no longer
	/// accepts it.
	pub fn complete_exception(&self, error: DispatchError) -> bool {
		self.complete(Err(error))
	}

	fn complete(&self, outcome: InvocationOutcome) -> bool {
		let tx = {
			let mut state = self.inner.state.lock();
			if state.completed {
				return false;
			}
			state.completed = true;
			state.tx.take()
		};
		match tx {
			Some(tx) => {
				let _ = tx.send(outcome);
				true
			}
			None => false,
		}
	}

	/// Requests cancellation.
	///
	/// If the invocation is registered with a handler, the handler decides
	/// what the cancellation means for its tables; otherwise the reason is
	/// recorded and the next `register_cancelable` fails with it.
	pub fn cancel(&self, reason: DispatchError) {
		let handler = {
			let mut state = self.inner.state.lock();
			if state.completed {
				return;
			}
			if state.canceled.is_none() {
				state.canceled = Some(reason.clone());
			}
			state.handler.clone()
		};
		if let Some(handler) = handler.and_then(|weak| weak.upgrade()) {
			handler.async_request_canceled(self, reason);
		}
	}

	/// True once the request has been written.
	pub fn is_sent(&self) -> bool {
		self.inner.state.lock().sent
	}

	/// True once the single completion has been delivered.
	pub fn is_completed(&self) -> bool {
		self.inner.state.lock().completed
	}
}

impl std::fmt::Debug for PendingInvocation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("PendingInvocation")
			.field("mode", &self.inner.mode)
			.field("sent", &state.sent)
			.field("completed", &state.completed)
			.finish_non_exhaustive()
	}
}
