//! The collocated request handler.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tether_core::{
	AsyncStatus, DispatchError, ObjectAdapter, OutgoingResponse, PendingInvocation, RequestHandler,
};
use tether_dispatch::ServantRegistry;


struct HandlerState {
	next_request_id: i64,
	/// Invocations accepted but not yet picked up by the send phase,
	/// keyed by invocation, recording the assigned request id.
	send_requests: HashMap<usize, i64>,
	/// Two-way invocations awaiting their response, keyed by request id.
	async_requests: HashMap<i64, PendingInvocation>,
}

/// Executes outgoing invocations against servants living in the same
/// process.
///
/// Request ids are allocated under the handler's lock and are unique per
/// handler; one-way and batch invocations use request id 0 and never enter
/// the request-id table. The handler holds the adapter's direct count from
/// acceptance until every sub-request's response or exception has been
/// delivered, so the adapter cannot finish deactivating mid-dispatch.
pub struct CollocatedHandler {
	adapter: Arc<dyn ObjectAdapter>,
	registry: Arc<ServantRegistry>,
	has_executor: bool,
	state: Mutex<HandlerState>,
}

impl CollocatedHandler {
	/// Creates a handler dispatching through the given registry on behalf
	/// of the given adapter. `has_executor` reports whether the hosting
	/// runtime configured a custom executor, which changes only where the
	/// synchronous one-way optimization runs.
	pub fn new(adapter: Arc<dyn ObjectAdapter>, registry: Arc<ServantRegistry>, has_executor: bool) -> Arc<Self> {
		Arc::new(Self {
			adapter,
			registry,
			has_executor,
			state: Mutex::new(HandlerState {
				next_request_id: 0,
				send_requests: HashMap::new(),
				async_requests: HashMap::new(),
			}),
		})
	}

	fn as_request_handler(self: &Arc<Self>) -> Weak<dyn RequestHandler> {
		let strong: Arc<dyn RequestHandler> = Arc::clone(self) as Arc<dyn RequestHandler>;
		Arc::downgrade(&strong)
	}

	/// Accepts an outgoing invocation for in-process execution.
	///
	/// Fails synchronously with [`DispatchError::AdapterDeactivated`] when
	/// the adapter has begun deactivating, or with the cancellation reason
	/// when the invocation was canceled before acceptance; in both cases
	/// the invocation is never sent. Otherwise the invocation is queued
	/// and completes asynchronously through its completion channel.
	///
	/// `batch_count` is the number of logical requests packed into a batch
	/// send, 0 for non-batch invocations. `synchronous` reports whether
	/// the caller is blocked on this invocation, which enables the inline
	/// execution optimization for plain one-way calls.
	pub async fn invoke(
		self: &Arc<Self>,
		invocation: PendingInvocation,
		batch_count: usize,
		synchronous: bool,
	) -> Result<AsyncStatus, DispatchError> {
		// Keeps the adapter alive from acceptance until dispatch_all has
		// started every sub-request; fails once deactivation has begun.
		self.adapter.acquire_direct_count()?;

		let request_id = {
			let mut state = self.state.lock();
			if let Err(reason) = invocation.register_cancelable(self.as_request_handler()) {
				drop(state);
				self.adapter.release_direct_count();
				return Err(reason);
			}
			let request_id = if invocation.expects_response() {
				state.next_request_id += 1;
				let request_id = state.next_request_id;
				state.async_requests.insert(request_id, invocation.clone());
				request_id
			} else {
				0
			};
			state.send_requests.insert(invocation.key(), request_id);
			request_id
		};

		tracing::trace!(request_id, batch_count, synchronous, "collocated.invoke");

		let task = {
			let handler = Arc::clone(self);
			let invocation = invocation.clone();
			async move {
				if handler.sent_async(&invocation) {
					handler.dispatch_all(&invocation, request_id, batch_count).await;
				}
			}
		};

		if !synchronous || invocation.expects_response() || invocation.invocation_timeout().is_some() {
			// Never run on the caller's thread when it is not prepared to
			// host the dispatch.
			self.adapter.thread_pool().execute(Box::pin(task));
		} else if self.has_executor {
			self.adapter.thread_pool().execute_from_this_thread(Box::pin(task));
		} else {
			// Optimization: no executor, synchronous one-way with default
			// timeout. Same behavior as the scheduled path, only the
			// execution context differs.
			task.await;
		}
		Ok(AsyncStatus::Queued)
	}

	/// Send phase: moves the invocation out of the send-table and marks it
	/// sent. Returns false when dispatch must not run, either because a
	/// cancellation raced ahead of the scheduled send or because the
	/// invocation had already completed.
	fn sent_async(&self, invocation: &PendingInvocation) -> bool {
		if self.state.lock().send_requests.remove(&invocation.key()).is_none() {
			// Canceled (or timed out) before the send ran; the
			// cancellation released the acceptance reference.
			return false;
		}
		if invocation.notify_sent() {
			// Already completed; dispatch_all will not run, so the
			// acceptance reference is released here.
			self.adapter.release_direct_count();
			return false;
		}
		true
	}

	/// Dispatch phase: reads the logical requests out of the invocation's
	/// send buffer and routes each through the servant registry.
	///
	/// Each sub-request takes its own direct-count reference, released
	/// when its response or exception is delivered. If the adapter
	/// deactivates mid-batch, the failing sub-request gets an exception
	/// reply and the remaining queued sub-requests are abandoned.
	async fn dispatch_all(&self, invocation: &PendingInvocation, request_id: i64, batch_count: usize) {
		let frames = invocation.take_frames();
		let dispatch_count = if batch_count > 0 { batch_count } else { 1 };
		debug_assert!(request_id == 0 || dispatch_count == 1, "two-way invocations carry exactly one request");

		for request in frames.into_iter().take(dispatch_count) {
			if let Err(err) = self.adapter.acquire_direct_count() {
				self.handle_exception(err, request_id);
				break;
			}
			tracing::trace!(request_id, identity = %request.current.identity, operation = %request.current.operation, "collocated.dispatch");
			match self.registry.dispatch(request).await {
				Ok(response) => self.send_response(response, request_id),
				Err(err) => self.dispatch_exception(err, request_id),
			}
		}

		// Acceptance reference: every sub-request now holds its own.
		self.adapter.release_direct_count();
	}

	/// Response phase: correlates a response back to the pending two-way
	/// invocation. Delivery to an invocation that no longer accepts it
	/// (canceled in flight) is a no-op. Always releases the sub-request's
	/// direct-count reference exactly once.
	fn send_response(&self, response: OutgoingResponse, request_id: i64) {
		if request_id > 0 {
			let invocation = self.state.lock().async_requests.remove(&request_id);
			if let Some(invocation) = invocation {
				invocation.complete_response(response);
			}
		}
		self.adapter.release_direct_count();
	}

	/// Exception phase: like the response phase, but for one-way calls the
	/// exception is dropped since no reply is expected.
	fn handle_exception(&self, error: DispatchError, request_id: i64) {
		if request_id == 0 {
			return;
		}
		let invocation = self.state.lock().async_requests.remove(&request_id);
		if let Some(invocation) = invocation {
			invocation.complete_exception(error);
		}
	}

	fn dispatch_exception(&self, error: DispatchError, request_id: i64) {
		self.handle_exception(error, request_id);
		self.adapter.release_direct_count();
	}
}

impl RequestHandler for CollocatedHandler {
	fn async_request_canceled(&self, invocation: &PendingInvocation, reason: DispatchError) {
		let mut state = self.state.lock();
		if let Some(request_id) = state.send_requests.remove(&invocation.key()) {
			if request_id > 0 {
				state.async_requests.remove(&request_id);
			}
			drop(state);
			tracing::trace!(request_id, "collocated.canceled_before_send");
			invocation.complete_exception(reason);
			// dispatch_all will never run for this invocation; release the
			// acceptance reference it would have released.
			self.adapter.release_direct_count();
			return;
		}

		// Already picked up by the send phase. If the response is still
		// pending, settle the invocation with the cancellation; the
		// in-flight dispatch releases its own reference when it completes.
		let pending = state
			.async_requests
			.iter()
			.find(|(_, candidate)| candidate.key() == invocation.key())
			.map(|(request_id, _)| *request_id);
		if let Some(request_id) = pending {
			state.async_requests.remove(&request_id);
			drop(state);
			tracing::trace!(request_id, "collocated.canceled_in_flight");
			invocation.complete_exception(reason);
		}
	}
}
