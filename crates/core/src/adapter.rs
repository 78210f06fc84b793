//! Host object-adapter collaborator surface.
//!
//! The dispatch core never owns an object adapter; it consumes the narrow
//! surface defined here: a shutdown-safety reference count and a thread
//! pool for scheduling dispatches off the caller's thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

use crate::error::DispatchError;


const DEACTIVATED: u64 = 1 << 63;
const COUNT_MASK: u64 = DEACTIVATED - 1;

/// Shutdown-safety reference count for an object adapter.
///
/// Held for the span of every outstanding collocated dispatch so the
/// adapter cannot finish deactivating mid-dispatch. The increment is
/// atomic with the deactivation check: once [`DirectCount::deactivate`]
/// has run, every further [`DirectCount::try_acquire`] fails.
#[derive(Debug, Default)]
pub struct DirectCount {
	state: AtomicU64,
	idle: Notify,
}

impl DirectCount {
	/// Creates an active count at zero.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Atomically increments the count unless deactivation has begun.
	///
	/// Returns false once [`DirectCount::deactivate`] has been called.
	pub fn try_acquire(&self) -> bool {
		self.state
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
				if state & DEACTIVATED == 0 { Some(state + 1) } else { None }
			})
			.is_ok()
	}

	/// Releases one reference.
	///
	/// # Panics
	///
	/// Panics if the count is already zero; acquisitions and releases must
	/// be balanced.
	pub fn release(&self) {
		let previous = self.state.fetch_sub(1, Ordering::AcqRel);
		assert!(previous & COUNT_MASK > 0, "direct count released below zero");
		if previous & COUNT_MASK == 1 {
			self.idle.notify_waiters();
		}
	}

	/// Marks the adapter as deactivating; all further acquisitions fail.
	pub fn deactivate(&self) {
		self.state.fetch_or(DEACTIVATED, Ordering::AcqRel);
		self.idle.notify_waiters();
	}

	/// True once [`DirectCount::deactivate`] has been called.
	pub fn is_deactivated(&self) -> bool {
		self.state.load(Ordering::Acquire) & DEACTIVATED != 0
	}

	/// Current number of outstanding references.
	pub fn outstanding(&self) -> u64 {
		self.state.load(Ordering::Acquire) & COUNT_MASK
	}

	/// Waits until every outstanding reference has been released.
	pub async fn wait_idle(&self) {
		loop {
			let notified = self.idle.notified();
			if self.state.load(Ordering::Acquire) & COUNT_MASK == 0 {
				return;
			}
			notified.await;
		}
	}
}

/// Boxed unit of work handed to a [`ThreadPool`].
pub type PoolTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Scheduling surface of the shared dispatch thread pool.
pub trait ThreadPool: Send + Sync {
	/// Schedules the task on a pool thread.
	fn execute(&self, task: PoolTask);

	/// Runs the task via the configured executor, staying on the calling
	/// thread where the executor allows it.
	fn execute_from_this_thread(&self, task: PoolTask);
}

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("tether-pool")
			.build()
			.expect("failed to build tether global tokio runtime")
	});
	runtime.handle().clone()
}

/// Tokio-backed [`ThreadPool`] used by tests and embedders without a
/// custom executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioThreadPool;

impl ThreadPool for TokioThreadPool {
	fn execute(&self, task: PoolTask) {
		tracing::trace!("pool.execute");
		runtime_handle().spawn(task);
	}

	fn execute_from_this_thread(&self, task: PoolTask) {
		// No custom executor is configured for this pool; scheduling is the
		// closest tokio equivalent and preserves the non-blocking contract.
		tracing::trace!("pool.execute_from_this_thread");
		runtime_handle().spawn(task);
	}
}

/// Narrow surface of the object adapter that owns the dispatch pipeline.
pub trait ObjectAdapter: Send + Sync {
	/// Adapter name, used in deactivation errors and logs.
	fn name(&self) -> &str;

	/// The adapter's shutdown-safety reference count.
	fn direct_count(&self) -> &DirectCount;

	/// The shared dispatch thread pool.
	fn thread_pool(&self) -> &dyn ThreadPool;

	/// Acquires one direct-count reference, failing once deactivation has
	/// begun.
	fn acquire_direct_count(&self) -> Result<(), DispatchError> {
		if self.direct_count().try_acquire() {
			Ok(())
		} else {
			Err(DispatchError::AdapterDeactivated(self.name().to_owned()))
		}
	}

	/// Releases one direct-count reference.
	fn release_direct_count(&self) {
		self.direct_count().release();
	}
}
