//! Liveness-probe collaborator used by well-known-object resolution.

use async_trait::async_trait;
use tether_core::Proxy;

/// Zero-payload liveness round trip against an indirect proxy.
///
/// Implemented by the invocation layer; the registry only cares whether
/// the probe reached a live object. Probes perform I/O and are always
/// issued outside the registry lock.
#[async_trait]
pub trait Pinger: Send + Sync {
	/// Returns true when the proxied object answered the probe.
	async fn ping(&self, proxy: &Proxy) -> bool;
}
