//! Timeout-bounded facade over a [`CallTransport`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::{Address, CallRequest, CallTransport, Endpoint, Error, Result, TransactionReceipt, WriteOptions};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues reads and writes against a remote execution endpoint.
///
/// Cheap to clone; all clones share the same transport.
#[derive(Clone)]
pub struct RemoteCallClient {
	transport: Arc<dyn CallTransport>,
	timeout: Duration,
}

impl std::fmt::Debug for RemoteCallClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteCallClient")
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

impl RemoteCallClient {
	/// Creates a client with the default request timeout.
	pub fn new(transport: Arc<dyn CallTransport>) -> Self {
		Self::with_timeout(transport, DEFAULT_REQUEST_TIMEOUT)
	}

	/// Creates a client with an explicit request timeout.
	pub fn with_timeout(transport: Arc<dyn CallTransport>, timeout: Duration) -> Self {
		Self { transport, timeout }
	}

	/// Returns the per-request timeout.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Returns true if `endpoint` accepts aggregated reads.
	pub fn supports_aggregate(&self, endpoint: &Endpoint) -> bool {
		self.transport.supports_aggregate(endpoint)
	}

	/// Reads one value.
	pub async fn read(&self, endpoint: &Endpoint, address: &Address, method: &str, args: Vec<Value>) -> Result<Value> {
		let call = CallRequest::new(address.clone(), method, args);
		debug!(%endpoint, address = %call.address, method = %call.method, "rpc.read");
		self.bounded(self.transport.call(endpoint, &call)).await
	}

	/// Reads several values in one round trip.
	///
	/// The outer `Err` fails the whole group; inner results are in `calls` order.
	pub async fn read_many(&self, endpoint: &Endpoint, calls: &[CallRequest]) -> Result<Vec<Result<Value>>> {
		if calls.is_empty() {
			return Ok(Vec::new());
		}
		debug!(%endpoint, calls = calls.len(), "rpc.read_many");
		let results = self.bounded(self.transport.aggregate(endpoint, calls)).await?;
		if results.len() != calls.len() {
			warn!(%endpoint, expected = calls.len(), got = results.len(), "rpc.read_many.length_mismatch");
			return Err(Error::Decode(format!(
				"aggregate returned {} results for {} calls",
				results.len(),
				calls.len()
			)));
		}
		Ok(results)
	}

	/// Submits a state-changing call.
	///
	/// Never retried here: a write must be issued exactly once per user intent.
	pub async fn write(&self, endpoint: &Endpoint, call: CallRequest, sender: &Address, options: &WriteOptions) -> Result<TransactionReceipt> {
		debug!(%endpoint, address = %call.address, method = %call.method, %sender, "rpc.write");
		let res = self.bounded(self.transport.send(endpoint, &call, sender, options)).await;
		if let Err(ref err) = res {
			warn!(method = %call.method, error = %err, "rpc.write.failed");
		}
		res
	}

	async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
		match tokio::time::timeout(self.timeout, fut).await {
			Ok(res) => res,
			Err(_) => Err(Error::Transport(format!("request timed out after {:?}", self.timeout))),
		}
	}
}
