//! Transport seam implemented by the wallet/network provider.

use async_trait::async_trait;
use serde_json::Value;

use crate::{Address, CallRequest, Endpoint, Error, Result, TransactionReceipt, WriteOptions};

/// Raw access to a remote execution endpoint.
///
/// Implementations own encoding, signing and the wire protocol. They must be
/// shareable across tasks via `Arc<dyn CallTransport>`.
#[async_trait]
pub trait CallTransport: Send + Sync {
	/// Executes one side-effect free read.
	async fn call(&self, endpoint: &Endpoint, call: &CallRequest) -> Result<Value>;

	/// Returns true if `endpoint` can execute several reads in one round trip.
	fn supports_aggregate(&self, _endpoint: &Endpoint) -> bool {
		false
	}

	/// Executes several reads, ideally in one round trip.
	///
	/// The outer `Err` is a failure of the round trip itself. Inner errors are
	/// per sub-call and the returned vector must be in `calls` order.
	///
	/// The default degrades to sequential single reads, stopping at the first
	/// transport failure.
	async fn aggregate(&self, endpoint: &Endpoint, calls: &[CallRequest]) -> Result<Vec<Result<Value>>> {
		let mut results = Vec::with_capacity(calls.len());
		for call in calls {
			match self.call(endpoint, call).await {
				Err(err @ Error::Transport(_)) => return Err(err),
				res => results.push(res),
			}
		}
		Ok(results)
	}

	/// Submits a state-changing call signed by `sender` and waits for its receipt.
	async fn send(&self, endpoint: &Endpoint, call: &CallRequest, sender: &Address, options: &WriteOptions) -> Result<TransactionReceipt>;
}
