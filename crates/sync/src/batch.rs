//! Per-endpoint read coalescing.
//!
//! Reads submitted while an endpoint's queue is non-empty ride along with the
//! flush already scheduled for it. The flush task yields once so that every
//! read queued in the current scheduling tick lands in the queue, drains it,
//! and issues one aggregated round trip per chunk of at most
//! `max_batch_size` calls. Queues are keyed by [`Endpoint`], so reads for two
//! endpoints never share a network call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use quorum_rpc::decode::Transform;
use quorum_rpc::{Address, CallRequest, Endpoint, Error, FieldValue, JsonValue, RemoteCallClient, Result};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::config::BatchFailurePolicy;
use crate::task::{self, TaskClass};

/// One unit of work submitted to the [`BatchAggregator`].
///
/// Owned by the submitting load for a single cycle; never shared.
#[derive(Debug, Clone)]
pub struct PendingRead {
	/// Target contract.
	pub address: Address,
	/// Method selector name.
	pub method: String,
	/// Encoded arguments.
	pub args: Vec<JsonValue>,
	/// Pure transform applied to the raw sub-result.
	pub transform: Transform,
}

impl PendingRead {
	/// Creates a pending read.
	pub fn new(address: Address, method: impl Into<String>, args: Vec<JsonValue>, transform: Transform) -> Self {
		Self {
			address,
			method: method.into(),
			args,
			transform,
		}
	}

	fn call(&self) -> CallRequest {
		CallRequest::new(self.address.clone(), self.method.clone(), self.args.clone())
	}
}

struct Queued {
	read: PendingRead,
	reply: oneshot::Sender<Result<FieldValue>>,
}

struct BatchInner {
	client: RemoteCallClient,
	policy: BatchFailurePolicy,
	max_batch_size: usize,
	queues: Mutex<HashMap<Endpoint, Vec<Queued>>>,
}

/// Coalesces reads queued in the same scheduling tick into aggregated round
/// trips, one queue per endpoint.
///
/// Cloning yields another handle to the same queues.
#[derive(Clone)]
pub struct BatchAggregator {
	inner: Arc<BatchInner>,
}

impl std::fmt::Debug for BatchAggregator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BatchAggregator")
			.field("policy", &self.inner.policy)
			.field("max_batch_size", &self.inner.max_batch_size)
			.finish_non_exhaustive()
	}
}

impl BatchAggregator {
	/// Creates an aggregator. A `max_batch_size` of zero is treated as one.
	pub fn new(client: RemoteCallClient, policy: BatchFailurePolicy, max_batch_size: usize) -> Self {
		Self {
			inner: Arc::new(BatchInner {
				client,
				policy,
				max_batch_size: max_batch_size.max(1),
				queues: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// The client every batch is issued through.
	pub fn client(&self) -> &RemoteCallClient {
		&self.inner.client
	}

	/// The partial-failure policy applied to every batch.
	pub fn policy(&self) -> BatchFailurePolicy {
		self.inner.policy
	}

	/// Upper bound on calls per round trip.
	pub fn max_batch_size(&self) -> usize {
		self.inner.max_batch_size
	}

	/// Queues one read; the receiver resolves once its batch completes.
	pub fn submit(&self, endpoint: &Endpoint, read: PendingRead) -> oneshot::Receiver<Result<FieldValue>> {
		let mut receivers = self.enqueue(endpoint, vec![read]);
		// enqueue returns one receiver per read
		receivers.remove(0)
	}

	/// Queues a group of reads atomically and awaits all of them.
	///
	/// Results are in `reads` order. The group is never split across two
	/// flushes unless it exceeds `max_batch_size`.
	pub async fn read_all(&self, endpoint: &Endpoint, reads: Vec<PendingRead>) -> Vec<Result<FieldValue>> {
		let receivers = self.enqueue(endpoint, reads);
		let mut results = Vec::with_capacity(receivers.len());
		for rx in receivers {
			results.push(rx.await.unwrap_or_else(|_| Err(Error::Aborted("batch dropped before completion".into()))));
		}
		results
	}

	/// Queues one read and awaits it.
	pub async fn read(&self, endpoint: &Endpoint, read: PendingRead) -> Result<FieldValue> {
		self.submit(endpoint, read)
			.await
			.unwrap_or_else(|_| Err(Error::Aborted("batch dropped before completion".into())))
	}

	fn enqueue(&self, endpoint: &Endpoint, reads: Vec<PendingRead>) -> Vec<oneshot::Receiver<Result<FieldValue>>> {
		let mut receivers = Vec::with_capacity(reads.len());
		let schedule = {
			let mut queues = self.inner.queues.lock();
			let queue = queues.entry(endpoint.clone()).or_default();
			let schedule = queue.is_empty();
			for read in reads {
				let (reply, rx) = oneshot::channel();
				queue.push(Queued { read, reply });
				receivers.push(rx);
			}
			schedule && !queue.is_empty()
		};

		if schedule {
			let inner = Arc::clone(&self.inner);
			let endpoint = endpoint.clone();
			task::spawn(TaskClass::Flush, async move {
				tokio::task::yield_now().await;
				inner.flush(endpoint).await;
			});
		}
		receivers
	}
}

impl BatchInner {
	async fn flush(self: Arc<Self>, endpoint: Endpoint) {
		let drained = self.queues.lock().remove(&endpoint).unwrap_or_default();
		if drained.is_empty() {
			return;
		}
		let chunks = drained.len().div_ceil(self.max_batch_size);
		debug!(%endpoint, reads = drained.len(), chunks, "sync.batch.flush");

		let mut drained = drained.into_iter();
		loop {
			let chunk: Vec<Queued> = drained.by_ref().take(self.max_batch_size).collect();
			if chunk.is_empty() {
				break;
			}
			self.dispatch(&endpoint, chunk).await;
		}
	}

	async fn dispatch(&self, endpoint: &Endpoint, chunk: Vec<Queued>) {
		let raw: Vec<Result<JsonValue>> = if let [only] = chunk.as_slice() {
			let read = &only.read;
			vec![self.client.read(endpoint, &read.address, &read.method, read.args.clone()).await]
		} else {
			let calls: Vec<CallRequest> = chunk.iter().map(|q| q.read.call()).collect();
			match self.client.read_many(endpoint, &calls).await {
				Ok(results) => self.apply_policy(results),
				Err(err) => {
					warn!(%endpoint, calls = calls.len(), error = %err, "sync.batch.round_trip_failed");
					vec![Err(err); calls.len()]
				}
			}
		};

		for (queued, res) in chunk.into_iter().zip(raw) {
			let Queued { read, reply } = queued;
			let res = res.and_then(read.transform);
			if let Err(err @ Error::Decode(_)) = &res {
				error!(address = %read.address, method = %read.method, error = %err, "sync.batch.decode_failed");
			}
			// The submitter may have given up on the result.
			let _ = reply.send(res);
		}
	}

	fn apply_policy(&self, results: Vec<Result<JsonValue>>) -> Vec<Result<JsonValue>> {
		match self.policy {
			BatchFailurePolicy::Isolated => results,
			BatchFailurePolicy::AllOrNothing => match results.iter().find_map(|r| r.as_ref().err()) {
				Some(err) => vec![Err(err.clone()); results.len()],
				None => results,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use quorum_rpc::decode;
	use quorum_rpc::mock::MockTransport;
	use serde_json::json;

	use quorum_rpc::U256;

	use super::*;
	use crate::test_support::{addr, init_tracing, mainnet, testnet};

	fn aggregator(transport: &Arc<MockTransport>, policy: BatchFailurePolicy, max: usize) -> BatchAggregator {
		BatchAggregator::new(RemoteCallClient::new(transport.clone()), policy, max)
	}

	fn uint_read(address: &str, method: &str) -> PendingRead {
		PendingRead::new(addr(address), method, vec![], decode::uint)
	}

	#[tokio::test(flavor = "current_thread")]
	async fn same_tick_reads_share_one_round_trip_in_submission_order() {
		init_tracing();
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xaaa"), "a", json!(1));
		transport.respond(&addr("0xaaa"), "b", json!(2));
		transport.respond(&addr("0xbbb"), "c", json!(3));
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 100);

		let endpoint = mainnet();
		let first = batcher.read_all(&endpoint, vec![uint_read("0xaaa", "a"), uint_read("0xaaa", "b")]);
		let second = batcher.read(&endpoint, uint_read("0xbbb", "c"));
		let (first, second) = tokio::join!(first, second);

		assert_eq!(first, vec![Ok(FieldValue::Uint(U256::from(1))), Ok(FieldValue::Uint(U256::from(2)))]);
		assert_eq!(second, Ok(FieldValue::Uint(U256::from(3))));
		let trips = transport.round_trips();
		assert_eq!(trips.len(), 1);
		let methods: Vec<&str> = trips[0].calls.iter().map(|c| c.method.as_str()).collect();
		assert_eq!(methods, vec!["a", "b", "c"]);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn batched_results_match_individual_reads() {
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xaaa"), "a", json!("0x10"));
		transport.respond(&addr("0xaaa"), "b", json!("42"));
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 100);
		let endpoint = mainnet();

		let batched = batcher.read_all(&endpoint, vec![uint_read("0xaaa", "a"), uint_read("0xaaa", "b")]).await;
		let single_a = batcher.read(&endpoint, uint_read("0xaaa", "a")).await;
		let single_b = batcher.read(&endpoint, uint_read("0xaaa", "b")).await;
		assert_eq!(batched, vec![single_a, single_b]);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn different_endpoints_are_never_merged() {
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xaaa"), "a", json!(1));
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 100);

		let (main_ep, test_ep) = (mainnet(), testnet());
		let (on_main, on_test) = tokio::join!(
			batcher.read(&main_ep, uint_read("0xaaa", "a")),
			batcher.read(&test_ep, uint_read("0xaaa", "a")),
		);
		assert!(on_main.is_ok() && on_test.is_ok());

		let trips = transport.round_trips();
		assert_eq!(trips.len(), 2);
		assert_ne!(trips[0].endpoint, trips[1].endpoint);
		assert!(trips.iter().all(|t| t.calls.len() == 1));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn large_groups_are_chunked() {
		let transport = Arc::new(MockTransport::new());
		for m in ["a", "b", "c", "d", "e"] {
			transport.respond(&addr("0xaaa"), m, json!(7));
		}
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 2);

		let reads = ["a", "b", "c", "d", "e"].iter().map(|m| uint_read("0xaaa", m)).collect();
		let results = batcher.read_all(&mainnet(), reads).await;
		assert_eq!(results.len(), 5);
		assert!(results.iter().all(|r| *r == Ok(FieldValue::Uint(U256::from(7)))));

		let sizes: Vec<usize> = transport.round_trips().iter().map(|t| t.calls.len()).collect();
		assert_eq!(sizes, vec![2, 2, 1]);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn isolated_policy_fails_only_the_reverted_read() {
		let transport = Arc::new(MockTransport::new());
		transport.revert(&addr("0xaaa"), "m", Some("paused"));
		transport.respond(&addr("0xbbb"), "n", json!(5));
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 100);

		let results = batcher.read_all(&mainnet(), vec![uint_read("0xaaa", "m"), uint_read("0xbbb", "n")]).await;
		assert_eq!(results, vec![Err(Error::reverted("paused")), Ok(FieldValue::Uint(U256::from(5)))]);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn all_or_nothing_policy_fails_every_read() {
		let transport = Arc::new(MockTransport::new());
		transport.revert(&addr("0xaaa"), "m", Some("paused"));
		transport.respond(&addr("0xbbb"), "n", json!(5));
		let batcher = aggregator(&transport, BatchFailurePolicy::AllOrNothing, 100);

		let results = batcher.read_all(&mainnet(), vec![uint_read("0xaaa", "m"), uint_read("0xbbb", "n")]).await;
		assert_eq!(results, vec![Err(Error::reverted("paused")), Err(Error::reverted("paused"))]);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn transport_failure_fails_the_whole_round_trip() {
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xaaa"), "a", json!(1));
		transport.respond(&addr("0xaaa"), "b", json!(2));
		transport.set_transport_failure(Some("connection refused"));
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 100);

		let results = batcher.read_all(&mainnet(), vec![uint_read("0xaaa", "a"), uint_read("0xaaa", "b")]).await;
		assert!(results.iter().all(|r| matches!(r, Err(Error::Transport(_)))), "{results:?}");
	}

	#[tokio::test(flavor = "current_thread")]
	async fn decode_failure_fails_only_its_read() {
		init_tracing();
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xaaa"), "a", json!("not a number"));
		transport.respond(&addr("0xaaa"), "b", json!(true));
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 100);

		let results = batcher
			.read_all(
				&mainnet(),
				vec![
					uint_read("0xaaa", "a"),
					PendingRead::new(addr("0xaaa"), "b", vec![], decode::boolean),
				],
			)
			.await;
		assert!(matches!(results[0], Err(Error::Decode(_))));
		assert_eq!(results[1], Ok(FieldValue::Bool(true)));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn endpoints_without_aggregate_still_resolve_in_order() {
		let transport = Arc::new(MockTransport::without_aggregate());
		transport.respond(&addr("0xaaa"), "a", json!(1));
		transport.revert(&addr("0xaaa"), "b", None);
		let batcher = aggregator(&transport, BatchFailurePolicy::Isolated, 100);

		let results = batcher.read_all(&mainnet(), vec![uint_read("0xaaa", "a"), uint_read("0xaaa", "b")]).await;
		assert_eq!(results[0], Ok(FieldValue::Uint(U256::from(1))));
		assert_eq!(results[1], Err(Error::ExecutionReverted { reason: None }));
		assert!(transport.round_trips().iter().all(|t| !t.aggregated));
	}
}
