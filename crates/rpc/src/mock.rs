//! Scripted in-memory transport.
//!
//! Replies are scripted per `(address, method)` and optionally per exact
//! argument list. Every round trip is recorded, which is what batching and
//! coalescing tests assert on. Calls can be held behind a [`MockGate`] to
//! force a particular completion order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::{Address, CallRequest, CallTransport, Endpoint, Error, Result, TransactionReceipt, WriteOptions};

#[derive(Debug, Clone)]
enum MockReply {
	Value(Value),
	Revert(Option<String>),
	Transport(String),
}

/// One recorded round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
	/// Endpoint the round trip targeted.
	pub endpoint: Endpoint,
	/// Calls carried, in order.
	pub calls: Vec<CallRequest>,
	/// Whether the calls travelled as one aggregate.
	pub aggregated: bool,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq)]
pub struct SentTransaction {
	/// Endpoint the write targeted.
	pub endpoint: Endpoint,
	/// The call.
	pub call: CallRequest,
	/// Signing account.
	pub sender: Address,
	/// Options supplied by the caller.
	pub options: WriteOptions,
}

/// Holds matching calls until released.
#[derive(Debug, Clone)]
pub struct MockGate {
	sem: Arc<Semaphore>,
}

impl MockGate {
	/// Lets every held and future matching call through.
	pub fn release(&self) {
		self.sem.close();
	}
}

struct Gate {
	method: String,
	args: String,
	sem: Arc<Semaphore>,
}

type ReplyKey = (Address, String, Option<String>);

#[derive(Default)]
struct MockState {
	replies: HashMap<ReplyKey, MockReply>,
	gates: Vec<Gate>,
	round_trips: Vec<RoundTrip>,
	sent: Vec<SentTransaction>,
	transport_failure: Option<String>,
	send_failure: Option<Error>,
}

/// In-memory [`CallTransport`] with scripted replies.
pub struct MockTransport {
	state: Mutex<MockState>,
	aggregate: bool,
}

impl Default for MockTransport {
	fn default() -> Self {
		Self::new()
	}
}

fn args_key(args: &[Value]) -> String {
	serde_json::to_string(args).unwrap_or_default()
}

impl MockTransport {
	/// Creates a transport that supports aggregated reads.
	pub fn new() -> Self {
		Self {
			state: Mutex::new(MockState::default()),
			aggregate: true,
		}
	}

	/// Creates a transport that executes aggregates as sequential single reads.
	pub fn without_aggregate() -> Self {
		Self {
			state: Mutex::new(MockState::default()),
			aggregate: false,
		}
	}

	fn script(&self, address: &Address, method: &str, args: Option<&[Value]>, reply: MockReply) {
		let key = (address.clone(), method.to_string(), args.map(args_key));
		self.state.lock().replies.insert(key, reply);
	}

	/// Scripts a value for `method` regardless of arguments.
	pub fn respond(&self, address: &Address, method: &str, value: Value) {
		self.script(address, method, None, MockReply::Value(value));
	}

	/// Scripts a value for `method` called with exactly `args`.
	pub fn respond_with_args(&self, address: &Address, method: &str, args: Vec<Value>, value: Value) {
		self.script(address, method, Some(&args), MockReply::Value(value));
	}

	/// Scripts a revert for `method`.
	pub fn revert(&self, address: &Address, method: &str, reason: Option<&str>) {
		self.script(address, method, None, MockReply::Revert(reason.map(str::to_string)));
	}

	/// Scripts a transport failure for any round trip carrying `method`.
	pub fn fail_method(&self, address: &Address, method: &str, message: &str) {
		self.script(address, method, None, MockReply::Transport(message.to_string()));
	}

	/// Makes every read round trip fail at the transport level.
	pub fn set_transport_failure(&self, message: Option<&str>) {
		self.state.lock().transport_failure = message.map(str::to_string);
	}

	/// Makes every write fail with `err`.
	pub fn set_send_failure(&self, err: Option<Error>) {
		self.state.lock().send_failure = err;
	}

	/// Holds every call to `method` with exactly `args` until the gate is released.
	pub fn hold(&self, method: &str, args: Vec<Value>) -> MockGate {
		let sem = Arc::new(Semaphore::new(0));
		self.state.lock().gates.push(Gate {
			method: method.to_string(),
			args: args_key(&args),
			sem: Arc::clone(&sem),
		});
		MockGate { sem }
	}

	/// Returns every recorded read round trip.
	pub fn round_trips(&self) -> Vec<RoundTrip> {
		self.state.lock().round_trips.clone()
	}

	/// Returns the number of recorded read round trips.
	pub fn round_trip_count(&self) -> usize {
		self.state.lock().round_trips.len()
	}

	/// Returns how many individual calls to `method` were carried.
	pub fn calls_to(&self, method: &str) -> usize {
		self.state
			.lock()
			.round_trips
			.iter()
			.flat_map(|rt| rt.calls.iter())
			.filter(|c| c.method == method)
			.count()
	}

	/// Returns every recorded write.
	pub fn sent(&self) -> Vec<SentTransaction> {
		self.state.lock().sent.clone()
	}

	fn record(&self, endpoint: &Endpoint, calls: &[CallRequest], aggregated: bool) -> Vec<Arc<Semaphore>> {
		let mut state = self.state.lock();
		state.round_trips.push(RoundTrip {
			endpoint: endpoint.clone(),
			calls: calls.to_vec(),
			aggregated,
		});
		state
			.gates
			.iter()
			.filter(|g| calls.iter().any(|c| c.method == g.method && args_key(&c.args) == g.args))
			.map(|g| Arc::clone(&g.sem))
			.collect()
	}

	async fn wait_gates(gates: Vec<Arc<Semaphore>>) {
		for sem in gates {
			// Closing the semaphore is the release signal.
			let _ = sem.acquire().await;
		}
	}

	fn reply(&self, call: &CallRequest) -> Result<Value> {
		let state = self.state.lock();
		let exact = (call.address.clone(), call.method.clone(), Some(args_key(&call.args)));
		let any = (call.address.clone(), call.method.clone(), None);
		match state.replies.get(&exact).or_else(|| state.replies.get(&any)) {
			Some(MockReply::Value(v)) => Ok(v.clone()),
			Some(MockReply::Revert(reason)) => Err(Error::ExecutionReverted { reason: reason.clone() }),
			Some(MockReply::Transport(msg)) => Err(Error::Transport(msg.clone())),
			None => Err(Error::reverted(format!("unscripted call {}.{}", call.address, call.method))),
		}
	}

	fn transport_failure(&self) -> Option<Error> {
		self.state.lock().transport_failure.clone().map(Error::Transport)
	}

	async fn single(&self, endpoint: &Endpoint, call: &CallRequest) -> Result<Value> {
		let gates = self.record(endpoint, std::slice::from_ref(call), false);
		Self::wait_gates(gates).await;
		if let Some(err) = self.transport_failure() {
			return Err(err);
		}
		self.reply(call)
	}
}

#[async_trait]
impl CallTransport for MockTransport {
	async fn call(&self, endpoint: &Endpoint, call: &CallRequest) -> Result<Value> {
		self.single(endpoint, call).await
	}

	fn supports_aggregate(&self, _endpoint: &Endpoint) -> bool {
		self.aggregate
	}

	async fn aggregate(&self, endpoint: &Endpoint, calls: &[CallRequest]) -> Result<Vec<Result<Value>>> {
		if !self.aggregate {
			let mut results = Vec::with_capacity(calls.len());
			for call in calls {
				match self.single(endpoint, call).await {
					Err(err @ Error::Transport(_)) => return Err(err),
					res => results.push(res),
				}
			}
			return Ok(results);
		}

		let gates = self.record(endpoint, calls, true);
		Self::wait_gates(gates).await;
		if let Some(err) = self.transport_failure() {
			return Err(err);
		}
		let results: Vec<Result<Value>> = calls.iter().map(|c| self.reply(c)).collect();
		if let Some(Err(err @ Error::Transport(_))) = results.iter().find(|r| matches!(r, Err(Error::Transport(_)))) {
			return Err(err.clone());
		}
		Ok(results)
	}

	async fn send(&self, endpoint: &Endpoint, call: &CallRequest, sender: &Address, options: &WriteOptions) -> Result<TransactionReceipt> {
		let mut state = self.state.lock();
		if let Some(err) = state.send_failure.clone() {
			return Err(err);
		}
		state.sent.push(SentTransaction {
			endpoint: endpoint.clone(),
			call: call.clone(),
			sender: sender.clone(),
			options: options.clone(),
		});
		let n = state.sent.len() as u64;
		Ok(TransactionReceipt {
			tx_hash: format!("0x{n:064x}"),
			block_number: Some(n),
			status: true,
			events: Default::default(),
		})
	}
}
