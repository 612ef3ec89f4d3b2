//! Reactive wrapper around one deployed contract.
//!
//! A [`ContractHandle`] owns the contract's cached fields together with the
//! account and endpoint they were computed against. Both live under one lock,
//! and every load records the binding epoch it was issued under; completion
//! re-checks that epoch under the same lock before writing. A load that
//! finishes after the binding moved is reported as [`LoadOutcome::Stale`] and
//! never touches the fields.
//!
//! # Load coalescing
//!
//! Each track (common/user) allows one in-flight load per binding. A second
//! caller for the same track and binding becomes a waiter on the leader's
//! `watch` channel and receives the same result. If the leader is dropped
//! before completing, its guard publishes [`Error::Aborted`] so waiters do
//! not hang.

mod events;
mod status;

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use quorum_rpc::decode::Transform;
use quorum_rpc::{Address, CallRequest, Endpoint, Error, FieldValue, JsonValue, Result, TransactionReceipt, U256, WriteOptions};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

pub use self::events::{EventKind, HandleEvent, ListenerId};
use self::events::{Listener, Listeners};
pub use self::status::{LoadOutcome, LoadStatus, Track};
use crate::batch::{BatchAggregator, PendingRead};
use crate::contracts::{ContractKind, ReadSpec};

type SharedOutcome = Option<Arc<Result<LoadOutcome>>>;

/// Binding generation a load was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BindingKey {
	endpoint_epoch: u64,
	account_epoch: u64,
}

struct InFlightLoad {
	key: BindingKey,
	seq: u64,
	tx: watch::Sender<SharedOutcome>,
}

struct TrackState {
	status: LoadStatus,
	inflight: Option<InFlightLoad>,
}

impl TrackState {
	fn new(status: LoadStatus) -> Self {
		Self { status, inflight: None }
	}
}

/// Binding and cached fields, guarded together.
struct HandleState {
	account: Option<Address>,
	endpoint: Option<Endpoint>,
	endpoint_epoch: u64,
	account_epoch: u64,
	fields: IndexMap<String, FieldValue>,
	common: TrackState,
	user: TrackState,
	next_seq: u64,
}

impl HandleState {
	fn key(&self, track: Track) -> BindingKey {
		BindingKey {
			endpoint_epoch: self.endpoint_epoch,
			account_epoch: match track {
				Track::Common => 0,
				Track::User => self.account_epoch,
			},
		}
	}

	fn track(&self, track: Track) -> &TrackState {
		match track {
			Track::Common => &self.common,
			Track::User => &self.user,
		}
	}

	fn track_mut(&mut self, track: Track) -> &mut TrackState {
		match track {
			Track::Common => &mut self.common,
			Track::User => &mut self.user,
		}
	}

	fn unloaded_user_status(&self) -> LoadStatus {
		if self.account.is_some() { LoadStatus::Idle } else { LoadStatus::Unbound }
	}
}

struct HandleInner {
	address: Address,
	kind: Arc<dyn ContractKind>,
	batcher: BatchAggregator,
	state: Mutex<HandleState>,
	listeners: Mutex<Listeners>,
}

/// Live, cached view of one deployed contract.
///
/// Cheap to clone; clones share state. Two handles are the same contract
/// instance iff [`ContractHandle::ptr_eq`] holds.
#[derive(Clone)]
pub struct ContractHandle {
	inner: Arc<HandleInner>,
}

impl std::fmt::Debug for ContractHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("ContractHandle")
			.field("address", &self.inner.address)
			.field("kind", &self.inner.kind.name())
			.field("account", &state.account)
			.field("endpoint", &state.endpoint)
			.field("fields", &state.fields.len())
			.finish()
	}
}

enum Role {
	Waiter(watch::Receiver<SharedOutcome>),
	Leader {
		guard: LoadGuard,
		endpoint: Endpoint,
		reads: Vec<ReadSpec>,
	},
}

impl ContractHandle {
	/// Creates an unbound handle. Registries bind it before handing it out.
	pub fn new(address: Address, kind: Arc<dyn ContractKind>, batcher: BatchAggregator) -> Self {
		Self {
			inner: Arc::new(HandleInner {
				address,
				kind,
				batcher,
				state: Mutex::new(HandleState {
					account: None,
					endpoint: None,
					endpoint_epoch: 0,
					account_epoch: 0,
					fields: IndexMap::new(),
					common: TrackState::new(LoadStatus::Uninitialized),
					user: TrackState::new(LoadStatus::Unbound),
					next_seq: 0,
				}),
				listeners: Mutex::new(Listeners::default()),
			}),
		}
	}

	/// Returns true if both handles refer to the same instance.
	pub fn ptr_eq(a: &Self, b: &Self) -> bool {
		Arc::ptr_eq(&a.inner, &b.inner)
	}

	/// Contract address.
	pub fn address(&self) -> &Address {
		&self.inner.address
	}

	/// Contract definition driving this handle's reads.
	pub fn kind(&self) -> &dyn ContractKind {
		self.inner.kind.as_ref()
	}

	/// Currently bound account.
	pub fn account(&self) -> Option<Address> {
		self.inner.state.lock().account.clone()
	}

	/// Currently bound endpoint.
	pub fn endpoint(&self) -> Option<Endpoint> {
		self.inner.state.lock().endpoint.clone()
	}

	/// Load state of the common track.
	pub fn common_status(&self) -> LoadStatus {
		self.status(Track::Common)
	}

	/// Load state of the user track.
	pub fn user_status(&self) -> LoadStatus {
		self.status(Track::User)
	}

	/// Load state of `track`.
	pub fn status(&self, track: Track) -> LoadStatus {
		self.inner.state.lock().track(track).status.clone()
	}

	/// Cached value of `name`; `None` means unknown.
	pub fn field(&self, name: &str) -> Option<FieldValue> {
		self.inner.state.lock().fields.get(name).cloned()
	}

	/// Cached unsigned integer field.
	pub fn uint(&self, name: &str) -> Option<U256> {
		self.field(name).and_then(|v| v.as_uint())
	}

	/// Cached boolean field.
	pub fn bool(&self, name: &str) -> Option<bool> {
		self.field(name).and_then(|v| v.as_bool())
	}

	/// Cached address field.
	pub fn address_field(&self, name: &str) -> Option<Address> {
		self.field(name).and_then(|v| v.as_address().cloned())
	}

	/// Cached timestamp field, in seconds.
	pub fn timestamp(&self, name: &str) -> Option<u64> {
		self.field(name).and_then(|v| v.as_timestamp())
	}

	/// Cached string field.
	pub fn text(&self, name: &str) -> Option<String> {
		self.field(name).and_then(|v| v.as_text().map(str::to_string))
	}

	/// Every known field, in the order it was first loaded.
	pub fn snapshot(&self) -> IndexMap<String, FieldValue> {
		self.inner.state.lock().fields.clone()
	}

	/// Registers `listener` for events of `kind`.
	///
	/// Listeners run synchronously on the task that caused the event, after
	/// the handle's state lock has been released.
	pub fn on(&self, kind: EventKind, listener: impl Fn(&ContractHandle, &HandleEvent) + Send + Sync + 'static) -> ListenerId {
		let listener: Listener = Arc::new(listener);
		self.inner.listeners.lock().add(kind, listener)
	}

	/// Removes a listener. Returns false if it was not registered for `kind`.
	pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
		self.inner.listeners.lock().remove(kind, id)
	}

	/// Number of listeners registered for `kind`.
	pub fn listener_count(&self, kind: EventKind) -> usize {
		self.inner.listeners.lock().count(kind)
	}

	fn emit(&self, event: HandleEvent) {
		let listeners = self.inner.listeners.lock().snapshot(event.kind());
		for listener in listeners {
			listener(self, &event);
		}
	}

	/// Binds `account`. Clears account-scoped fields and emits
	/// [`EventKind::Account`] if it changed; never reloads.
	pub fn set_account(&self, account: Option<Address>) -> bool {
		let previous = {
			let mut state = self.inner.state.lock();
			if state.account == account {
				return false;
			}
			let previous = std::mem::replace(&mut state.account, account.clone());
			state.account_epoch += 1;
			for name in self.inner.kind.user_fields() {
				state.fields.shift_remove(*name);
			}
			let status = state.unloaded_user_status();
			state.user = TrackState::new(status);
			previous
		};

		debug!(address = %self.inner.address, account = ?account, "sync.handle.account");
		self.emit(HandleEvent::AccountChanged {
			previous,
			current: account,
		});
		true
	}

	/// Binds `endpoint`. Clears every cached field and emits
	/// [`EventKind::Endpoint`] if it changed; never reloads.
	pub fn set_endpoint(&self, endpoint: Option<Endpoint>) -> bool {
		let previous = {
			let mut state = self.inner.state.lock();
			if state.endpoint == endpoint {
				return false;
			}
			let previous = std::mem::replace(&mut state.endpoint, endpoint.clone());
			state.endpoint_epoch += 1;
			state.fields.clear();
			state.common = TrackState::new(LoadStatus::Uninitialized);
			let status = state.unloaded_user_status();
			state.user = TrackState::new(status);
			previous
		};

		debug!(address = %self.inner.address, endpoint = ?endpoint, "sync.handle.endpoint");
		self.emit(HandleEvent::EndpointChanged {
			previous,
			current: endpoint,
		});
		true
	}

	/// Binds endpoint then account.
	pub fn bind(&self, account: Option<Address>, endpoint: Option<Endpoint>) {
		self.set_endpoint(endpoint);
		self.set_account(account);
	}

	/// Loads the account-independent fields.
	pub async fn load_common_data(&self) -> Result<LoadOutcome> {
		self.load(Track::Common).await
	}

	/// Loads the account-scoped fields.
	///
	/// # Errors
	///
	/// [`Error::NoAccountBound`] if no account is bound.
	pub async fn load_user_data(&self) -> Result<LoadOutcome> {
		self.load(Track::User).await
	}

	/// Loads one track.
	///
	/// Emits [`EventKind::Data`] when at least one field was stored. A load
	/// where every read failed returns the first failure and emits nothing.
	pub async fn load(&self, track: Track) -> Result<LoadOutcome> {
		match self.join_or_lead(track) {
			Err(err) => {
				debug!(address = %self.inner.address, track = track.as_str(), error = %err, "sync.handle.load.skipped");
				Err(err)
			}
			Ok(Role::Waiter(rx)) => wait_for_leader(rx).await,
			Ok(Role::Leader { guard, endpoint, reads }) => self.lead(guard, endpoint, reads).await,
		}
	}

	fn join_or_lead(&self, track: Track) -> Result<Role> {
		let mut state = self.inner.state.lock();
		let reads = match track {
			Track::Common => self.inner.kind.common_reads(),
			Track::User => {
				let account = state.account.clone().ok_or(Error::NoAccountBound)?;
				self.inner.kind.user_reads(&account)
			}
		};
		let endpoint = state.endpoint.clone().ok_or(Error::NoEndpointBound)?;
		let key = state.key(track);

		if let Some(inflight) = state.track(track).inflight.as_ref().filter(|f| f.key == key) {
			trace!(address = %self.inner.address, track = track.as_str(), "sync.handle.load.coalesced");
			return Ok(Role::Waiter(inflight.tx.subscribe()));
		}

		state.next_seq += 1;
		let seq = state.next_seq;
		let (tx, _) = watch::channel(None);
		let slot = state.track_mut(track);
		slot.status = LoadStatus::Loading;
		slot.inflight = Some(InFlightLoad {
			key,
			seq,
			tx: tx.clone(),
		});

		Ok(Role::Leader {
			guard: LoadGuard {
				inner: Arc::clone(&self.inner),
				track,
				seq,
				tx,
				completed: false,
			},
			endpoint,
			reads,
		})
	}

	async fn lead(&self, guard: LoadGuard, endpoint: Endpoint, reads: Vec<ReadSpec>) -> Result<LoadOutcome> {
		let track = guard.track;
		let key = {
			let state = self.inner.state.lock();
			state
				.track(track)
				.inflight
				.as_ref()
				.filter(|f| f.seq == guard.seq)
				.map(|f| f.key)
		};
		let Some(key) = key else {
			// Binding moved between election and dispatch.
			return guard.complete(Ok(LoadOutcome::Stale));
		};

		let (names, pending): (Vec<&'static str>, Vec<PendingRead>) = reads
			.into_iter()
			.map(|spec| (spec.field, spec.into_pending(&self.inner.address)))
			.unzip();
		debug!(
			address = %self.inner.address,
			contract = self.inner.kind.name(),
			track = track.as_str(),
			reads = names.len(),
			"sync.handle.load"
		);
		let results = if pending.is_empty() {
			Vec::new()
		} else {
			self.inner.batcher.read_all(&endpoint, pending).await
		};

		let res = {
			let mut state = self.inner.state.lock();
			if state.key(track) != key {
				debug!(address = %self.inner.address, track = track.as_str(), "sync.handle.stale");
				Ok(LoadOutcome::Stale)
			} else {
				let mut updated = Vec::new();
				let mut failed = Vec::new();
				for (name, res) in names.into_iter().zip(results) {
					match res {
						Ok(value) => {
							state.fields.insert(name.to_string(), value);
							updated.push(name.to_string());
						}
						Err(err) => failed.push((name.to_string(), err)),
					}
				}
				let res = match failed.first() {
					Some((_, err)) if updated.is_empty() => Err(err.clone()),
					_ => Ok(LoadOutcome::Applied { updated, failed }),
				};
				state.track_mut(track).status = match &res {
					Ok(_) => LoadStatus::Ready,
					Err(err) => LoadStatus::Failed(err.clone()),
				};
				res
			}
		};

		match &res {
			Ok(LoadOutcome::Applied { updated, failed }) => {
				for (field, err) in failed {
					warn!(address = %self.inner.address, field = %field, error = %err, "sync.handle.field_failed");
				}
				if !updated.is_empty() {
					self.emit(HandleEvent::Data { updated: updated.clone() });
				}
			}
			Ok(LoadOutcome::Stale) => {}
			Err(err) => {
				warn!(address = %self.inner.address, track = track.as_str(), error = %err, "sync.handle.load_failed");
			}
		}

		guard.complete(res)
	}

	/// Uncached one-off read of `method`, routed through the batcher.
	pub async fn call(&self, method: &str, args: Vec<JsonValue>, transform: Transform) -> Result<FieldValue> {
		let endpoint = self.endpoint().ok_or(Error::NoEndpointBound)?;
		let read = PendingRead::new(self.inner.address.clone(), method, args, transform);
		self.inner.batcher.read(&endpoint, read).await
	}

	/// Submits a state-changing call signed by the bound account.
	///
	/// No optimistic update is applied; callers reload once the receipt
	/// arrives.
	///
	/// # Errors
	///
	/// [`Error::NoAccountBound`] if no account is bound.
	pub async fn send(&self, method: &str, args: Vec<JsonValue>, options: &WriteOptions) -> Result<TransactionReceipt> {
		let (sender, endpoint) = {
			let state = self.inner.state.lock();
			(state.account.clone(), state.endpoint.clone())
		};
		let sender = sender.ok_or(Error::NoAccountBound)?;
		let endpoint = endpoint.ok_or(Error::NoEndpointBound)?;
		let call = CallRequest::new(self.inner.address.clone(), method, args);
		self.inner.batcher.client().write(&endpoint, call, &sender, options).await
	}
}

async fn wait_for_leader(mut rx: watch::Receiver<SharedOutcome>) -> Result<LoadOutcome> {
	loop {
		let current = rx.borrow_and_update().as_ref().cloned();
		if let Some(res) = current {
			return (*res).clone();
		}
		if rx.changed().await.is_err() {
			return Err(Error::Aborted("load leader dropped without a result".into()));
		}
	}
}

/// Publishes the leader's result to waiters and frees the track slot.
///
/// Dropping the guard without completing (the leader's future was
/// cancelled) publishes [`Error::Aborted`] instead.
struct LoadGuard {
	inner: Arc<HandleInner>,
	track: Track,
	seq: u64,
	tx: watch::Sender<SharedOutcome>,
	completed: bool,
}

impl LoadGuard {
	fn complete(mut self, res: Result<LoadOutcome>) -> Result<LoadOutcome> {
		self.completed = true;
		self.release(None);
		self.tx.send_replace(Some(Arc::new(res.clone())));
		res
	}

	fn release(&self, aborted: Option<&Error>) {
		let mut state = self.inner.state.lock();
		let slot = state.track_mut(self.track);
		if slot.inflight.as_ref().is_some_and(|f| f.seq == self.seq) {
			slot.inflight = None;
			if let Some(err) = aborted
				&& slot.status.is_loading()
			{
				slot.status = LoadStatus::Failed(err.clone());
			}
		}
	}
}

impl Drop for LoadGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		let err = Error::Aborted("load cancelled before completion".into());
		self.release(Some(&err));
		self.tx.send_replace(Some(Arc::new(Err(err))));
	}
}
