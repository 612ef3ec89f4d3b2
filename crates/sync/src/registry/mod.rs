//! Identity cache of contract handles.
//!
//! Maps a normalized [`Address`] to exactly one [`ContractHandle`] per
//! registry instance. The registry also owns the shared wallet binding, the
//! batcher every handle reads through, and the [`ReloadSignal`] driven by
//! each handle's `data` events.
//!
//! # Concurrency
//!
//! `state` is a single `RwLock` over the entry map and the wallet binding. It
//! is never held across an `.await` or while user callbacks run; factories
//! and `after_init` hooks are invoked with the lock released.


use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use quorum_rpc::{Address, CallTransport, Endpoint, Error, RemoteCallClient, Result};
use tracing::{debug, info, warn};

use crate::batch::BatchAggregator;
use crate::config::SyncConfig;
use crate::contracts::ContractKind;
use crate::handle::{ContractHandle, EventKind, ListenerId, LoadOutcome, Track};
use crate::reload::ReloadSignal;
use crate::task::{self, TaskClass};

/// Builds the contract definition for an address.
pub type ContractFactory = Arc<dyn Fn(&Address) -> Arc<dyn ContractKind> + Send + Sync>;

/// Hook run once the handle is bound and cached, before its first load.
pub type AfterInit = Arc<dyn Fn(&ContractHandle) + Send + Sync>;

/// The acting account and endpoint shared by every handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletBinding {
	/// Connected account, if any.
	pub account: Option<Address>,
	/// Current network endpoint, if any.
	pub endpoint: Option<Endpoint>,
}

/// Per-handle initialization options.
#[derive(Clone, Default)]
pub struct HandleOptions {
	/// Load the common track on init.
	pub load_common: bool,
	/// Load the user track on init when an account is bound.
	pub load_user: bool,
	/// Hook run after binding, before loads.
	pub after_init: Option<AfterInit>,
}

impl std::fmt::Debug for HandleOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HandleOptions")
			.field("load_common", &self.load_common)
			.field("load_user", &self.load_user)
			.field("after_init", &self.after_init.is_some())
			.finish()
	}
}

impl HandleOptions {
	/// Loads both tracks on init.
	pub fn load_all() -> Self {
		Self {
			load_common: true,
			load_user: true,
			after_init: None,
		}
	}

	/// Loads only the common track on init.
	pub fn common_only() -> Self {
		Self {
			load_common: true,
			..Self::default()
		}
	}

	/// Adds an `after_init` hook.
	pub fn with_after_init(mut self, hook: impl Fn(&ContractHandle) + Send + Sync + 'static) -> Self {
		self.after_init = Some(Arc::new(hook));
		self
	}
}

/// Init results for one handle. `None` means the track was not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInit {
	/// Contract address.
	pub address: Address,
	/// Common track result.
	pub common: Option<Result<LoadOutcome>>,
	/// User track result.
	pub user: Option<Result<LoadOutcome>>,
}

impl HandleInit {
	fn failures(&self) -> usize {
		[&self.common, &self.user]
			.into_iter()
			.filter(|r| matches!(r, Some(Err(_))))
			.count()
	}
}

/// Outcome of [`ContractRegistry::reinit_all`], in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
	/// One entry per cached handle.
	pub handles: Vec<HandleInit>,
}

impl InitReport {
	/// Number of track loads that returned an error.
	pub fn failures(&self) -> usize {
		self.handles.iter().map(HandleInit::failures).sum()
	}

	/// Result for `address`, if it was cached.
	pub fn get(&self, address: &Address) -> Option<&HandleInit> {
		self.handles.iter().find(|h| &h.address == address)
	}
}

struct CachedEntry {
	factory: ContractFactory,
	options: HandleOptions,
	handle: ContractHandle,
	reload_listener: ListenerId,
}

#[derive(Default)]
struct RegistryState {
	entries: IndexMap<Address, CachedEntry>,
	wallet: WalletBinding,
}

/// Address-keyed cache of contract handles.
pub struct ContractRegistry {
	state: RwLock<RegistryState>,
	batcher: BatchAggregator,
	reload: ReloadSignal,
	config: SyncConfig,
}

impl std::fmt::Debug for ContractRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.read();
		f.debug_struct("ContractRegistry")
			.field("handles", &state.entries.len())
			.field("wallet", &state.wallet)
			.field("config", &self.config)
			.finish()
	}
}

impl ContractRegistry {
	/// Creates an empty registry reading through `transport`.
	pub fn new(transport: Arc<dyn CallTransport>, config: SyncConfig) -> Self {
		let client = RemoteCallClient::with_timeout(transport, config.request_timeout());
		let batcher = BatchAggregator::new(client, config.failure_policy, config.max_batch_size);
		Self {
			state: RwLock::new(RegistryState::default()),
			batcher,
			reload: ReloadSignal::new(),
			config,
		}
	}

	/// Configuration the registry was built with.
	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	/// Batcher shared by every handle.
	pub fn batcher(&self) -> &BatchAggregator {
		&self.batcher
	}

	/// Signal bumped after every successful data update of any handle.
	pub fn reload_signal(&self) -> &ReloadSignal {
		&self.reload
	}

	/// Current wallet binding.
	pub fn wallet(&self) -> WalletBinding {
		self.state.read().wallet.clone()
	}

	/// Replaces the wallet binding. Existing handles are not rebound until
	/// [`ContractRegistry::reinit_all`].
	pub fn set_wallet(&self, binding: WalletBinding) {
		self.state.write().wallet = binding;
	}

	/// Returns the handle for `address`, creating it on first use.
	///
	/// On creation the factory runs, the handle is bound to the current
	/// wallet binding, `options.after_init` runs and the configured initial
	/// loads are spawned. Later calls return the cached handle and ignore
	/// `factory` and `options`; use [`ContractRegistry::replace`] to
	/// reconfigure.
	pub fn get_or_create(&self, address: &Address, factory: ContractFactory, options: HandleOptions) -> ContractHandle {
		if let Some(handle) = self.get(address) {
			return handle;
		}

		let kind = factory(address);
		let candidate = ContractHandle::new(address.clone(), kind, self.batcher.clone());

		let handle = {
			let mut state = self.state.write();
			// Another caller may have inserted while the factory ran.
			if let Some(existing) = state.entries.get(address) {
				return existing.handle.clone();
			}
			// No listeners are attached yet, so binding emits to nobody.
			candidate.bind(state.wallet.account.clone(), state.wallet.endpoint.clone());
			let reload_listener = self.attach(&candidate);
			state.entries.insert(
				address.clone(),
				CachedEntry {
					factory,
					options: options.clone(),
					handle: candidate.clone(),
					reload_listener,
				},
			);
			candidate
		};

		info!(address = %address, contract = handle.kind().name(), "sync.registry.create");
		Self::start_init(&handle, &options);
		handle
	}

	fn attach(&self, handle: &ContractHandle) -> ListenerId {
		let reload = self.reload.clone();
		handle.on(EventKind::Data, move |_, _| {
			reload.bump();
		})
	}

	fn start_init(handle: &ContractHandle, options: &HandleOptions) {
		if let Some(hook) = &options.after_init {
			hook(handle);
		}
		for track in Self::init_tracks(handle, options) {
			let handle = handle.clone();
			task::spawn(TaskClass::Load, async move {
				if let Err(err) = handle.load(track).await {
					debug!(address = %handle.address(), track = track.as_str(), error = %err, "sync.registry.init_load_failed");
				}
			});
		}
	}

	fn init_tracks(handle: &ContractHandle, options: &HandleOptions) -> Vec<Track> {
		if handle.endpoint().is_none() {
			return Vec::new();
		}
		let mut tracks = Vec::with_capacity(2);
		if options.load_common {
			tracks.push(Track::Common);
		}
		if options.load_user && handle.account().is_some() {
			tracks.push(Track::User);
		}
		tracks
	}

	/// Cached handle for `address`.
	pub fn get(&self, address: &Address) -> Option<ContractHandle> {
		self.state.read().entries.get(address).map(|e| e.handle.clone())
	}

	/// Every cached handle, in creation order.
	pub fn list_all(&self) -> Vec<ContractHandle> {
		self.state.read().entries.values().map(|e| e.handle.clone()).collect()
	}

	/// Number of cached handles.
	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Returns true if no handle is cached.
	pub fn is_empty(&self) -> bool {
		self.state.read().entries.is_empty()
	}

	/// Evicts `address`. The returned handle keeps working but no longer
	/// drives the reload signal or follows wallet changes.
	pub fn remove(&self, address: &Address) -> Option<ContractHandle> {
		let entry = self.state.write().entries.shift_remove(address)?;
		entry.handle.off(EventKind::Data, entry.reload_listener);
		debug!(address = %address, "sync.registry.remove");
		Some(entry.handle)
	}

	/// Evicts `address` and creates a fresh handle with new factory and options.
	pub fn replace(&self, address: &Address, factory: ContractFactory, options: HandleOptions) -> ContractHandle {
		self.remove(address);
		self.get_or_create(address, factory, options)
	}

	/// Drops every cached handle. Returns how many were dropped.
	pub fn teardown(&self) -> usize {
		let entries = std::mem::take(&mut self.state.write().entries);
		for entry in entries.values() {
			entry.handle.off(EventKind::Data, entry.reload_listener);
		}
		info!(handles = entries.len(), "sync.registry.teardown");
		entries.len()
	}

	/// Factory the handle for `address` was built with.
	pub fn factory(&self, address: &Address) -> Option<ContractFactory> {
		self.state.read().entries.get(address).map(|e| Arc::clone(&e.factory))
	}

	/// Rebinds every handle to the current wallet binding, then re-runs every
	/// handle's init path and waits for the loads.
	///
	/// Every handle observes the new binding before any reload is issued.
	pub async fn reinit_all(&self) -> InitReport {
		let (entries, wallet) = {
			let state = self.state.read();
			let entries: Vec<(ContractHandle, HandleOptions)> = state
				.entries
				.values()
				.map(|e| (e.handle.clone(), e.options.clone()))
				.collect();
			(entries, state.wallet.clone())
		};

		for (handle, _) in &entries {
			handle.bind(wallet.account.clone(), wallet.endpoint.clone());
		}

		let mut pending = Vec::with_capacity(entries.len());
		for (handle, options) in &entries {
			if let Some(hook) = &options.after_init {
				hook(handle);
			}
			let mut loads = Vec::new();
			for track in Self::init_tracks(handle, options) {
				let h = handle.clone();
				loads.push((track, task::spawn(TaskClass::Load, async move { h.load(track).await })));
			}
			pending.push((handle.address().clone(), loads));
		}

		let mut report = InitReport::default();
		for (address, loads) in pending {
			let mut init = HandleInit {
				address,
				common: None,
				user: None,
			};
			for (track, join) in loads {
				let res = join.await.unwrap_or_else(|err| Err(Error::Aborted(format!("init load task failed: {err}"))));
				match track {
					Track::Common => init.common = Some(res),
					Track::User => init.user = Some(res),
				}
			}
			report.handles.push(init);
		}

		let failures = report.failures();
		if failures > 0 {
			warn!(handles = report.handles.len(), failures, "sync.registry.reinit");
		} else {
			debug!(handles = report.handles.len(), "sync.registry.reinit");
		}
		report
	}
}
