//! Debounced replay of wallet and network changes.
//!
//! Wallet providers tend to fire several account/network notifications in
//! quick succession (connect, chain switch, account list refresh). The
//! reconciler collapses each burst into one pass: every new signal pushes
//! the deadline out by the debounce window, the latest account and endpoint
//! win, and once the burst settles the registry is rebound and reinitialized.
//!
//! Deadlines use the tokio clock, so tests drive them with paused time.

use std::sync::Arc;

use quorum_rpc::{Address, Endpoint};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::registry::ContractRegistry;
use crate::task::{self, TaskClass};

/// A change reported by the wallet/network provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletSignal {
	/// The connected account changed (or disconnected).
	AccountChanged(Option<Address>),
	/// The network endpoint changed (or went away).
	EndpointChanged(Option<Endpoint>),
}

/// Changes accumulated during one burst. `None` means "not touched".
#[derive(Debug, Default)]
struct PendingChange {
	account: Option<Option<Address>>,
	endpoint: Option<Option<Endpoint>>,
	signals: usize,
}

impl PendingChange {
	fn absorb(&mut self, signal: WalletSignal) {
		self.signals += 1;
		match signal {
			WalletSignal::AccountChanged(account) => self.account = Some(account),
			WalletSignal::EndpointChanged(endpoint) => self.endpoint = Some(endpoint),
		}
	}
}

/// Background task that debounces [`WalletSignal`]s and reconciles the
/// registry once per settled burst.
pub struct WalletChangeReconciler {
	tx: mpsc::UnboundedSender<WalletSignal>,
	passes: watch::Receiver<u64>,
	task: JoinHandle<()>,
}

impl std::fmt::Debug for WalletChangeReconciler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WalletChangeReconciler")
			.field("passes", &*self.passes.borrow())
			.field("finished", &self.task.is_finished())
			.finish()
	}
}

impl WalletChangeReconciler {
	/// Spawns the reconciler with the registry's configured debounce window.
	pub fn spawn(registry: Arc<ContractRegistry>) -> Self {
		let debounce = registry.config().debounce();
		Self::with_debounce(registry, debounce)
	}

	/// Spawns the reconciler with an explicit debounce window.
	pub fn with_debounce(registry: Arc<ContractRegistry>, debounce: Duration) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let (passes_tx, passes) = watch::channel(0);
		let task = task::spawn(TaskClass::Reconcile, run(registry, rx, debounce, passes_tx));
		Self { tx, passes, task }
	}

	/// Sender for providers that report changes from elsewhere.
	pub fn sender(&self) -> mpsc::UnboundedSender<WalletSignal> {
		self.tx.clone()
	}

	/// Queues a signal. Returns false if the reconciler has stopped.
	pub fn signal(&self, signal: WalletSignal) -> bool {
		self.tx.send(signal).is_ok()
	}

	/// Queues an account change.
	pub fn account_changed(&self, account: Option<Address>) -> bool {
		self.signal(WalletSignal::AccountChanged(account))
	}

	/// Queues an endpoint change.
	pub fn endpoint_changed(&self, endpoint: Option<Endpoint>) -> bool {
		self.signal(WalletSignal::EndpointChanged(endpoint))
	}

	/// Number of completed reconciliation passes.
	pub fn pass_count(&self) -> u64 {
		*self.passes.borrow()
	}

	/// Receiver updated after every completed pass.
	pub fn passes(&self) -> watch::Receiver<u64> {
		self.passes.clone()
	}

	/// Stops the task. A burst still inside its debounce window is dropped.
	pub fn shutdown(self) {
		self.task.abort();
	}
}

async fn run(
	registry: Arc<ContractRegistry>,
	mut rx: mpsc::UnboundedReceiver<WalletSignal>,
	debounce: Duration,
	passes: watch::Sender<u64>,
) {
	let mut pending: Option<(PendingChange, Instant)> = None;

	loop {
		let deadline = pending.as_ref().map(|(_, at)| *at);
		tokio::select! {
			msg = rx.recv() => match msg {
				Some(signal) => {
					trace!(?signal, "sync.reconcile.signal");
					let (change, at) = pending.get_or_insert_with(|| (PendingChange::default(), Instant::now()));
					change.absorb(signal);
					*at = Instant::now() + debounce;
				}
				None => {
					if let Some((change, _)) = pending.take() {
						reconcile(&registry, change, &passes).await;
					}
					break;
				}
			},
			_ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
				if let Some((change, _)) = pending.take() {
					reconcile(&registry, change, &passes).await;
				}
			}
		}
	}
	debug!("sync.reconcile.stopped");
}

async fn reconcile(registry: &ContractRegistry, change: PendingChange, passes: &watch::Sender<u64>) {
	let mut binding = registry.wallet();
	if let Some(account) = change.account {
		binding.account = account;
	}
	if let Some(endpoint) = change.endpoint {
		binding.endpoint = endpoint;
	}
	info!(
		signals = change.signals,
		account = ?binding.account,
		endpoint = ?binding.endpoint,
		"sync.reconcile.pass"
	);
	registry.set_wallet(binding);

	let report = registry.reinit_all().await;
	passes.send_modify(|n| *n += 1);
	debug!(handles = report.handles.len(), failures = report.failures(), "sync.reconcile.done");
}

#[cfg(test)]
mod tests {
	use quorum_rpc::mock::MockTransport;
	use serde_json::json;

	use super::*;
	use crate::contracts::DaoBarn;
	use crate::handle::LoadStatus;
	use crate::registry::HandleOptions;
	use crate::test_support::{addr, init_tracing, mainnet, registry_with, testnet};
	use crate::SyncConfig;

	async fn settle() {
		for _ in 0..16 {
			tokio::task::yield_now().await;
		}
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn burst_of_endpoint_changes_yields_one_pass() {
		init_tracing();
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xbarn"), "bondStaked", json!("1000"));
		let registry = registry_with(&transport, SyncConfig::default());
		let barn = registry.get_or_create(&addr("0xbarn"), DaoBarn::factory(), HandleOptions::common_only());
		settle().await;
		let baseline = transport.round_trip_count();

		let reconciler = WalletChangeReconciler::spawn(registry.clone());
		for _ in 0..5 {
			reconciler.endpoint_changed(Some(testnet()));
			tokio::time::advance(Duration::from_millis(20)).await;
		}
		settle().await;
		assert_eq!(reconciler.pass_count(), 0, "still inside the debounce window");

		tokio::time::advance(Duration::from_millis(260)).await;
		let mut passes = reconciler.passes();
		passes.wait_for(|n| *n >= 1).await.unwrap();
		settle().await;

		assert_eq!(reconciler.pass_count(), 1);
		assert_eq!(barn.endpoint(), Some(testnet()));
		assert_eq!(barn.common_status(), LoadStatus::Ready);
		assert_eq!(transport.round_trip_count(), baseline + 1);
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn latest_account_wins_within_a_burst() {
		let transport = Arc::new(MockTransport::new());
		let registry = registry_with(&transport, SyncConfig::default());
		let barn = registry.get_or_create(&addr("0xbarn"), DaoBarn::factory(), HandleOptions::default());

		let reconciler = WalletChangeReconciler::spawn(registry.clone());
		reconciler.account_changed(Some(addr("0xuser1")));
		reconciler.account_changed(Some(addr("0xuser2")));
		tokio::time::advance(Duration::from_millis(300)).await;
		reconciler.passes().wait_for(|n| *n == 1).await.unwrap();

		assert_eq!(registry.wallet().account, Some(addr("0xuser2")));
		assert_eq!(registry.wallet().endpoint, Some(mainnet()));
		assert_eq!(barn.account(), Some(addr("0xuser2")));
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn separated_bursts_yield_separate_passes() {
		let transport = Arc::new(MockTransport::new());
		let registry = registry_with(&transport, SyncConfig::default());
		let reconciler = WalletChangeReconciler::spawn(registry);

		reconciler.account_changed(Some(addr("0xuser1")));
		tokio::time::advance(Duration::from_millis(300)).await;
		reconciler.passes().wait_for(|n| *n == 1).await.unwrap();

		reconciler.account_changed(None);
		tokio::time::advance(Duration::from_millis(300)).await;
		reconciler.passes().wait_for(|n| *n == 2).await.unwrap();
		assert_eq!(reconciler.pass_count(), 2);
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn closing_the_channel_flushes_pending_burst() {
		let transport = Arc::new(MockTransport::new());
		let registry = registry_with(&transport, SyncConfig::default());
		let reconciler = WalletChangeReconciler::spawn(registry.clone());
		let mut passes = reconciler.passes();

		let WalletChangeReconciler { tx, task, .. } = reconciler;
		tx.send(WalletSignal::AccountChanged(Some(addr("0xuser1")))).unwrap();
		drop(tx);
		task.await.unwrap();

		passes.wait_for(|n| *n == 1).await.unwrap();
		assert_eq!(registry.wallet().account, Some(addr("0xuser1")));
	}
}
