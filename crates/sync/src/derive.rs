//! Values derived from several handles.
//!
//! These do not subscribe to individual handles; they recompute whenever the
//! registry's [`ReloadSignal`] moves.

use quorum_rpc::U256;
use tokio::sync::watch;

use crate::contracts::{DaoBarn, DaoGovernance};
use crate::handle::ContractHandle;
use crate::reload::{ReloadSignal, Subscription};

const ACTIVATION_THRESHOLD_UNITS: u128 = 400_000 * 10u128.pow(18);

/// Bond that must be staked before governance can be activated, base units
/// (400 000 BOND at 18 decimals).
pub const DEFAULT_ACTIVATION_THRESHOLD: U256 = U256([
	ACTIVATION_THRESHOLD_UNITS as u64,
	(ACTIVATION_THRESHOLD_UNITS >> 64) as u64,
	0,
	0,
]);

/// Minimum share of staked bond, in percent, an account needs to propose.
pub const DEFAULT_MIN_THRESHOLD: f64 = 1.0;

fn lossy_f64(value: U256) -> f64 {
	value.0.iter().rev().fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

fn capped_percent(part: U256, whole: U256) -> Option<f64> {
	if whole.is_zero() {
		return None;
	}
	Some((lossy_f64(part) * 100.0 / lossy_f64(whole)).min(100.0))
}

/// Progress towards activation, in percent, capped at 100.
///
/// `None` while either input is unknown or the threshold is zero.
pub fn activation_rate(bond_staked: Option<U256>, threshold: Option<U256>) -> Option<f64> {
	capped_percent(bond_staked?, threshold?)
}

/// Account voting power as a share of all staked bond, in percent, capped at 100.
///
/// `None` while either input is unknown or nothing is staked.
pub fn threshold_rate(voting_power: Option<U256>, bond_staked: Option<U256>) -> Option<f64> {
	capped_percent(voting_power?, bond_staked?)
}

/// Governance overview shown on the dashboard header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaoOverview {
	/// Whether governance has been activated.
	pub is_active: Option<bool>,
	/// Total bond staked.
	pub bond_staked: Option<U256>,
	/// Activation threshold the rate was computed against.
	pub activation_threshold: U256,
	/// See [`activation_rate`].
	pub activation_rate: Option<f64>,
	/// See [`threshold_rate`].
	pub threshold_rate: Option<f64>,
}

impl DaoOverview {
	/// Computes the overview from the current handle fields.
	pub fn compute(barn: &ContractHandle, governance: &ContractHandle, activation_threshold: U256) -> Self {
		let barn_data = DaoBarn::data(barn);
		Self {
			is_active: DaoGovernance::is_active(governance),
			bond_staked: barn_data.bond_staked,
			activation_threshold,
			activation_rate: activation_rate(barn_data.bond_staked, Some(activation_threshold)),
			threshold_rate: threshold_rate(barn_data.voting_power, barn_data.bond_staked),
		}
	}

	/// Whether the account may create proposals. `None` while unknown.
	pub fn has_threshold(&self, min_threshold: f64) -> Option<bool> {
		self.threshold_rate.map(|rate| rate >= min_threshold)
	}
}

/// [`DaoOverview`] kept current by the reload signal.
pub struct LiveOverview {
	rx: watch::Receiver<DaoOverview>,
	_subscription: Subscription,
}

impl LiveOverview {
	/// Computes the overview now and again after every bump of `signal`.
	pub fn new(signal: &ReloadSignal, barn: ContractHandle, governance: ContractHandle, activation_threshold: U256) -> Self {
		let (tx, rx) = watch::channel(DaoOverview::compute(&barn, &governance, activation_threshold));
		let subscription = signal.subscribe(move |version| {
			let next = DaoOverview::compute(&barn, &governance, activation_threshold);
			tx.send_if_modified(|current| {
				if *current == next {
					return false;
				}
				tracing::trace!(version, "sync.derive.overview");
				*current = next;
				true
			});
		});
		Self {
			rx,
			_subscription: subscription,
		}
	}

	/// Latest computed overview.
	pub fn current(&self) -> DaoOverview {
		self.rx.borrow().clone()
	}

	/// Receiver notified whenever the overview changes.
	pub fn watch(&self) -> watch::Receiver<DaoOverview> {
		self.rx.clone()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use pretty_assertions::assert_eq;
	use quorum_rpc::mock::MockTransport;
	use serde_json::json;

	use super::*;
	use crate::registry::{HandleOptions, WalletBinding};
	use crate::test_support::{addr, mainnet, registry_with};
	use crate::SyncConfig;

	#[test]
	fn activation_rate_is_capped_and_needs_inputs() {
		let n = |v: u64| Some(U256::from(v));
		assert_eq!(activation_rate(n(200), n(400)), Some(50.0));
		assert_eq!(activation_rate(n(900), n(400)), Some(100.0));
		assert_eq!(activation_rate(None, n(400)), None);
		assert_eq!(activation_rate(n(1), n(0)), None);
		assert_eq!(
			activation_rate(Some(U256::from(200_000u64) * U256::exp10(18)), Some(DEFAULT_ACTIVATION_THRESHOLD)),
			Some(50.0)
		);
	}

	#[test]
	fn threshold_rate_and_has_threshold() {
		assert_eq!(threshold_rate(Some(U256::from(5)), Some(U256::from(1000))), Some(0.5));
		assert_eq!(threshold_rate(Some(U256::from(5)), Some(U256::zero())), None);
		assert_eq!(threshold_rate(Some(U256::MAX), Some(U256::MAX)), Some(100.0));

		let below = DaoOverview {
			threshold_rate: Some(0.5),
			..Default::default()
		};
		assert_eq!(below.has_threshold(DEFAULT_MIN_THRESHOLD), Some(false));
		let above = DaoOverview {
			threshold_rate: Some(1.0),
			..Default::default()
		};
		assert_eq!(above.has_threshold(DEFAULT_MIN_THRESHOLD), Some(true));
		assert_eq!(DaoOverview::default().has_threshold(DEFAULT_MIN_THRESHOLD), None);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn live_overview_follows_reloads() {
		let transport = Arc::new(MockTransport::new());
		transport.respond(&addr("0xbarn"), "bondStaked", json!("200000"));
		transport.respond(&addr("0xbarn"), "balanceOf", json!("0"));
		transport.respond(&addr("0xbarn"), "votingPower", json!("4000"));
		transport.respond(&addr("0xbarn"), "multiplierAtTs", json!("1000000000000000000"));
		transport.respond(&addr("0xbarn"), "userLockedUntil", json!(0));
		transport.respond(&addr("0xbarn"), "delegatedPower", json!("0"));
		transport.respond(&addr("0xbarn"), "userDelegatedTo", json!("0x0"));
		transport.respond(&addr("0xgov"), "isActive", json!(false));

		let registry = registry_with(&transport, SyncConfig::default());
		registry.set_wallet(WalletBinding {
			account: Some(addr("0xuser")),
			endpoint: Some(mainnet()),
		});
		let barn = registry.get_or_create(&addr("0xbarn"), DaoBarn::factory(), HandleOptions::default());
		let governance = registry.get_or_create(&addr("0xgov"), DaoGovernance::factory(), HandleOptions::default());

		let live = LiveOverview::new(registry.reload_signal(), barn.clone(), governance.clone(), U256::from(400_000));
		assert_eq!(live.current().activation_rate, None);

		barn.load_common_data().await.unwrap();
		barn.load_user_data().await.unwrap();
		governance.load_common_data().await.unwrap();

		let overview = live.current();
		assert_eq!(overview.is_active, Some(false));
		assert_eq!(overview.bond_staked, Some(U256::from(200_000)));
		assert_eq!(overview.activation_rate, Some(50.0));
		assert_eq!(overview.threshold_rate, Some(2.0));
		assert_eq!(overview.has_threshold(DEFAULT_MIN_THRESHOLD), Some(true));
	}
}
