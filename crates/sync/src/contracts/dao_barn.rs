use std::time::{SystemTime, UNIX_EPOCH};

use quorum_rpc::{Address, JsonValue, Result, TransactionReceipt, U256, WriteOptions, decode};

use super::{ContractKind, ReadSpec, address_arg, into_uint, uint_arg};
use crate::handle::ContractHandle;
use crate::registry::ContractFactory;

/// Staking contract: bonds, voting power, locks and delegation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaoBarn;

/// Typed view over a barn handle's cached fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaoBarnData {
	/// Total bond staked in the barn, base units.
	pub bond_staked: Option<U256>,
	/// Bond staked by the bound account.
	pub balance: Option<U256>,
	/// Voting power of the bound account, delegations included.
	pub voting_power: Option<U256>,
	/// Lock multiplier of the bound account at load time, scaled by 10^18.
	pub multiplier: Option<U256>,
	/// Unix seconds until which the account's stake is locked.
	pub user_locked_until: Option<u64>,
	/// Power delegated to the bound account.
	pub delegated_power: Option<U256>,
	/// Account the bound account delegates to.
	pub user_delegated_to: Option<Address>,
}

impl DaoBarnData {
	/// Whether the account's stake is still locked at `now` (unix seconds).
	pub fn is_user_locked(&self, now: u64) -> Option<bool> {
		self.user_locked_until.map(|until| until > now)
	}
}

fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or_default()
}

impl DaoBarn {
	/// Field key of the total bond staked.
	pub const BOND_STAKED: &'static str = "bond_staked";
	/// Field key of the account's staked balance.
	pub const BALANCE: &'static str = "balance";
	/// Field key of the account's voting power.
	pub const VOTING_POWER: &'static str = "voting_power";
	/// Field key of the account's current lock multiplier.
	pub const MULTIPLIER: &'static str = "multiplier";
	/// Field key of the account's lock expiry.
	pub const USER_LOCKED_UNTIL: &'static str = "user_locked_until";
	/// Field key of the power delegated to the account.
	pub const DELEGATED_POWER: &'static str = "delegated_power";
	/// Field key of the account's delegate.
	pub const USER_DELEGATED_TO: &'static str = "user_delegated_to";

	/// Registry factory for barn handles.
	pub fn factory() -> ContractFactory {
		super::factory::<Self>()
	}

	/// Reads the cached fields of `handle`.
	pub fn data(handle: &ContractHandle) -> DaoBarnData {
		DaoBarnData {
			bond_staked: handle.uint(Self::BOND_STAKED),
			balance: handle.uint(Self::BALANCE),
			voting_power: handle.uint(Self::VOTING_POWER),
			multiplier: handle.uint(Self::MULTIPLIER),
			user_locked_until: handle.timestamp(Self::USER_LOCKED_UNTIL),
			delegated_power: handle.uint(Self::DELEGATED_POWER),
			user_delegated_to: handle.address_field(Self::USER_DELEGATED_TO),
		}
	}

	/// Total bond staked at `ts`.
	pub async fn bond_staked_at(handle: &ContractHandle, ts: u64) -> Result<U256> {
		let value = handle.call("bondStakedAtTs", vec![JsonValue::from(ts)], decode::uint).await?;
		into_uint("bondStakedAtTs", value)
	}

	/// Voting power of `account` at `ts`.
	pub async fn voting_power_at(handle: &ContractHandle, account: &Address, ts: u64) -> Result<U256> {
		let value = handle
			.call("votingPowerAtTs", vec![address_arg(account), JsonValue::from(ts)], decode::uint)
			.await?;
		into_uint("votingPowerAtTs", value)
	}

	/// Lock multiplier of `account` at `ts`, scaled by 10^18.
	pub async fn multiplier_at(handle: &ContractHandle, account: &Address, ts: u64) -> Result<U256> {
		let value = handle
			.call("multiplierAtTs", vec![address_arg(account), JsonValue::from(ts)], decode::uint)
			.await?;
		into_uint("multiplierAtTs", value)
	}

	/// Stakes `amount` base units of bond.
	pub async fn deposit(handle: &ContractHandle, amount: U256, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("deposit", vec![uint_arg(amount)], options).await
	}

	/// Unstakes `amount` base units of bond.
	pub async fn withdraw(handle: &ContractHandle, amount: U256, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("withdraw", vec![uint_arg(amount)], options).await
	}

	/// Delegates the account's voting power to `to`.
	pub async fn delegate(handle: &ContractHandle, to: &Address, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("delegate", vec![address_arg(to)], options).await
	}

	/// Revokes the current delegation.
	pub async fn stop_delegate(handle: &ContractHandle, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("stopDelegate", Vec::new(), options).await
	}

	/// Locks the account's stake until `until` (unix seconds).
	pub async fn lock(handle: &ContractHandle, until: u64, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("lock", vec![JsonValue::from(until)], options).await
	}
}

impl ContractKind for DaoBarn {
	fn name(&self) -> &'static str {
		"DAO Barn"
	}

	fn common_reads(&self) -> Vec<ReadSpec> {
		vec![ReadSpec::new(Self::BOND_STAKED, "bondStaked", decode::uint)]
	}

	fn user_reads(&self, account: &Address) -> Vec<ReadSpec> {
		let who = vec![address_arg(account)];
		vec![
			ReadSpec::new(Self::BALANCE, "balanceOf", decode::uint).with_args(who.clone()),
			ReadSpec::new(Self::VOTING_POWER, "votingPower", decode::uint).with_args(who.clone()),
			ReadSpec::new(Self::MULTIPLIER, "multiplierAtTs", decode::uint)
				.with_args(vec![address_arg(account), JsonValue::from(unix_now())]),
			ReadSpec::new(Self::USER_LOCKED_UNTIL, "userLockedUntil", decode::timestamp).with_args(who.clone()),
			ReadSpec::new(Self::DELEGATED_POWER, "delegatedPower", decode::uint).with_args(who.clone()),
			ReadSpec::new(Self::USER_DELEGATED_TO, "userDelegatedTo", decode::address).with_args(who),
		]
	}

	fn user_fields(&self) -> &'static [&'static str] {
		&[
			Self::BALANCE,
			Self::VOTING_POWER,
			Self::MULTIPLIER,
			Self::USER_LOCKED_UNTIL,
			Self::DELEGATED_POWER,
			Self::USER_DELEGATED_TO,
		]
	}
}
