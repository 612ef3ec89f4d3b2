use quorum_rpc::{Address, Result, TransactionReceipt, U256, WriteOptions, decode};

use super::{ContractKind, ReadSpec, address_arg, into_uint, uint_arg};
use crate::handle::ContractHandle;
use crate::registry::ContractFactory;

/// Fungible token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Erc20;

/// Typed view over a token handle's cached fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Erc20Data {
	/// Ticker symbol.
	pub symbol: Option<String>,
	/// Decimal places of the base unit.
	pub decimals: Option<u8>,
	/// Total supply, base units.
	pub total_supply: Option<U256>,
	/// Balance of the bound account, base units.
	pub balance: Option<U256>,
}

impl Erc20 {
	/// Field key of the ticker symbol.
	pub const SYMBOL: &'static str = "symbol";
	/// Field key of the decimals.
	pub const DECIMALS: &'static str = "decimals";
	/// Field key of the total supply.
	pub const TOTAL_SUPPLY: &'static str = "total_supply";
	/// Field key of the account balance.
	pub const BALANCE: &'static str = "balance";

	/// Registry factory for token handles.
	pub fn factory() -> ContractFactory {
		super::factory::<Self>()
	}

	/// Reads the cached fields of `handle`.
	pub fn data(handle: &ContractHandle) -> Erc20Data {
		Erc20Data {
			symbol: handle.text(Self::SYMBOL),
			decimals: handle
				.field(Self::DECIMALS)
				.and_then(|v| v.as_u64())
				.and_then(|d| u8::try_from(d).ok()),
			total_supply: handle.uint(Self::TOTAL_SUPPLY),
			balance: handle.uint(Self::BALANCE),
		}
	}

	/// Amount `spender` may move on behalf of `owner`. An unlimited approval
	/// reads back as [`U256::MAX`].
	pub async fn allowance(handle: &ContractHandle, owner: &Address, spender: &Address) -> Result<U256> {
		let value = handle
			.call("allowance", vec![address_arg(owner), address_arg(spender)], decode::uint)
			.await?;
		into_uint("allowance", value)
	}

	/// Allows `spender` to move up to `amount` base units; pass [`U256::MAX`]
	/// for an unlimited approval.
	pub async fn approve(handle: &ContractHandle, spender: &Address, amount: U256, options: &WriteOptions) -> Result<TransactionReceipt> {
		handle.send("approve", vec![address_arg(spender), uint_arg(amount)], options).await
	}
}

impl ContractKind for Erc20 {
	fn name(&self) -> &'static str {
		"ERC20"
	}

	fn common_reads(&self) -> Vec<ReadSpec> {
		vec![
			ReadSpec::new(Self::SYMBOL, "symbol", decode::text),
			ReadSpec::new(Self::DECIMALS, "decimals", decode::uint),
			ReadSpec::new(Self::TOTAL_SUPPLY, "totalSupply", decode::uint),
		]
	}

	fn user_reads(&self, account: &Address) -> Vec<ReadSpec> {
		vec![ReadSpec::new(Self::BALANCE, "balanceOf", decode::uint).with_args(vec![address_arg(account)])]
	}

	fn user_fields(&self) -> &'static [&'static str] {
		&[Self::BALANCE]
	}
}
