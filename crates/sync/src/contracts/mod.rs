//! Contract definitions for the governance dashboard.
//!
//! A [`ContractKind`] only names methods and decode shapes; ABI encoding
//! stays with the transport. Typed views and write helpers are associated
//! functions on each kind that operate on a [`ContractHandle`](crate::ContractHandle).

mod dao_barn;
mod dao_governance;
mod erc20;

use std::sync::Arc;

use quorum_rpc::decode::Transform;
use quorum_rpc::{Address, Error, FieldValue, JsonValue, Result, U256};

pub use self::dao_barn::{DaoBarn, DaoBarnData};
pub use self::dao_governance::{AbrogationProposal, DaoGovernance, ProposalPayload, ProposalReceipt, ProposalState};
pub use self::erc20::{Erc20, Erc20Data};
use crate::batch::PendingRead;
use crate::registry::ContractFactory;

/// One cached field and the read that fills it.
#[derive(Debug, Clone)]
pub struct ReadSpec {
	/// Key the result is stored under in the handle's field bag.
	pub field: &'static str,
	/// Method selector name.
	pub method: &'static str,
	/// Encoded arguments.
	pub args: Vec<JsonValue>,
	/// Decode step for the raw result.
	pub transform: Transform,
}

impl ReadSpec {
	/// Read of `method` with no arguments, stored as `field`.
	pub fn new(field: &'static str, method: &'static str, transform: Transform) -> Self {
		Self {
			field,
			method,
			args: Vec::new(),
			transform,
		}
	}

	/// Sets the call arguments.
	pub fn with_args(mut self, args: Vec<JsonValue>) -> Self {
		self.args = args;
		self
	}

	pub(crate) fn into_pending(self, address: &Address) -> PendingRead {
		PendingRead::new(address.clone(), self.method, self.args, self.transform)
	}
}

/// Shape of one contract type.
pub trait ContractKind: Send + Sync + 'static {
	/// Human-readable contract name, used in logs.
	fn name(&self) -> &'static str;

	/// Account-independent reads.
	fn common_reads(&self) -> Vec<ReadSpec>;

	/// Reads scoped to `account`.
	fn user_reads(&self, _account: &Address) -> Vec<ReadSpec> {
		Vec::new()
	}

	/// Fields produced by [`ContractKind::user_reads`]; cleared whenever the
	/// bound account changes.
	fn user_fields(&self) -> &'static [&'static str] {
		&[]
	}
}

/// Factory building a `K` for any address.
pub fn factory<K: ContractKind + Default>() -> ContractFactory {
	Arc::new(|_: &Address| Arc::new(K::default()) as Arc<dyn ContractKind>)
}

/// Integer arguments travel as decimal strings so `uint256` amounts survive JSON.
pub(crate) fn uint_arg(value: U256) -> JsonValue {
	JsonValue::String(value.to_string())
}

pub(crate) fn address_arg(address: &Address) -> JsonValue {
	JsonValue::String(address.to_string())
}

pub(crate) fn into_uint(method: &str, value: FieldValue) -> Result<U256> {
	value
		.as_uint()
		.ok_or_else(|| Error::Decode(format!("{method}: expected unsigned integer, got {value:?}")))
}

/// Narrows ids and enum ordinals, which the contracts declare as `uint256`.
pub(crate) fn into_u64(method: &str, value: FieldValue) -> Result<u64> {
	let wide = into_uint(method, value)?;
	if wide.bits() > 64 {
		return Err(Error::Decode(format!("{method}: {wide} does not fit in u64")));
	}
	Ok(wide.low_u64())
}
