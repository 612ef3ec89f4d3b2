use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Address, U256};

/// One read or write against a contract method.
///
/// Arguments are already encoded into the transport's value representation;
/// ABI details stay with the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
	/// Target contract.
	pub address: Address,
	/// Method selector name, e.g. `balanceOf`.
	pub method: String,
	/// Encoded arguments, in declaration order.
	#[serde(default)]
	pub args: Vec<Value>,
}

impl CallRequest {
	/// Creates a call request.
	pub fn new(address: Address, method: impl Into<String>, args: Vec<Value>) -> Self {
		Self {
			address,
			method: method.into(),
			args,
		}
	}
}

/// Options attached to a state-changing call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
	/// Gas price in gwei; `None` lets the provider choose.
	#[serde(default)]
	pub gas_price: Option<u64>,
	/// Native value attached to the call, in base units.
	#[serde(default)]
	pub value: Option<U256>,
}

impl WriteOptions {
	/// Options with an explicit gas price.
	pub fn with_gas_price(gas_price: u64) -> Self {
		Self {
			gas_price: Some(gas_price),
			value: None,
		}
	}
}

/// Outcome of a confirmed state-changing call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// Transaction hash.
	pub tx_hash: String,
	/// Block the transaction was included in, if known.
	#[serde(default)]
	pub block_number: Option<u64>,
	/// Whether execution succeeded.
	pub status: bool,
	/// Decoded event logs keyed by event name.
	#[serde(default)]
	pub events: BTreeMap<String, Value>,
}

impl TransactionReceipt {
	/// Returns the decoded payload of a named event, if it was emitted.
	pub fn event(&self, name: &str) -> Option<&Value> {
		self.events.get(name)
	}
}
