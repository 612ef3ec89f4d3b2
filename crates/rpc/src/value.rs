use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::Address;

/// Typed value decoded from a contract read.
///
/// A field that never resolved is represented by its absence from the field
/// bag, never by a default `FieldValue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
	/// Unsigned integer, full `uint256` range (token amounts in base units,
	/// counters, ids).
	Uint(U256),
	/// Signed integer.
	Int(i128),
	/// Boolean flag.
	Bool(bool),
	/// Contract or account address.
	Address(Address),
	/// UTF-8 string.
	Text(String),
	/// Unix timestamp in seconds.
	Timestamp(u64),
	/// Tuple or array output.
	List(Vec<FieldValue>),
}

impl FieldValue {
	/// Returns the unsigned integer, if this is one.
	pub fn as_uint(&self) -> Option<U256> {
		match self {
			Self::Uint(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the unsigned integer if it fits in a `u64`.
	pub fn as_u64(&self) -> Option<u64> {
		self.as_uint().filter(|v| v.bits() <= 64).map(|v| v.low_u64())
	}

	/// Returns the signed integer, if this is one.
	pub fn as_int(&self) -> Option<i128> {
		match self {
			Self::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the flag, if this is one.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the address, if this is one.
	pub fn as_address(&self) -> Option<&Address> {
		match self {
			Self::Address(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the string, if this is one.
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Text(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the timestamp in seconds, if this is one.
	pub fn as_timestamp(&self) -> Option<u64> {
		match self {
			Self::Timestamp(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the tuple items, if this is a list.
	pub fn as_list(&self) -> Option<&[FieldValue]> {
		match self {
			Self::List(v) => Some(v),
			_ => None,
		}
	}
}
