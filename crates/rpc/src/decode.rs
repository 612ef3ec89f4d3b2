//! Pure transforms from raw transport values to [`FieldValue`]s.
//!
//! Every function here has the shape `fn(Value) -> Result<FieldValue>` so it
//! can be stored as a plain function pointer in a pending read. Integers are
//! accepted as JSON numbers, decimal strings or `0x`-prefixed hex strings,
//! which covers what common providers return for `uint256` outputs.

use primitive_types::U256;
use serde_json::Value;

use crate::{Address, Error, FieldValue, Result};

/// A pure transform applied to one decoded sub-result.
pub type Transform = fn(Value) -> Result<FieldValue>;

fn mismatch(expected: &str, value: &Value) -> Error {
	Error::Decode(format!("expected {expected}, got {value}"))
}

fn parse_uint(value: &Value) -> Result<U256> {
	match value {
		Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(|| mismatch("unsigned integer", value)),
		Value::String(s) => {
			let s = s.trim();
			let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
				Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16).ok(),
				Some(_) => None,
				None if !s.is_empty() => U256::from_dec_str(s).ok(),
				None => None,
			};
			parsed.ok_or_else(|| mismatch("unsigned integer", value))
		}
		_ => Err(mismatch("unsigned integer", value)),
	}
}

/// Decodes an unsigned integer.
pub fn uint(value: Value) -> Result<FieldValue> {
	parse_uint(&value).map(FieldValue::Uint)
}

/// Decodes a signed integer.
pub fn int(value: Value) -> Result<FieldValue> {
	let parsed = match &value {
		Value::Number(n) => n.as_i64().map(i128::from),
		Value::String(s) => s.trim().parse::<i128>().ok(),
		_ => None,
	};
	parsed.map(FieldValue::Int).ok_or_else(|| mismatch("signed integer", &value))
}

/// Decodes a boolean; `0`/`1` integers are accepted.
pub fn boolean(value: Value) -> Result<FieldValue> {
	match &value {
		Value::Bool(b) => Ok(FieldValue::Bool(*b)),
		Value::Number(_) | Value::String(_) => match parse_uint(&value) {
			Ok(bit) if bit.is_zero() => Ok(FieldValue::Bool(false)),
			Ok(bit) if bit == U256::one() => Ok(FieldValue::Bool(true)),
			_ => Err(mismatch("boolean", &value)),
		},
		_ => Err(mismatch("boolean", &value)),
	}
}

/// Decodes an address.
pub fn address(value: Value) -> Result<FieldValue> {
	match &value {
		Value::String(s) => Address::parse(s)
			.map(FieldValue::Address)
			.map_err(|_| mismatch("address", &value)),
		_ => Err(mismatch("address", &value)),
	}
}

/// Decodes a string.
pub fn text(value: Value) -> Result<FieldValue> {
	match value {
		Value::String(s) => Ok(FieldValue::Text(s)),
		other => Err(mismatch("string", &other)),
	}
}

/// Decodes a unix timestamp in seconds.
pub fn timestamp(value: Value) -> Result<FieldValue> {
	let secs = parse_uint(&value)?;
	if secs.bits() > 64 {
		return Err(mismatch("timestamp", &value));
	}
	Ok(FieldValue::Timestamp(secs.low_u64()))
}

/// Decodes an array of unsigned integers (e.g. `(uint256, uint256)` outputs).
pub fn uint_list(value: Value) -> Result<FieldValue> {
	match value {
		Value::Array(items) => items.into_iter().map(uint).collect::<Result<Vec<_>>>().map(FieldValue::List),
		other => Err(mismatch("array", &other)),
	}
}

/// Splits a tuple output into exactly `N` raw items.
pub fn tuple<const N: usize>(value: Value) -> Result<[Value; N]> {
	match value {
		Value::Array(items) => {
			let len = items.len();
			<[Value; N]>::try_from(items).map_err(|_| Error::Decode(format!("expected tuple of {N}, got {len} items")))
		}
		other => Err(mismatch("tuple", &other)),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn uint_accepts_number_decimal_and_hex() {
		assert_eq!(uint(json!(1000)).unwrap(), FieldValue::Uint(U256::from(1000)));
		assert_eq!(
			uint(json!("400000000000000000000000")).unwrap(),
			FieldValue::Uint(U256::from(400_000_000_000_000_000_000_000u128))
		);
		assert_eq!(uint(json!("0x3e8")).unwrap(), FieldValue::Uint(U256::from(1000)));
	}

	#[test]
	fn uint_covers_the_full_256_bit_range() {
		let max_hex = format!("0x{}", "f".repeat(64));
		assert_eq!(uint(json!(max_hex)).unwrap(), FieldValue::Uint(U256::MAX));
		assert_eq!(uint(json!(U256::MAX.to_string())).unwrap(), FieldValue::Uint(U256::MAX));

		let too_wide = format!("0x1{}", "0".repeat(64));
		assert!(matches!(uint(json!(too_wide)), Err(Error::Decode(_))));
		assert!(matches!(uint(json!("0x")), Err(Error::Decode(_))));
	}

	#[test]
	fn timestamp_rejects_values_beyond_u64() {
		assert_eq!(timestamp(json!("1700000000")).unwrap(), FieldValue::Timestamp(1_700_000_000));
		assert!(matches!(timestamp(json!(u128::MAX.to_string())), Err(Error::Decode(_))));
	}

	#[test]
	fn uint_rejects_negative_and_garbage() {
		assert!(matches!(uint(json!(-1)), Err(Error::Decode(_))));
		assert!(matches!(uint(json!("ten")), Err(Error::Decode(_))));
		assert!(matches!(uint(json!(null)), Err(Error::Decode(_))));
	}

	#[test]
	fn boolean_accepts_flags_and_bits() {
		assert_eq!(boolean(json!(true)).unwrap(), FieldValue::Bool(true));
		assert_eq!(boolean(json!("0")).unwrap(), FieldValue::Bool(false));
		assert!(boolean(json!(2)).is_err());
	}

	#[test]
	fn address_is_normalized() {
		let decoded = address(json!("0xABC")).unwrap();
		assert_eq!(decoded.as_address().map(Address::as_str), Some("0xabc"));
	}

	#[test]
	fn tuple_checks_arity() {
		let [a, b] = tuple::<2>(json!([1, 2])).unwrap();
		assert_eq!((a, b), (json!(1), json!(2)));
		assert!(tuple::<3>(json!([1, 2])).is_err());
	}
}
