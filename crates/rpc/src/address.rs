use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Case-normalized identity of a deployed contract or an account.
///
/// Normalization (trim + lowercase) is applied exactly once, here. Every map
/// keyed by address only ever sees normalized values, so look-ups cannot miss
/// because two callers spelled the same address with different casing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
	/// Parses and normalizes an address.
	///
	/// Accepts a `0x` prefix (any casing) followed by at least one ASCII
	/// alphanumeric character.
	pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
		let raw = raw.as_ref();
		let normalized = raw.trim().to_ascii_lowercase();
		let Some(body) = normalized.strip_prefix("0x") else {
			return Err(Error::InvalidAddress(raw.to_string()));
		};
		if body.is_empty() || !body.bytes().all(|b| b.is_ascii_alphanumeric()) {
			return Err(Error::InvalidAddress(raw.to_string()));
		}
		Ok(Self(normalized))
	}

	/// Returns the normalized string form.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl FromStr for Address {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for Address {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Self::parse(&raw).map_err(serde::de::Error::custom)
	}
}

/// Network context used to reach the remote execution environment.
///
/// Reads are batched per endpoint; two endpoints are never merged into one
/// network call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
	/// Chain identifier reported by the provider.
	pub chain_id: u64,
	/// Provider URL or other transport locator.
	pub url: String,
}

impl Endpoint {
	/// Creates an endpoint description.
	pub fn new(chain_id: u64, url: impl Into<String>) -> Self {
		Self { chain_id, url: url.into() }
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.chain_id, self.url)
	}
}
