//! Synchronization layer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a batch reacts when some of its sub-calls fail.
///
/// Chosen once per registry and applied to every batch it issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
	/// A reverted sub-call fails only its own read. A failed round trip
	/// still fails every read it carried.
	#[default]
	Isolated,
	/// Any failed sub-call fails every read of the round trip with that error.
	AllOrNothing,
}

/// Tunables for the synchronization layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
	/// Quiet period before a burst of wallet changes is reconciled.
	pub debounce_ms: u64,
	/// Per-request timeout in seconds.
	pub request_timeout_secs: u64,
	/// Maximum number of reads carried by one aggregated round trip.
	pub max_batch_size: usize,
	/// Partial-failure policy for batches.
	pub failure_policy: BatchFailurePolicy,
}

/// Default debounce window for wallet change bursts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Default upper bound on reads per aggregated round trip.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
			request_timeout_secs: quorum_rpc::DEFAULT_REQUEST_TIMEOUT.as_secs(),
			max_batch_size: DEFAULT_MAX_BATCH_SIZE,
			failure_policy: BatchFailurePolicy::default(),
		}
	}
}

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// The TOML text could not be parsed.
	#[error("invalid config: {0}")]
	Parse(#[from] toml::de::Error),
	/// A value is out of range.
	#[error("invalid config value for `{field}`: {reason}")]
	Invalid {
		/// Offending key.
		field: &'static str,
		/// Why it was rejected.
		reason: &'static str,
	},
}

impl SyncConfig {
	/// Parses a TOML document; missing keys take their defaults.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects values the layer cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_batch_size == 0 {
			return Err(ConfigError::Invalid {
				field: "max_batch_size",
				reason: "must be > 0",
			});
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::Invalid {
				field: "request_timeout_secs",
				reason: "must be > 0",
			});
		}
		Ok(())
	}

	/// Debounce window as a [`Duration`].
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	/// Request timeout as a [`Duration`].
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		assert_eq!(SyncConfig::from_toml_str("").unwrap(), SyncConfig::default());
		assert_eq!(SyncConfig::default().debounce(), Duration::from_millis(250));
	}

	#[test]
	fn partial_document_overrides_keys() {
		let config = SyncConfig::from_toml_str(
			r#"
			debounce_ms = 50
			failure_policy = "all_or_nothing"
			"#,
		)
		.unwrap();
		assert_eq!(config.debounce_ms, 50);
		assert_eq!(config.failure_policy, BatchFailurePolicy::AllOrNothing);
		assert_eq!(config.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
	}

	#[test]
	fn rejects_zero_batch_size_and_unknown_keys() {
		assert!(matches!(
			SyncConfig::from_toml_str("max_batch_size = 0"),
			Err(ConfigError::Invalid { field: "max_batch_size", .. })
		));
		assert!(matches!(SyncConfig::from_toml_str("debounce = 5"), Err(ConfigError::Parse(_))));
	}
}
