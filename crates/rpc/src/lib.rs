//! Remote contract call client for the quorum governance dashboard.
//!
//! This crate is the leaf of the contract-data stack. It knows how to issue a
//! single read, an aggregated multi-read and a state-changing write against a
//! remote execution endpoint, and how to turn raw responses into typed
//! [`FieldValue`]s. It knows nothing about caching or reactivity; that lives in
//! `quorum-sync`.
//!
//! * [`Address`] / [`Endpoint`]: normalized identities for contracts, accounts and networks
//! * [`CallTransport`]: the seam the wallet/network provider implements
//! * [`RemoteCallClient`]: timeout-bounded facade over a transport
//! * [`decode`]: pure transforms from raw values to [`FieldValue`]
//!
//! ## Cargo features
//!
//! - `mock`: [`mock::MockTransport`], a scripted in-memory transport.
//!   *Disabled by default.*
#![warn(missing_docs)]

mod address;
mod call;
mod client;
pub mod decode;
mod transport;
mod value;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use address::{Address, Endpoint};
pub use call::{CallRequest, TransactionReceipt, WriteOptions};
pub use client::{DEFAULT_REQUEST_TIMEOUT, RemoteCallClient};
pub use primitive_types::U256;
pub use serde_json::Value as JsonValue;
pub use transport::CallTransport;
pub use value::FieldValue;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Typed failures of remote contract calls.
///
/// Errors are `Clone` so that coalesced loads can hand the same failure to
/// every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The endpoint was unreachable or the call timed out.
	#[error("transport error: {0}")]
	Transport(String),
	/// The remote contract logic rejected the call.
	#[error("execution reverted{}", revert_suffix(.reason))]
	ExecutionReverted {
		/// Decoded revert reason, when the endpoint supplied one.
		reason: Option<String>,
	},
	/// The response did not match the expected output shape.
	#[error("decode error: {0}")]
	Decode(String),
	/// An account-scoped operation was attempted with no acting account.
	#[error("no account bound")]
	NoAccountBound,
	/// A remote operation was attempted before any endpoint was bound.
	#[error("no endpoint bound")]
	NoEndpointBound,
	/// The string is not a usable contract or account address.
	#[error("invalid address: {0:?}")]
	InvalidAddress(String),
	/// A shared operation ended without publishing a result.
	#[error("aborted: {0}")]
	Aborted(String),
}

impl Error {
	/// Returns true when re-issuing the whole operation may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transport(_) | Self::Aborted(_))
	}

	/// Returns true for conditions the UI treats as "not available yet"
	/// rather than as failures.
	pub fn is_expected(&self) -> bool {
		matches!(self, Self::NoAccountBound | Self::NoEndpointBound)
	}

	/// Shorthand for a revert carrying a reason string.
	pub fn reverted(reason: impl Into<String>) -> Self {
		Self::ExecutionReverted {
			reason: Some(reason.into()),
		}
	}
}

fn revert_suffix(reason: &Option<String>) -> String {
	reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}
