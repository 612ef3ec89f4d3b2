use quorum_rpc::Error;

/// The two independent load paths of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
	/// Account-independent reads.
	Common,
	/// Reads scoped to the bound account.
	User,
}

impl Track {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Common => "common",
			Self::User => "user",
		}
	}
}

/// Load state of one track.
///
/// The common track moves `Uninitialized -> Loading -> Ready | Failed`; the
/// user track starts at `Unbound` (no account) or `Idle` (account bound, no
/// data yet) and then follows the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
	/// Common track: no load attempted under the current endpoint.
	Uninitialized,
	/// User track: no account bound.
	Unbound,
	/// User track: account bound, no load attempted under it.
	Idle,
	/// A load is in flight.
	Loading,
	/// The last load applied at least one field.
	Ready,
	/// The last load failed entirely.
	Failed(Error),
}

impl LoadStatus {
	/// Returns true while a load is in flight.
	pub fn is_loading(&self) -> bool {
		matches!(self, Self::Loading)
	}

	/// Returns true once data has been applied under the current binding.
	pub fn is_ready(&self) -> bool {
		matches!(self, Self::Ready)
	}
}

/// Result of a load that reached the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
	/// Results were stored. `failed` lists fields that stayed unknown.
	Applied {
		/// Fields written by this load, in read order.
		updated: Vec<String>,
		/// Fields whose read failed, with the failure.
		failed: Vec<(String, Error)>,
	},
	/// The binding moved while the load was in flight; nothing was stored.
	Stale,
}

impl LoadOutcome {
	/// Returns true if the load was discarded.
	pub fn is_stale(&self) -> bool {
		matches!(self, Self::Stale)
	}

	/// Fields written by the load.
	pub fn updated(&self) -> &[String] {
		match self {
			Self::Applied { updated, .. } => updated,
			Self::Stale => &[],
		}
	}

	/// Fields that failed to load.
	pub fn failed(&self) -> &[(String, Error)] {
		match self {
			Self::Applied { failed, .. } => failed,
			Self::Stale => &[],
		}
	}
}
