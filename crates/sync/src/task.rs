//! Background task spawning.
//!
//! Every task runs inside a `sync.task` span carrying its [`TaskClass`], so
//! batch flushes, init loads and reconcile passes can be told apart in logs
//! without each call site tagging its own events.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Execution classes of the background work this crate spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TaskClass {
	/// Drains one endpoint queue and issues its aggregated reads.
	Flush,
	/// Initial or re-init load of a handle track.
	Load,
	/// The wallet change debounce loop.
	Reconcile,
}

impl TaskClass {
	const fn as_str(self) -> &'static str {
		match self {
			Self::Flush => "flush",
			Self::Load => "load",
			Self::Reconcile => "reconcile",
		}
	}
}

/// Runtime for callers outside any tokio context, such as UI threads that
/// drive a registry directly.
fn fallback_runtime() -> &'static Runtime {
	static FALLBACK: OnceLock<Runtime> = OnceLock::new();
	FALLBACK.get_or_init(|| {
		tracing::debug!("sync.task.fallback_runtime");
		Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("quorum-sync")
			.build()
			.expect("quorum-sync fallback runtime")
	})
}

/// Spawns `fut` on the caller's runtime, or on the fallback runtime when the
/// caller is outside one.
pub(crate) fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let task = fut.instrument(tracing::debug_span!("sync.task", class = class.as_str()));

	match Handle::try_current() {
		Ok(handle) => handle.spawn(task),
		Err(_) => fallback_runtime().spawn(task),
	}
}
