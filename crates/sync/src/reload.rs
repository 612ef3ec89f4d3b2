//! Monotonic "something changed" signal for derived computations.
//!
//! Handles emit fine-grained `data` events; consumers that only need to know
//! that *some* contract state moved (aggregate views, rates, badges) depend on
//! a [`ReloadSignal`] instead of subscribing to every handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

type Callback = Arc<dyn Fn(u64) + Send + Sync>;

struct SignalInner {
	version: watch::Sender<u64>,
	callbacks: Mutex<Vec<(u64, Callback)>>,
	next_id: AtomicU64,
}

/// Shared counter plus subscriber list.
///
/// Cloning yields another reference to the same signal.
#[derive(Clone)]
pub struct ReloadSignal {
	inner: Arc<SignalInner>,
}

impl std::fmt::Debug for ReloadSignal {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReloadSignal")
			.field("version", &self.version())
			.field("subscribers", &self.inner.callbacks.lock().len())
			.finish()
	}
}

impl Default for ReloadSignal {
	fn default() -> Self {
		Self::new()
	}
}

impl ReloadSignal {
	/// Creates a signal at version 0.
	pub fn new() -> Self {
		let (version, _) = watch::channel(0);
		Self {
			inner: Arc::new(SignalInner {
				version,
				callbacks: Mutex::new(Vec::new()),
				next_id: AtomicU64::new(0),
			}),
		}
	}

	/// Increments the counter and notifies every subscriber.
	///
	/// Callbacks run synchronously on the calling task, outside any lock, so
	/// a callback may subscribe or unsubscribe.
	pub fn bump(&self) -> u64 {
		let mut next = 0;
		self.inner.version.send_modify(|v| {
			*v += 1;
			next = *v;
		});
		let callbacks: Vec<Callback> = self.inner.callbacks.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
		tracing::trace!(version = next, subscribers = callbacks.len(), "sync.reload.bump");
		for cb in callbacks {
			cb(next);
		}
		next
	}

	/// Current counter value. Diagnostics only; consumers should react to
	/// notifications instead of polling this.
	pub fn version(&self) -> u64 {
		*self.inner.version.borrow()
	}

	/// Receiver that observes every bump, for async consumers.
	pub fn watch(&self) -> watch::Receiver<u64> {
		self.inner.version.subscribe()
	}

	/// Registers `callback`, invoked with the new version on every bump.
	///
	/// The callback stays registered until the returned [`Subscription`] is
	/// unsubscribed or dropped.
	pub fn subscribe(&self, callback: impl Fn(u64) + Send + Sync + 'static) -> Subscription {
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		self.inner.callbacks.lock().push((id, Arc::new(callback)));
		Subscription {
			id,
			signal: Some(Arc::downgrade(&self.inner)),
		}
	}

	/// Number of registered callbacks.
	pub fn subscriber_count(&self) -> usize {
		self.inner.callbacks.lock().len()
	}
}

/// Registration of a [`ReloadSignal`] callback.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
	id: u64,
	signal: Option<std::sync::Weak<SignalInner>>,
}

impl Subscription {
	/// Removes the callback. Later bumps no longer reach it.
	pub fn unsubscribe(mut self) {
		self.release();
	}

	/// Keeps the callback registered for the lifetime of the signal.
	pub fn detach(mut self) {
		self.signal = None;
	}

	fn release(&mut self) {
		if let Some(inner) = self.signal.take().and_then(|w| w.upgrade()) {
			inner.callbacks.lock().retain(|(id, _)| *id != self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.release();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	#[test]
	fn bump_notifies_callbacks_in_order_of_versions() {
		let signal = ReloadSignal::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let sub = signal.subscribe(move |v| sink.lock().push(v));

		signal.bump();
		signal.bump();
		assert_eq!(*seen.lock(), vec![1, 2]);
		assert_eq!(signal.version(), 2);
		drop(sub);
	}

	#[test]
	fn unsubscribe_stops_delivery() {
		let signal = ReloadSignal::new();
		let hits = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&hits);
		let sub = signal.subscribe(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		signal.bump();
		sub.unsubscribe();
		signal.bump();
		assert_eq!(hits.load(Ordering::SeqCst), 1);
		assert_eq!(signal.subscriber_count(), 0);
	}

	#[test]
	fn detached_subscription_outlives_its_token() {
		let signal = ReloadSignal::new();
		let hits = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&hits);
		signal
			.subscribe(move |_| {
				counter.fetch_add(1, Ordering::SeqCst);
			})
			.detach();

		signal.bump();
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn watch_observes_bumps() {
		let signal = ReloadSignal::new();
		let mut rx = signal.watch();
		signal.bump();
		rx.changed().await.unwrap();
		assert_eq!(*rx.borrow_and_update(), 1);
	}
}
