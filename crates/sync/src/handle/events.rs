use std::collections::HashMap;
use std::sync::Arc;

use quorum_rpc::{Address, Endpoint};

use super::ContractHandle;

/// Event categories a handle emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// Cached fields were updated by a load.
	Data,
	/// The acting account changed.
	Account,
	/// The endpoint changed.
	Endpoint,
}

/// Payload delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleEvent {
	/// A load stored new values.
	Data {
		/// Fields written, in read order.
		updated: Vec<String>,
	},
	/// The acting account changed.
	AccountChanged {
		/// Account bound before the change.
		previous: Option<Address>,
		/// Account bound now.
		current: Option<Address>,
	},
	/// The endpoint changed.
	EndpointChanged {
		/// Endpoint bound before the change.
		previous: Option<Endpoint>,
		/// Endpoint bound now.
		current: Option<Endpoint>,
	},
}

impl HandleEvent {
	/// Category of this event.
	pub fn kind(&self) -> EventKind {
		match self {
			Self::Data { .. } => EventKind::Data,
			Self::AccountChanged { .. } => EventKind::Account,
			Self::EndpointChanged { .. } => EventKind::Endpoint,
		}
	}
}

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type Listener = Arc<dyn Fn(&ContractHandle, &HandleEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
	next_id: u64,
	by_kind: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl Listeners {
	pub(crate) fn add(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
		let id = ListenerId(self.next_id);
		self.next_id += 1;
		self.by_kind.entry(kind).or_default().push((id, listener));
		id
	}

	pub(crate) fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
		let Some(list) = self.by_kind.get_mut(&kind) else {
			return false;
		};
		let before = list.len();
		list.retain(|(lid, _)| *lid != id);
		list.len() != before
	}

	/// Listeners for `kind` in registration order.
	pub(crate) fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
		self.by_kind
			.get(&kind)
			.map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
			.unwrap_or_default()
	}

	pub(crate) fn count(&self, kind: EventKind) -> usize {
		self.by_kind.get(&kind).map_or(0, Vec::len)
	}
}
