//! Reactive contract-data synchronization for the quorum governance dashboard.
//!
//! This crate turns a set of contract addresses into live, cached and
//! strongly-typed data objects. The pieces, leaf-first:
//!
//! - [`BatchAggregator`]: coalesces reads queued in the same scheduling tick
//!   into one aggregated round trip per endpoint.
//! - [`ContractHandle`]: the per-address unit of reactive state; cached
//!   fields, bound account/endpoint, event listeners and load tracks.
//! - [`ContractRegistry`]: identity cache from address to handle.
//! - [`WalletChangeReconciler`]: debounces wallet/network changes and replays
//!   rebinding and reloads across the registry.
//! - [`ReloadSignal`]: "something changed" notifications for derived
//!   computations such as [`derive::DaoOverview`].
//!
//! Remote access goes through [`quorum_rpc::RemoteCallClient`]; contract
//! shapes live in [`contracts`].
//!
//! ```ignore
//! let registry = Arc::new(ContractRegistry::new(transport, SyncConfig::default()));
//! let reconciler = WalletChangeReconciler::spawn(registry.clone());
//! reconciler.endpoint_changed(Some(Endpoint::new(1, "https://rpc.example")));
//!
//! let barn = registry.get_or_create(&barn_address, DaoBarn::factory(), HandleOptions::load_all());
//! barn.on(EventKind::Data, |handle, _| render(DaoBarn::data(handle)));
//! ```
#![warn(missing_docs)]

pub mod batch;
pub mod config;
pub mod contracts;
pub mod derive;
pub mod handle;
pub mod reconciler;
pub mod registry;
pub mod reload;
mod task;

pub use batch::{BatchAggregator, PendingRead};
pub use config::{BatchFailurePolicy, ConfigError, SyncConfig};
pub use handle::{ContractHandle, EventKind, HandleEvent, ListenerId, LoadOutcome, LoadStatus, Track};
pub use quorum_rpc::{Address, Endpoint, Error, FieldValue, Result};
pub use reconciler::{WalletChangeReconciler, WalletSignal};
pub use registry::{ContractFactory, ContractRegistry, HandleOptions, InitReport, WalletBinding};
pub use reload::{ReloadSignal, Subscription};

#[cfg(test)]
pub(crate) mod test_support;
