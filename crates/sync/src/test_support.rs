//! Shared fixtures for in-crate tests.

use std::sync::Arc;

use quorum_rpc::mock::MockTransport;
use quorum_rpc::{Address, Endpoint};

use crate::handle::ContractHandle;
use crate::registry::{ContractFactory, ContractRegistry, HandleOptions, WalletBinding};
use crate::SyncConfig;

pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_max_level(tracing::Level::TRACE)
		.with_test_writer()
		.try_init();
}

pub(crate) fn addr(raw: &str) -> Address {
	Address::parse(raw).unwrap()
}

pub(crate) fn mainnet() -> Endpoint {
	Endpoint::new(1, "mock://mainnet")
}

pub(crate) fn testnet() -> Endpoint {
	Endpoint::new(5, "mock://testnet")
}

pub(crate) fn registry_with(transport: &Arc<MockTransport>, config: SyncConfig) -> Arc<ContractRegistry> {
	let registry = Arc::new(ContractRegistry::new(transport.clone(), config));
	registry.set_wallet(WalletBinding {
		account: None,
		endpoint: Some(mainnet()),
	});
	registry
}

/// Handle on mainnet bound to `account`, with no initial loads.
pub(crate) fn bound_handle(transport: &Arc<MockTransport>, address: &str, factory: ContractFactory, account: Option<&str>) -> ContractHandle {
	let registry = registry_with(transport, SyncConfig::default());
	registry.set_wallet(WalletBinding {
		account: account.map(addr),
		endpoint: Some(mainnet()),
	});
	registry.get_or_create(&addr(address), factory, HandleOptions::default())
}
