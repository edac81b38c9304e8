//! A simulated origin: shared storage, a bus and a clock that several
//! coordinators ("tabs") are built over.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use grantauth_models::{Credential, Identity, IdentityKind};
use grantauth_sdk::sim::{mint_token, ScriptedProvider, ScriptedWallet};
use grantauth_sdk::{
    AuthCoordinator, Clock, CoordinatorConfig, LocalBus, MemoryStorage, TokioClock,
};

pub struct Origin {
    pub storage: MemoryStorage,
    pub bus: Arc<LocalBus>,
    pub clock: Arc<dyn Clock>,
}

pub struct Tab {
    pub coordinator: AuthCoordinator,
    pub wallet: Arc<ScriptedWallet>,
    pub provider: Arc<ScriptedProvider>,
}

impl Origin {
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::new())
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self::with_storage(MemoryStorage::with_latency(latency))
    }

    fn with_storage(storage: MemoryStorage) -> Self {
        Self {
            storage,
            bus: Arc::new(LocalBus::new()),
            clock: Arc::new(TokioClock::new()),
        }
    }

    pub fn provider(&self) -> ScriptedProvider {
        ScriptedProvider::new(self.clock.clone())
    }

    /// A tab on the bus with a connected wallet.
    pub fn tab(&self) -> Tab {
        self.tab_with(ScriptedWallet::connected(), self.provider(), true)
    }

    /// A tab that only polls.
    pub fn offline_tab(&self) -> Tab {
        self.tab_with(ScriptedWallet::connected(), self.provider(), false)
    }

    pub fn tab_with(&self, wallet: ScriptedWallet, provider: ScriptedProvider, on_bus: bool) -> Tab {
        self.tab_with_config(wallet, provider, on_bus, CoordinatorConfig::default())
    }

    pub fn tab_with_config(
        &self,
        wallet: ScriptedWallet,
        provider: ScriptedProvider,
        on_bus: bool,
        config: CoordinatorConfig,
    ) -> Tab {
        let wallet = Arc::new(wallet);
        let provider = Arc::new(provider);
        let mut builder =
            AuthCoordinator::builder(Arc::new(self.storage.clone()), wallet.clone(), provider.clone())
                .clock(self.clock.clone())
                .config(config);
        if on_bus {
            builder = builder.bus(self.bus.clone());
        }
        Tab {
            coordinator: builder.build(),
            wallet,
            provider,
        }
    }

    /// A credential for `identity` expiring `ttl` from now.
    pub fn credential(&self, identity: &Identity, ttl: TimeDelta) -> Credential {
        Credential::new(
            mint_token(identity, self.clock.now() + ttl),
            IdentityKind::ExternallyOwned,
        )
    }
}
