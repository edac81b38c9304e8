//! # grantauth SDK
//!
//! Coordinates wallet sign-in across several execution contexts (tabs,
//! windows, processes) that share persistent storage but no memory.
//!
//! The SDK provides:
//!
//! * [`AuthCoordinator`]: the per-context state machine deciding whether to
//!   reuse a cached credential, wait on a peer, or drive a sign-in.
//! * [`CredentialStore`]: per-identity and "active" credential slots on top
//!   of any [`SharedStorage`] backend.
//! * [`MarkerSlot`]: the advisory, time-bounded "in progress" claim.
//! * [`BroadcastBus`]: best-effort pub/sub between contexts
//!   ([`LocalBus`], [`NatsBus`]).
//! * [`IdentityWatcher`]: re-runs the coordinator when the active wallet
//!   identity changes.
//! * [`HttpIdentityProvider`] and [`NKeyWallet`]: concrete collaborators.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use grantauth_models::Identity;
//! use grantauth_sdk::{AuthCoordinator, HttpIdentityProvider, LocalBus, MemoryStorage, NKeyWallet};
//!
//! # async fn run() -> Result<(), grantauth_sdk::AuthError> {
//! let storage = Arc::new(MemoryStorage::new());
//! let wallet = Arc::new(NKeyWallet::generate());
//! let provider = Arc::new(HttpIdentityProvider::new("http://localhost:3002"));
//!
//! let coordinator = AuthCoordinator::builder(storage, wallet.clone(), provider)
//!     .bus(Arc::new(LocalBus::new()))
//!     .build();
//! let _listener = coordinator.start_listener().await;
//!
//! let credential = coordinator.authenticate(&wallet.identity()).await?;
//! println!("signed in: {:?}", credential.kind);
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod credential_store;
pub mod error;
pub mod file_storage;
pub mod jetstream;
pub mod keys;
pub mod marker;
pub mod nats_bus;
pub mod pending;
pub mod phase;
pub mod provider;
pub mod sim;
pub mod storage;
pub mod validator;
pub mod wallet;
pub mod watcher;

pub use bus::{BroadcastBus, EventStream, LocalBus};
pub use clock::{Clock, SystemClock, TokioClock};
pub use config::CoordinatorConfig;
pub use coordinator::{AuthCoordinator, CoordinatorBuilder, Notice};
pub use credential_store::CredentialStore;
pub use error::{AuthError, BusError, StorageError, ValidationError};
pub use file_storage::FileStorage;
pub use jetstream::JetStreamStorage;
pub use keys::StorageKeys;
pub use marker::MarkerSlot;
pub use nats_bus::NatsBus;
pub use pending::PendingSet;
pub use phase::AuthPhase;
pub use provider::{HttpIdentityProvider, IdentityProvider};
pub use storage::{MemoryStorage, SharedStorage};
pub use wallet::{NKeyWallet, SigningAuthority, WalletConnection};
pub use watcher::{IdentityWatcher, WatchOutcome};
