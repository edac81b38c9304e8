//! The per-context authentication coordinator.
//!
//! Every call to [`AuthCoordinator::authenticate`] walks the phase machine
//! in [`crate::phase`]: check the credential store, then either wait on a
//! peer that holds the in-progress marker or drive the sign-in round trip
//! itself. Waiting contexts resolve from whichever source reports first,
//! the one-second store poll or a `completed` broadcast.
//!
//! Several coordinators built over clones of the same storage behave like
//! several browser tabs of one origin.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{FutureExt, StreamExt};
use grantauth_models::{AuthEvent, AuthEventKind, ContextId, Credential, Identity};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::BroadcastBus;
use crate::clock::{Clock, SystemClock};
use crate::config::CoordinatorConfig;
use crate::credential_store::CredentialStore;
use crate::error::{AuthError, StorageError};
use crate::marker::MarkerSlot;
use crate::pending::PendingSet;
use crate::phase::{AuthPhase, PhaseInput, PhaseTracker};
use crate::provider::IdentityProvider;
use crate::storage::SharedStorage;
use crate::validator;
use crate::wallet::{SigningAuthority, WalletConnection};

const COMPLETION_CAPACITY: usize = 16;

/// User-facing outcome of the last finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// The identity the attempt was for.
    pub identity: Identity,
    /// Whether a credential was obtained.
    pub success: bool,
    /// Short human-readable message.
    pub message: String,
}

/// A peer's `completed` broadcast, forwarded to local waiters.
#[derive(Debug, Clone)]
struct Completion {
    identity: Identity,
    success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowMode {
    /// Explicit call: may drive if nobody else is.
    Interactive,
    /// Started from a peer's `started` broadcast: only ever waits.
    FollowOnly,
}

struct Inner {
    context: ContextId,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    store: CredentialStore,
    marker: MarkerSlot,
    bus: Option<Arc<dyn BroadcastBus>>,
    pending: PendingSet,
    authenticating: AtomicBool,
    /// Bumped by every sign-out; flows that started under an older value
    /// keep nothing.
    sign_outs: AtomicU64,
    wallet: Arc<dyn WalletConnection>,
    signer: Arc<dyn SigningAuthority>,
    provider: Arc<dyn IdentityProvider>,
    phase: PhaseTracker,
    notices: watch::Sender<Option<Notice>>,
    completions: broadcast::Sender<Completion>,
    owned_marker: Mutex<Option<Uuid>>,
}

/// Coordinates sign-in for one execution context.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<Inner>,
}

/// Builder for [`AuthCoordinator`].
pub struct CoordinatorBuilder {
    storage: Arc<dyn SharedStorage>,
    wallet: Arc<dyn WalletConnection>,
    signer: Arc<dyn SigningAuthority>,
    provider: Arc<dyn IdentityProvider>,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    bus: Option<Arc<dyn BroadcastBus>>,
}

impl CoordinatorBuilder {
    /// Override the timing and namespace settings.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the wall clock (defaults to [`SystemClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a broadcast bus. Without one the coordinator polls only.
    pub fn bus(mut self, bus: Arc<dyn BroadcastBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Attach a bus if one could be constructed.
    pub fn maybe_bus(mut self, bus: Option<Arc<dyn BroadcastBus>>) -> Self {
        self.bus = bus;
        self
    }

    /// Use a signer distinct from the connected wallet.
    pub fn signer(mut self, signer: Arc<dyn SigningAuthority>) -> Self {
        self.signer = signer;
        self
    }

    pub fn build(self) -> AuthCoordinator {
        let marker = MarkerSlot::new(
            self.storage.clone(),
            self.clock.clone(),
            self.config.stale_after,
        );
        let (notices, _) = watch::channel(None);
        let (completions, _) = broadcast::channel(COMPLETION_CAPACITY);
        let context = ContextId::random();
        debug!(context = %context, bus = self.bus.is_some(), "coordinator created");

        AuthCoordinator {
            inner: Arc::new(Inner {
                context,
                config: self.config,
                clock: self.clock,
                store: CredentialStore::new(self.storage),
                marker,
                bus: self.bus,
                pending: PendingSet::new(),
                authenticating: AtomicBool::new(false),
                sign_outs: AtomicU64::new(0),
                wallet: self.wallet,
                signer: self.signer,
                provider: self.provider,
                phase: PhaseTracker::new(),
                notices,
                completions,
                owned_marker: Mutex::new(None),
            }),
        }
    }
}

/// Clears the pending entry and the in-flight flag however a flow ends.
struct FlowGuard {
    inner: Arc<Inner>,
    identity: Identity,
    completions: broadcast::Receiver<Completion>,
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        self.inner.pending.remove(&self.identity);
        self.inner.authenticating.store(false, Ordering::SeqCst);
    }
}

impl AuthCoordinator {
    /// Start building a coordinator over `storage`, using `wallet` both to
    /// connect and to sign.
    pub fn builder<W>(
        storage: Arc<dyn SharedStorage>,
        wallet: Arc<W>,
        provider: Arc<dyn IdentityProvider>,
    ) -> CoordinatorBuilder
    where
        W: WalletConnection + SigningAuthority + 'static,
    {
        CoordinatorBuilder {
            storage,
            wallet: wallet.clone(),
            signer: wallet,
            provider,
            config: CoordinatorConfig::default(),
            clock: Arc::new(SystemClock),
            bus: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// This context's id, as stamped on outgoing broadcasts.
    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// The credential store this coordinator reads and writes.
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// The in-progress marker slot.
    pub fn marker(&self) -> &MarkerSlot {
        &self.inner.marker
    }

    /// Identities with an attempt in flight in this context.
    pub fn pending(&self) -> &PendingSet {
        &self.inner.pending
    }

    /// Current phase.
    pub fn phase(&self) -> AuthPhase {
        self.inner.phase.current()
    }

    /// Watch phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<AuthPhase> {
        self.inner.phase.subscribe()
    }

    /// The notice published by the last finished attempt.
    pub fn last_notice(&self) -> Option<Notice> {
        self.inner.notices.borrow().clone()
    }

    /// Watch notices.
    pub fn subscribe_notices(&self) -> watch::Receiver<Option<Notice>> {
        self.inner.notices.subscribe()
    }

    /// Set the identity the wallet currently reports as active.
    pub fn set_active_identity(&self, identity: Option<Identity>) {
        self.inner.store.set_active_identity(identity);
    }

    pub fn active_identity(&self) -> Option<Identity> {
        self.inner.store.active_identity()
    }

    /// The stored credential for `identity`, if present and unexpired.
    pub async fn valid_cached(&self, identity: &Identity) -> Result<Option<Credential>, StorageError> {
        let now = self.inner.clock.now();
        Ok(self
            .inner
            .store
            .get(identity)
            .await?
            .filter(|c| validator::is_valid_at(c, now)))
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Obtain a valid credential for `identity`.
    ///
    /// Returns the cached credential when it is still valid, waits for a
    /// peer that is already signing in, and otherwise drives the round trip.
    /// A second call while one is in flight in this context returns
    /// [`AuthError::DuplicateSuppressed`].
    pub async fn authenticate(&self, identity: &Identity) -> Result<Credential, AuthError> {
        let Some(guard) = self.begin_flow(identity) else {
            if let Some(credential) = self.valid_cached(identity).await? {
                return Ok(credential);
            }
            debug!(identity = %identity, "authentication already in flight, suppressing");
            return Err(AuthError::DuplicateSuppressed(identity.clone()));
        };
        self.run_flow(identity, FlowMode::Interactive, guard).await
    }

    /// Sign out the active identity.
    ///
    /// Clears its credential and the active slot, empties the pending set
    /// and releases the marker if this context still owns it. An attempt
    /// still running in this context ends with [`AuthError::SignedOut`]
    /// and stores nothing.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let inner = &self.inner;
        inner.sign_outs.fetch_add(1, Ordering::SeqCst);
        if let Some(identity) = inner.store.active_identity() {
            inner.store.clear(&identity).await?;
            info!(identity = %identity, "signed out");
        }
        inner.store.clear_active().await?;
        inner.pending.clear();

        let owned = inner
            .owned_marker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tag) = owned {
            if inner.marker.release_if_owned(tag).await? {
                debug!(%tag, "released own in-progress marker");
            }
        }
        inner.phase.apply(&PhaseInput::Reset);
        Ok(())
    }

    /// Consume the broadcast bus in the background.
    ///
    /// `completed` events wake local waiters; a peer's `started` event for
    /// the active identity begins a follow-only wait. Returns `None` when
    /// there is no bus or it cannot be subscribed to, in which case the
    /// coordinator falls back to polling.
    pub async fn start_listener(&self) -> Option<JoinHandle<()>> {
        let bus = self.inner.bus.clone()?;
        let mut events = match bus.subscribe().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "broadcast bus unavailable, relying on storage polling");
                return None;
            }
        };

        let weak = Arc::downgrade(&self.inner);
        Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                AuthCoordinator { inner }.handle_event(event);
            }
            debug!("broadcast listener stopped");
        }))
    }

    // ------------------------------------------------------------------
    // Flow
    // ------------------------------------------------------------------

    fn begin_flow(&self, identity: &Identity) -> Option<FlowGuard> {
        let inner = &self.inner;
        if inner.pending.contains(identity) {
            return None;
        }
        if inner
            .authenticating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        inner.pending.insert(identity);
        Some(FlowGuard {
            inner: inner.clone(),
            identity: identity.clone(),
            completions: inner.completions.subscribe(),
        })
    }

    async fn run_flow(
        &self,
        identity: &Identity,
        mode: FlowMode,
        mut guard: FlowGuard,
    ) -> Result<Credential, AuthError> {
        let generation = self.inner.sign_outs.load(Ordering::SeqCst);
        self.inner.phase.apply(&PhaseInput::Begin);
        let result = self
            .resolve(identity, mode, generation, &mut guard.completions)
            .await;
        self.conclude(identity, generation, &result);
        drop(guard);
        result
    }

    async fn resolve(
        &self,
        identity: &Identity,
        mode: FlowMode,
        generation: u64,
        completions: &mut broadcast::Receiver<Completion>,
    ) -> Result<Credential, AuthError> {
        if let Some(credential) = self.valid_cached(identity).await? {
            debug!(identity = %identity, "using cached credential");
            self.adopt(identity, generation, &credential).await?;
            return Ok(credential);
        }

        let claimed = match mode {
            FlowMode::FollowOnly => true,
            FlowMode::Interactive => self.inner.marker.is_claimed_by_other(identity).await?,
        };
        if claimed {
            self.inner.phase.apply(&PhaseInput::PeerClaimed);
            info!(identity = %identity, "another context is signing in, waiting");
            let credential = self.wait_on_peer(identity, generation, completions).await?;
            self.adopt(identity, generation, &credential).await?;
            Ok(credential)
        } else {
            self.inner.phase.apply(&PhaseInput::Unclaimed);
            self.drive(identity, generation).await
        }
    }

    /// Apply the terminal transition and publish the notice.
    ///
    /// A flow overtaken by a sign-out leaves the phase at the `Idle` the
    /// sign-out set.
    fn conclude(&self, identity: &Identity, generation: u64, result: &Result<Credential, AuthError>) {
        if self.signed_out_since(generation) {
            debug!(identity = %identity, "flow ended after sign-out, phase left idle");
        } else {
            let input = match (self.inner.phase.current(), result.is_ok()) {
                (AuthPhase::CheckingCache, true) => PhaseInput::CacheHit,
                (AuthPhase::WaitingOnPeer, true) => PhaseInput::PeerSucceeded,
                (AuthPhase::WaitingOnPeer, false) => PhaseInput::GaveUp,
                (_, true) => PhaseInput::SignedIn,
                (_, false) => PhaseInput::Fault,
            };
            self.inner.phase.apply(&input);
        }

        let message = match result {
            Ok(_) => "Signed in".to_string(),
            Err(e) => {
                warn!(identity = %identity, error = %e, "authentication failed");
                e.to_string()
            }
        };
        self.inner.notices.send_replace(Some(Notice {
            identity: identity.clone(),
            success: result.is_ok(),
            message,
        }));
    }

    fn signed_out_since(&self, generation: u64) -> bool {
        self.inner.sign_outs.load(Ordering::SeqCst) != generation
    }

    fn ensure_not_signed_out(&self, identity: &Identity, generation: u64) -> Result<(), AuthError> {
        if self.signed_out_since(generation) {
            info!(identity = %identity, "sign-out during attempt, discarding");
            return Err(AuthError::SignedOut(identity.clone()));
        }
        Ok(())
    }

    /// Mirror `credential` into the active slot if `identity` is active.
    async fn adopt(
        &self,
        identity: &Identity,
        generation: u64,
        credential: &Credential,
    ) -> Result<(), AuthError> {
        self.ensure_not_signed_out(identity, generation)?;
        if self.inner.store.is_active(identity) {
            self.inner.store.put_active(credential).await?;
        }
        Ok(())
    }

    /// Wait for a peer's sign-in. Never drives.
    async fn wait_on_peer(
        &self,
        identity: &Identity,
        generation: u64,
        completions: &mut broadcast::Receiver<Completion>,
    ) -> Result<Credential, AuthError> {
        let poll = self.inner.config.poll_interval;
        let max_polls = self.inner.config.max_polls;
        let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0u32;
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.ensure_not_signed_out(identity, generation)?;
                    polls += 1;
                    match self.valid_cached(identity).await {
                        Ok(Some(credential)) => {
                            debug!(identity = %identity, polls, "peer credential found by polling");
                            return Ok(credential);
                        }
                        Ok(None) => {}
                        Err(e) => warn!(identity = %identity, error = %e, "store poll failed"),
                    }
                    if polls >= max_polls {
                        return Err(AuthError::PeerTimeout);
                    }
                }
                event = completions.recv(), if events_open => match event {
                    Ok(done) if done.identity == *identity => {
                        if let Some(credential) = self.valid_cached(identity).await? {
                            debug!(identity = %identity, "peer credential found after broadcast");
                            return Ok(credential);
                        }
                        if !done.success {
                            return Err(AuthError::PeerFailed);
                        }
                        debug!(identity = %identity, "peer reported success but store has no valid credential yet");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "completion events dropped while waiting");
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
            }
        }
    }

    /// Claim the marker and run the round trip, cleaning up on every exit.
    async fn drive(&self, identity: &Identity, generation: u64) -> Result<Credential, AuthError> {
        let inner = &self.inner;
        let tag = inner.marker.claim(identity).await?;
        *inner
            .owned_marker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tag);
        self.publish(AuthEvent::started(inner.context, identity.clone()))
            .await;
        info!(identity = %identity, %tag, "driving sign-in");

        let outcome = AssertUnwindSafe(self.sign_in(identity, generation))
            .catch_unwind()
            .await;

        // A sign-out in the meantime has already released our claim; the
        // slot may now hold a peer's.
        let still_owned = inner
            .owned_marker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if still_owned {
            if let Err(e) = inner.marker.release().await {
                warn!(identity = %identity, error = %e, "failed to release in-progress marker");
            }
        }
        let success = matches!(outcome, Ok(Ok(_)));
        self.publish(AuthEvent::completed(inner.context, identity.clone(), success))
            .await;

        match outcome {
            Ok(result) => {
                if success {
                    info!(identity = %identity, "sign-in complete");
                }
                result
            }
            Err(panic) => {
                error!(identity = %identity, "sign-in panicked");
                if !self.signed_out_since(generation) {
                    inner.phase.apply(&PhaseInput::Fault);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn sign_in(&self, identity: &Identity, generation: u64) -> Result<Credential, AuthError> {
        let inner = &self.inner;
        if !inner.wallet.is_connected() && !inner.wallet.open_connection_prompt().await {
            return Err(AuthError::ConnectionAbandoned);
        }
        let challenge = inner.provider.request_challenge(identity).await?;
        let signature = inner.signer.sign(identity, &challenge).await?;
        self.ensure_not_signed_out(identity, generation)?;
        let credential = inner
            .provider
            .exchange(identity, &signature, inner.config.network_hint.as_deref())
            .await?;
        self.ensure_not_signed_out(identity, generation)?;
        inner.store.put(identity, &credential).await?;

        // The sign-out may have cleared the store while the write was in flight.
        if self.signed_out_since(generation) {
            inner.store.clear(identity).await?;
            if inner.store.is_active(identity) {
                inner.store.clear_active().await?;
            }
            return Err(AuthError::SignedOut(identity.clone()));
        }
        Ok(credential)
    }

    async fn publish(&self, event: AuthEvent) {
        let Some(bus) = &self.inner.bus else {
            return;
        };
        if let Err(e) = bus.publish(&event).await {
            warn!(error = %e, "broadcast publish failed");
        }
    }

    fn handle_event(&self, event: AuthEvent) {
        if event.origin == self.inner.context {
            return;
        }
        match event.kind {
            AuthEventKind::Started { identity } => {
                if !self.inner.store.is_active(&identity) {
                    return;
                }
                let Some(guard) = self.begin_flow(&identity) else {
                    return;
                };
                debug!(identity = %identity, peer = %event.origin, "following peer sign-in");
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.run_flow(&identity, FlowMode::FollowOnly, guard).await {
                        debug!(identity = %identity, error = %e, "follow-only wait ended without credential");
                    }
                });
            }
            AuthEventKind::Completed { identity, success } => {
                // No local waiters is fine.
                let _ = self.inner.completions.send(Completion { identity, success });
            }
        }
    }
}

impl std::fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCoordinator")
            .field("context", &self.inner.context)
            .field("phase", &self.phase())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}
