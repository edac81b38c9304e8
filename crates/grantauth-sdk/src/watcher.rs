//! Reacts to the wallet switching identities.

use grantauth_models::Identity;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::AuthCoordinator;
use crate::error::AuthError;

/// What [`IdentityWatcher::handle_change`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The wallet disconnected; the active slot was cleared.
    Disconnected,
    /// Same identity as before, nothing to do.
    Unchanged,
    /// A valid stored credential was adopted as active.
    Adopted(Identity),
    /// The coordinator obtained a credential for the new identity.
    Authenticated(Identity),
}

/// Follows a `watch` channel of the wallet's active identity.
pub struct IdentityWatcher {
    coordinator: AuthCoordinator,
    identities: watch::Receiver<Option<Identity>>,
}

impl IdentityWatcher {
    pub fn new(coordinator: AuthCoordinator, identities: watch::Receiver<Option<Identity>>) -> Self {
        Self {
            coordinator,
            identities,
        }
    }

    /// Apply one identity change.
    pub async fn handle_change(&self, next: Option<Identity>) -> Result<WatchOutcome, AuthError> {
        let coordinator = &self.coordinator;
        let store = coordinator.store();

        let Some(identity) = next else {
            coordinator.set_active_identity(None);
            store.clear_active().await?;
            info!("wallet disconnected");
            return Ok(WatchOutcome::Disconnected);
        };
        if coordinator.active_identity().as_ref() == Some(&identity) {
            return Ok(WatchOutcome::Unchanged);
        }

        coordinator.set_active_identity(Some(identity.clone()));
        if let Some(credential) = coordinator.valid_cached(&identity).await? {
            store.put_active(&credential).await?;
            info!(identity = %identity, "adopted stored credential");
            return Ok(WatchOutcome::Adopted(identity));
        }

        // The active slot still holds the previous identity's credential.
        store.clear_active().await?;
        coordinator.authenticate(&identity).await?;
        Ok(WatchOutcome::Authenticated(identity))
    }

    /// Process changes until the sender goes away.
    ///
    /// The current value is handled first. Failures are logged; the next
    /// change retries.
    pub async fn run(mut self) {
        let initial = self.identities.borrow_and_update().clone();
        self.apply(initial).await;
        while self.identities.changed().await.is_ok() {
            let next = self.identities.borrow_and_update().clone();
            self.apply(next).await;
        }
        debug!("identity channel closed, watcher stopped");
    }

    /// Run on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn apply(&self, next: Option<Identity>) {
        match self.handle_change(next).await {
            Ok(outcome) => debug!(?outcome, "identity change handled"),
            Err(e) if e.is_user_visible() => warn!(error = %e, "identity change failed"),
            Err(e) => debug!(error = %e, "identity change suppressed"),
        }
    }
}
