mod common;

use std::time::Duration;

use chrono::TimeDelta;
use futures::StreamExt;
use grantauth_models::{AuthEventKind, Identity, IdentityKind};
use grantauth_sdk::sim::{ScriptedProvider, ScriptedWallet};
use grantauth_sdk::{AuthError, AuthPhase, BroadcastBus, CoordinatorConfig};
use tokio::time::Instant;

use common::Origin;

#[tokio::test(start_paused = true)]
async fn valid_cached_credential_skips_signing() {
    let origin = Origin::new();
    let tab = origin.tab();
    let id = Identity::new("0xabc");
    let cached = origin.credential(&id, TimeDelta::hours(1));
    tab.coordinator.store().put(&id, &cached).await.unwrap();

    let cred = tab.coordinator.authenticate(&id).await.unwrap();

    assert_eq!(cred, cached);
    assert_eq!(tab.wallet.sign_count(), 0);
    assert_eq!(tab.provider.challenge_count(), 0);
    assert_eq!(tab.coordinator.phase(), AuthPhase::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn expired_credential_is_replaced() {
    let origin = Origin::new();
    let tab = origin.tab();
    let id = Identity::new("0xabc");
    let stale = origin.credential(&id, TimeDelta::seconds(-1));
    tab.coordinator.store().put(&id, &stale).await.unwrap();

    let cred = tab.coordinator.authenticate(&id).await.unwrap();

    assert_ne!(cred, stale);
    assert_eq!(tab.coordinator.store().get(&id).await.unwrap(), Some(cred));
    assert_eq!(tab.wallet.sign_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn sign_in_stores_provider_credential_for_identity_and_active_slot() {
    let origin = Origin::new();
    let provider = origin
        .provider()
        .with_fixed_token("tok1")
        .with_kind(IdentityKind::Contract);
    let tab = origin.tab_with(ScriptedWallet::connected(), provider, true);
    let id = Identity::new("0xabc");
    tab.coordinator.set_active_identity(Some(id.clone()));

    let cred = tab.coordinator.authenticate(&id).await.unwrap();

    assert_eq!(cred.token, "tok1");
    assert_eq!(cred.kind, IdentityKind::Contract);
    let store = tab.coordinator.store();
    assert_eq!(store.get(&id).await.unwrap(), Some(cred.clone()));
    assert_eq!(store.get_active().await.unwrap(), Some(cred));
    assert_eq!(tab.provider.challenge_count(), 1);
    assert_eq!(tab.provider.exchange_count(), 1);
    assert_eq!(tab.wallet.sign_count(), 1);
    assert!(tab.coordinator.marker().read().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn disconnected_wallet_is_prompted_once() {
    let origin = Origin::new();
    let tab = origin.tab_with(ScriptedWallet::disconnected(), origin.provider(), true);

    tab.coordinator
        .authenticate(&Identity::new("0xabc"))
        .await
        .unwrap();

    assert_eq!(tab.wallet.prompt_count(), 1);
    assert_eq!(tab.wallet.sign_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn network_hint_is_forwarded_to_exchange() {
    let origin = Origin::new();
    let config = CoordinatorConfig {
        network_hint: Some("testnet".into()),
        ..CoordinatorConfig::default()
    };
    let tab = origin.tab_with_config(ScriptedWallet::connected(), origin.provider(), true, config);

    tab.coordinator
        .authenticate(&Identity::new("0xabc"))
        .await
        .unwrap();

    assert_eq!(tab.provider.network_hints(), vec![Some("testnet".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn fresh_marker_makes_peer_wait_then_time_out() {
    let origin = Origin::new();
    let a = origin.tab();
    let b = origin.tab();
    let id = Identity::new("0xabc");

    // A claimed the marker and then went away mid-flow.
    let tag = a.coordinator.marker().claim(&id).await.unwrap();

    let started = Instant::now();
    let err = b.coordinator.authenticate(&id).await.unwrap_err();

    assert!(matches!(err, AuthError::PeerTimeout));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31));
    assert_eq!(b.wallet.sign_count(), 0);
    assert!(b.coordinator.pending().is_empty());
    assert_eq!(b.coordinator.phase(), AuthPhase::Failed);
    // Never release a claim this context did not make.
    assert_eq!(b.coordinator.marker().read().await.unwrap().unwrap().tag, tag);

    // Timing out does not turn into driving later on.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(b.wallet.sign_count(), 0);
    assert_eq!(b.coordinator.phase(), AuthPhase::Failed);
}

#[tokio::test(start_paused = true)]
async fn abandoned_marker_is_reclaimed_after_staleness_window() {
    let origin = Origin::new();
    let a = origin.tab();
    let b = origin.tab();
    let id = Identity::new("0xabc");
    a.coordinator.marker().claim(&id).await.unwrap();

    // Within the window the marker is honoured.
    assert!(matches!(
        b.coordinator.authenticate(&id).await,
        Err(AuthError::PeerTimeout)
    ));

    // One second past the window it is treated as absent and overwritten.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let cred = b.coordinator.authenticate(&id).await.unwrap();

    assert_eq!(b.wallet.sign_count(), 1);
    assert_eq!(b.coordinator.store().get(&id).await.unwrap(), Some(cred));
    assert!(b.coordinator.marker().read().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn completed_broadcast_converges_all_waiters() {
    let origin = Origin::new();
    let a = origin.tab_with(
        ScriptedWallet::connected().with_sign_delay(Duration::from_secs(5)),
        origin.provider(),
        true,
    );
    let b = origin.tab();
    let c = origin.tab();
    let _lb = b.coordinator.start_listener().await.unwrap();
    let _lc = c.coordinator.start_listener().await.unwrap();
    let id = Identity::new("0xabc");

    let driver = tokio::spawn({
        let coordinator = a.coordinator.clone();
        let id = id.clone();
        async move { coordinator.authenticate(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let (rb, rc) = tokio::join!(b.coordinator.authenticate(&id), c.coordinator.authenticate(&id));
    let cred = driver.await.unwrap().unwrap();

    assert_eq!(rb.unwrap(), cred);
    assert_eq!(rc.unwrap(), cred);
    // Woken by the broadcast, not by the 30 s budget.
    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(a.wallet.sign_count(), 1);
    assert_eq!(b.wallet.sign_count(), 0);
    assert_eq!(c.wallet.sign_count(), 0);
    assert_eq!(b.coordinator.phase(), AuthPhase::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn polling_alone_converges_without_bus() {
    let origin = Origin::new();
    let a = origin.tab_with(
        ScriptedWallet::connected().with_sign_delay(Duration::from_millis(2500)),
        origin.provider(),
        false,
    );
    let b = origin.offline_tab();
    let id = Identity::new("0xabc");

    let driver = tokio::spawn({
        let coordinator = a.coordinator.clone();
        let id = id.clone();
        async move { coordinator.authenticate(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let waited = b.coordinator.authenticate(&id).await.unwrap();
    let cred = driver.await.unwrap().unwrap();

    assert_eq!(waited, cred);
    // Picked up by the third poll.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    assert_eq!(b.wallet.sign_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn peer_started_event_makes_active_tab_follow() {
    let origin = Origin::new();
    let a = origin.tab_with(
        ScriptedWallet::connected().with_sign_delay(Duration::from_secs(3)),
        origin.provider(),
        true,
    );
    let b = origin.tab();
    let _listener = b.coordinator.start_listener().await.unwrap();
    let id = Identity::new("0xabc");
    a.coordinator.set_active_identity(Some(id.clone()));
    b.coordinator.set_active_identity(Some(id.clone()));

    let cred = a.coordinator.authenticate(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(b.wallet.sign_count(), 0);
    assert_eq!(b.coordinator.phase(), AuthPhase::Authenticated);
    assert!(b.coordinator.pending().is_empty());
    assert_eq!(b.coordinator.store().get_active().await.unwrap(), Some(cred));
}

#[tokio::test(start_paused = true)]
async fn failed_drive_releases_marker_and_broadcasts_failure() {
    let origin = Origin::new();
    let tab = origin.tab_with(ScriptedWallet::rejecting(), origin.provider(), true);
    let mut events = origin.bus.subscribe().await.unwrap();
    let id = Identity::new("0xabc");

    let err = tab.coordinator.authenticate(&id).await.unwrap_err();

    assert!(matches!(err, AuthError::SignatureRejected(_)));
    assert!(tab.coordinator.marker().read().await.unwrap().is_none());
    assert_eq!(tab.provider.exchange_count(), 0);

    let first = events.next().await.unwrap();
    assert_eq!(first.kind, AuthEventKind::Started { identity: id.clone() });
    let second = events.next().await.unwrap();
    assert_eq!(
        second.kind,
        AuthEventKind::Completed {
            identity: id,
            success: false
        }
    );
    assert_eq!(second.origin, tab.coordinator.context_id());
}

#[tokio::test(start_paused = true)]
async fn every_terminal_transition_clears_pending() {
    let origin = Origin::new();
    let id = Identity::new("0xabc");
    let cases: Vec<(ScriptedWallet, ScriptedProvider)> = vec![
        (ScriptedWallet::connected(), origin.provider()),
        (ScriptedWallet::abandoning(), origin.provider()),
        (ScriptedWallet::rejecting(), origin.provider()),
        (ScriptedWallet::connected(), origin.provider().failing_challenge()),
        (ScriptedWallet::connected(), origin.provider().failing_exchange()),
    ];

    for (wallet, provider) in cases {
        let tab = origin.tab_with(wallet, provider, true);
        let first = tab.coordinator.authenticate(&id).await;
        assert!(tab.coordinator.pending().is_empty());

        // A retry is a real attempt, not a suppressed duplicate.
        let retry = tab.coordinator.authenticate(&id).await;
        assert!(!matches!(retry, Err(AuthError::DuplicateSuppressed(_))));
        assert_eq!(first.is_ok(), retry.is_ok());
        assert!(tab.coordinator.pending().is_empty());
        origin.storage.clear();
    }
}

#[tokio::test(start_paused = true)]
async fn peer_timeout_clears_pending() {
    let origin = Origin::new();
    let tab = origin.tab();
    let id = Identity::new("0xabc");
    origin.tab().coordinator.marker().claim(&id).await.unwrap();

    let err = tab.coordinator.authenticate(&id).await.unwrap_err();
    assert!(matches!(err, AuthError::PeerTimeout));
    assert!(tab.coordinator.pending().is_empty());
    assert!(!tab.coordinator.pending().contains(&id));
}

#[tokio::test(start_paused = true)]
async fn sign_out_clears_credentials_and_owned_marker() {
    let origin = Origin::new();
    let tab = origin.tab_with(
        ScriptedWallet::connected().with_sign_delay(Duration::from_secs(5)),
        origin.provider(),
        true,
    );
    let mut events = origin.bus.subscribe().await.unwrap();
    let id = Identity::new("0xabc");
    tab.coordinator.set_active_identity(Some(id.clone()));
    let cached = origin.credential(&id, TimeDelta::seconds(-10));
    tab.coordinator.store().put(&id, &cached).await.unwrap();

    let attempt = tokio::spawn({
        let coordinator = tab.coordinator.clone();
        let id = id.clone();
        async move { coordinator.authenticate(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tab.coordinator.marker().read().await.unwrap().is_some());

    tab.coordinator.sign_out().await.unwrap();

    let store = tab.coordinator.store();
    assert!(store.get(&id).await.unwrap().is_none());
    assert!(store.get_active().await.unwrap().is_none());
    assert!(tab.coordinator.marker().read().await.unwrap().is_none());
    assert!(tab.coordinator.pending().is_empty());

    // The signature still arrives, but nothing is exchanged or stored.
    let err = attempt.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::SignedOut(_)));
    assert!(!err.is_user_visible());
    assert_eq!(tab.wallet.sign_count(), 1);
    assert_eq!(tab.provider.exchange_count(), 0);
    assert!(store.get(&id).await.unwrap().is_none());
    assert!(store.get_active().await.unwrap().is_none());
    assert_eq!(tab.coordinator.phase(), AuthPhase::Idle);
    assert!(!tab.coordinator.last_notice().unwrap().success);

    assert_eq!(
        events.next().await.unwrap().kind,
        AuthEventKind::Started { identity: id.clone() }
    );
    assert_eq!(
        events.next().await.unwrap().kind,
        AuthEventKind::Completed {
            identity: id.clone(),
            success: false
        }
    );

    // Signing in again afterwards is a fresh attempt.
    tab.coordinator.authenticate(&id).await.unwrap();
    assert_eq!(tab.coordinator.phase(), AuthPhase::Authenticated);
    assert!(store.get_active().await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn sign_out_does_not_release_marker_claimed_after_it() {
    let origin = Origin::new();
    let tab = origin.tab_with(
        ScriptedWallet::connected().with_sign_delay(Duration::from_secs(5)),
        origin.provider(),
        true,
    );
    let id = Identity::new("0xabc");

    let attempt = tokio::spawn({
        let coordinator = tab.coordinator.clone();
        let id = id.clone();
        async move { coordinator.authenticate(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    tab.coordinator.sign_out().await.unwrap();

    // A peer starts its own sign-in before ours unwinds.
    let peer_tag = origin.tab().coordinator.marker().claim(&id).await.unwrap();
    assert!(matches!(
        attempt.await.unwrap(),
        Err(AuthError::SignedOut(_))
    ));
    assert_eq!(
        tab.coordinator.marker().read().await.unwrap().unwrap().tag,
        peer_tag
    );
}

#[tokio::test(start_paused = true)]
async fn panicking_signer_still_releases_marker_and_broadcasts_failure() {
    let origin = Origin::new();
    let tab = origin.tab_with(ScriptedWallet::panicking(), origin.provider(), true);
    let mut events = origin.bus.subscribe().await.unwrap();
    let id = Identity::new("0xabc");

    let attempt = tokio::spawn({
        let coordinator = tab.coordinator.clone();
        let id = id.clone();
        async move { coordinator.authenticate(&id).await }
    });
    assert!(attempt.await.unwrap_err().is_panic());

    assert!(tab.coordinator.marker().read().await.unwrap().is_none());
    assert!(tab.coordinator.pending().is_empty());
    assert_eq!(tab.coordinator.phase(), AuthPhase::Failed);
    assert_eq!(
        events.next().await.unwrap().kind,
        AuthEventKind::Started { identity: id.clone() }
    );
    assert_eq!(
        events.next().await.unwrap().kind,
        AuthEventKind::Completed {
            identity: id.clone(),
            success: false
        }
    );

    // The next call drives again (and crashes again) instead of being
    // suppressed by a leftover in-flight flag.
    let retry = tokio::spawn({
        let coordinator = tab.coordinator.clone();
        let id = id.clone();
        async move { coordinator.authenticate(&id).await }
    });
    assert!(retry.await.unwrap_err().is_panic());
    assert_eq!(tab.wallet.sign_count(), 2);
    assert!(tab.coordinator.pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sign_out_leaves_peer_marker() {
    let origin = Origin::new();
    let tab = origin.tab();
    let id = Identity::new("0xabc");
    tab.coordinator.set_active_identity(Some(id.clone()));
    tab.coordinator.authenticate(&id).await.unwrap();

    let peer_tag = origin.tab().coordinator.marker().claim(&id).await.unwrap();
    tab.coordinator.sign_out().await.unwrap();

    assert_eq!(tab.coordinator.phase(), AuthPhase::Idle);
    assert!(tab.coordinator.store().get(&id).await.unwrap().is_none());
    assert_eq!(
        tab.coordinator.marker().read().await.unwrap().unwrap().tag,
        peer_tag
    );
}
