//! Coordinator phases as an explicit finite state machine.
//!
//! ## State Diagram
//!
//! ```text
//!              ┌────────┐
//!              │  Idle  │ (initial)
//!              └───┬────┘
//!                  │ Begin
//!                  ▼
//!          ┌───────────────┐  CacheHit
//!          │ CheckingCache │ ──────────────────────────────┐
//!          └──┬─────────┬──┘                               │
//!  PeerClaimed│         │Unclaimed                         │
//!             ▼         ▼                                  ▼
//!   ┌───────────────┐ ┌─────────┐ SignedIn        ┌───────────────┐
//!   │ WaitingOnPeer │ │ Driving │ ──────────────► │ Authenticated │
//!   └───────┬───────┘ └────┬────┘                 └───────────────┘
//!           │ GaveUp       │ Fault                        ▲
//!           ▼              ▼                              │ PeerSucceeded
//!        ┌──────────────────────┐                         │
//!        │        Failed        │   (WaitingOnPeer) ──────┘
//!        └──────────────────────┘
//! ```
//!
//! `Authenticated` and `Failed` accept `Begin` for the next attempt and
//! `Reset` on sign-out.

use std::sync::{Mutex, PoisonError};

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub phase_machine(Idle)

    Idle => {
        Begin => CheckingCache,
        Reset => Idle
    },
    CheckingCache => {
        CacheHit => Authenticated,
        PeerClaimed => WaitingOnPeer,
        Unclaimed => Driving,
        Fault => Failed
    },
    WaitingOnPeer => {
        PeerSucceeded => Authenticated,
        GaveUp => Failed
    },
    Driving => {
        SignedIn => Authenticated,
        Fault => Failed
    },
    Authenticated => {
        Begin => CheckingCache,
        Reset => Idle
    },
    Failed => {
        Begin => CheckingCache,
        Reset => Idle
    }
}

pub use phase_machine::Input as PhaseInput;
pub use phase_machine::State as PhaseState;
pub use phase_machine::StateMachine as PhaseMachine;

/// Coordinator phase for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Nothing has happened yet, or the user signed out.
    Idle,
    /// Reading the credential store.
    CheckingCache,
    /// Deferring to another context's sign-in.
    WaitingOnPeer,
    /// Performing the sign-in round trip.
    Driving,
    /// A valid credential is in use.
    Authenticated,
    /// The last attempt ended without a credential.
    Failed,
}

impl AuthPhase {
    /// Whether an attempt is in flight.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthPhase::CheckingCache | AuthPhase::WaitingOnPeer | AuthPhase::Driving
        )
    }
}

impl From<&PhaseState> for AuthPhase {
    fn from(state: &PhaseState) -> Self {
        match state {
            PhaseState::Idle => AuthPhase::Idle,
            PhaseState::CheckingCache => AuthPhase::CheckingCache,
            PhaseState::WaitingOnPeer => AuthPhase::WaitingOnPeer,
            PhaseState::Driving => AuthPhase::Driving,
            PhaseState::Authenticated => AuthPhase::Authenticated,
            PhaseState::Failed => AuthPhase::Failed,
        }
    }
}

/// The machine plus a `watch` channel publishing every change.
pub(crate) struct PhaseTracker {
    machine: Mutex<PhaseMachine>,
    tx: watch::Sender<AuthPhase>,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(AuthPhase::Idle);
        Self {
            machine: Mutex::new(PhaseMachine::new()),
            tx,
        }
    }

    pub(crate) fn current(&self) -> AuthPhase {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AuthPhase> {
        self.tx.subscribe()
    }

    /// Apply `input`; an impossible transition is logged and ignored.
    pub(crate) fn apply(&self, input: &PhaseInput) -> AuthPhase {
        let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);
        let old = AuthPhase::from(machine.state());
        if machine.consume(input).is_err() {
            warn!(?input, phase = ?old, "ignoring impossible phase transition");
            return old;
        }
        let new = AuthPhase::from(machine.state());
        drop(machine);

        if old != new {
            debug!(old_phase = ?old, new_phase = ?new, "phase transition");
        }
        self.tx.send_replace(new);
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_idle() {
        let machine = PhaseMachine::new();
        assert_eq!(*machine.state(), PhaseState::Idle);
    }

    #[test]
    fn cache_hit_flow() {
        let mut machine = PhaseMachine::new();
        machine.consume(&PhaseInput::Begin).unwrap();
        machine.consume(&PhaseInput::CacheHit).unwrap();
        assert_eq!(*machine.state(), PhaseState::Authenticated);
    }

    #[test]
    fn driving_flow_and_retry() {
        let mut machine = PhaseMachine::new();
        machine.consume(&PhaseInput::Begin).unwrap();
        machine.consume(&PhaseInput::Unclaimed).unwrap();
        assert_eq!(*machine.state(), PhaseState::Driving);
        machine.consume(&PhaseInput::Fault).unwrap();
        assert_eq!(*machine.state(), PhaseState::Failed);

        machine.consume(&PhaseInput::Begin).unwrap();
        assert_eq!(*machine.state(), PhaseState::CheckingCache);
    }

    #[test]
    fn waiting_cannot_become_driving() {
        let mut machine = PhaseMachine::new();
        machine.consume(&PhaseInput::Begin).unwrap();
        machine.consume(&PhaseInput::PeerClaimed).unwrap();
        assert!(machine.consume(&PhaseInput::Unclaimed).is_err());
        assert!(machine.consume(&PhaseInput::SignedIn).is_err());

        machine.consume(&PhaseInput::GaveUp).unwrap();
        assert_eq!(*machine.state(), PhaseState::Failed);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut machine = PhaseMachine::new();
        machine.consume(&PhaseInput::Begin).unwrap();
        machine.consume(&PhaseInput::CacheHit).unwrap();
        machine.consume(&PhaseInput::Reset).unwrap();
        assert_eq!(*machine.state(), PhaseState::Idle);
    }

    #[test]
    fn tracker_publishes_changes() {
        let tracker = PhaseTracker::new();
        let rx = tracker.subscribe();
        assert_eq!(tracker.apply(&PhaseInput::Begin), AuthPhase::CheckingCache);
        assert_eq!(*rx.borrow(), AuthPhase::CheckingCache);
        assert!(tracker.current().is_transient());
    }

    #[test]
    fn tracker_ignores_impossible_input() {
        let tracker = PhaseTracker::new();
        assert_eq!(tracker.apply(&PhaseInput::SignedIn), AuthPhase::Idle);
        assert_eq!(tracker.current(), AuthPhase::Idle);
    }
}
