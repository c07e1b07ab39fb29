// 💬 Conversational session state
//
// Per-participant step plus scratch fields, keyed by participant id.
// Ephemeral by design: sessions live in memory, default to Idle, and
// rebuild to Idle on process restart. Losing one never loses money -
// all durable state is in the store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// SESSION STEP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStep {
    Idle,
    /// /start was issued; next text becomes the display name
    AwaitingName,
    /// "confirm submission" pressed; next text must be a proof phone number
    AwaitingProof,
    /// Proof accepted; next message must carry evidence
    AwaitingEvidence,
    /// Withdrawal preconditions passed; next text must be a card number
    AwaitingDestination,
}

impl SessionStep {
    pub fn is_awaiting(&self) -> bool {
        !matches!(self, SessionStep::Idle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub step: SessionStep,
    /// Validated proof held between AwaitingProof and AwaitingEvidence
    pub pending_proof: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            step: SessionStep::Idle,
            pending_proof: None,
        }
    }
}

// ============================================================================
// SESSION STORE
// ============================================================================

/// In-memory session registry. Cloneable; clones share state.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<i64, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, defaulting to Idle for unknown participants.
    pub fn get(&self, participant_id: i64) -> Session {
        self.sessions
            .read()
            .unwrap()
            .get(&participant_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_step(&self, participant_id: i64, step: SessionStep) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.entry(participant_id).or_default();
        session.step = step;
    }

    pub fn set_pending_proof(&self, participant_id: i64, proof: &str) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.entry(participant_id).or_default();
        session.pending_proof = Some(proof.to_string());
    }

    pub fn take_pending_proof(&self, participant_id: i64) -> Option<String> {
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .get_mut(&participant_id)
            .and_then(|s| s.pending_proof.take())
    }

    /// Discard scratch and return to Idle. Idempotent: resetting an
    /// already-idle session is a no-op.
    pub fn reset(&self, participant_id: i64) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(participant_id, Session::default());
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_participant_is_idle() {
        let store = SessionStore::new();
        assert_eq!(store.get(1).step, SessionStep::Idle);
        assert!(store.get(1).pending_proof.is_none());
    }

    #[test]
    fn test_step_transitions() {
        let store = SessionStore::new();
        store.set_step(1, SessionStep::AwaitingProof);
        assert_eq!(store.get(1).step, SessionStep::AwaitingProof);
        assert!(store.get(1).step.is_awaiting());

        // Another participant is unaffected
        assert_eq!(store.get(2).step, SessionStep::Idle);
    }

    #[test]
    fn test_pending_proof_scratch() {
        let store = SessionStore::new();
        store.set_step(1, SessionStep::AwaitingEvidence);
        store.set_pending_proof(1, "+998901234567");

        assert_eq!(store.take_pending_proof(1).as_deref(), Some("+998901234567"));
        // Scratch is consumed
        assert!(store.take_pending_proof(1).is_none());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let store = SessionStore::new();
        store.set_step(1, SessionStep::AwaitingDestination);
        store.set_pending_proof(1, "+998901234567");

        store.reset(1);
        assert_eq!(store.get(1).step, SessionStep::Idle);
        assert!(store.get(1).pending_proof.is_none());

        // Reset while already idle changes nothing
        store.reset(1);
        assert_eq!(store.get(1).step, SessionStep::Idle);
    }
}
