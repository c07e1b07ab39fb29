// 🗳️ Submission pipeline
//
// Validates a proof submission, creates the pending vote record, and
// forwards the moderation prompt. Never touches the balance - credit
// happens only at approval time in the ledger.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{Result, RewardError};
use crate::events::{DecisionKey, DecisionKind};
use crate::outbound::{ModerationPrompt, Notifier};
use crate::store::{Store, VoteRecord};

/// Proof phone format: +998 followed by exactly 9 digits.
pub fn validate_proof(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("+998");
    match digits {
        Some(rest) if rest.len() == 9 && rest.chars().all(|c| c.is_ascii_digit()) => {
            Ok(trimmed.to_string())
        }
        _ => Err(RewardError::InvalidProof(input.to_string())),
    }
}

pub struct SubmissionPipeline {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

impl SubmissionPipeline {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Create a pending vote and forward it to moderation.
    ///
    /// The proof is expected to be format-validated already; global
    /// uniqueness is checked atomically by the store and surfaces as
    /// `DuplicateProof`.
    pub fn submit(
        &self,
        participant_id: i64,
        proof: &str,
        evidence_ref: &str,
    ) -> Result<VoteRecord> {
        let vote = self
            .store
            .create_pending_vote(participant_id, proof, evidence_ref)?;

        let last_three = &proof[proof.len().saturating_sub(3)..];
        let prompt = ModerationPrompt {
            body: format!(
                "New vote!\n\nParticipant: {}\nPhone: {}\nLast 3 digits: {}\nTime: {}",
                participant_id,
                proof,
                last_three,
                Utc::now().to_rfc3339(),
            ),
            evidence_ref: Some(evidence_ref.to_string()),
            accept: DecisionKey {
                kind: DecisionKind::ApproveVote,
                participant_id,
                key: proof.to_string(),
            },
            reject: DecisionKey {
                kind: DecisionKind::RejectVote,
                participant_id,
                key: proof.to_string(),
            },
        };
        self.notifier.send_prompt(&prompt)?;

        tracing::info!(participant_id, proof, "vote submitted for moderation");
        Ok(vote)
    }
}

// ============================================================================
// TESTS
// ============================================================================
