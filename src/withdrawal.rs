// 💳 Withdrawal workflow
//
// Entry checks the balance and the single-pending rule; submission
// snapshots the balance into the request and forwards it to
// moderation. The snapshot is fixed at creation - approvals landing
// while the request is pending never change the amount debited.

use std::sync::Arc;

use crate::error::{Result, RewardError};
use crate::events::{DecisionKey, DecisionKind};
use crate::outbound::{ModerationPrompt, Notifier};
use crate::store::{Store, WithdrawalRequest};

/// Destination format: exactly 16 digits after whitespace removal.
pub fn validate_destination(input: &str) -> Result<String> {
    let normalized: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if normalized.len() == 16 && normalized.chars().all(|c| c.is_ascii_digit()) {
        Ok(normalized)
    } else {
        Err(RewardError::InvalidDestination(input.to_string()))
    }
}

pub struct WithdrawalWorkflow {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

impl WithdrawalWorkflow {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Preconditions for entering the destination prompt.
    ///
    /// Returns the current balance (for the prompt copy) when both
    /// hold; the session only moves to AwaitingDestination on success.
    pub fn entry(&self, participant_id: i64) -> Result<i64> {
        let account = self
            .store
            .get_account(participant_id)?
            .ok_or(RewardError::NotRegistered(participant_id))?;

        if account.balance <= 0 {
            return Err(RewardError::InsufficientBalance(participant_id));
        }
        if self.store.has_pending_withdrawal(participant_id)? {
            return Err(RewardError::WithdrawalAlreadyPending(participant_id));
        }
        Ok(account.balance)
    }

    /// Create the pending request and forward it to moderation.
    ///
    /// The destination is expected format-validated; the store re-checks
    /// balance and the single-pending rule atomically at insert.
    pub fn submit(&self, participant_id: i64, destination: &str) -> Result<WithdrawalRequest> {
        let account = self
            .store
            .get_account(participant_id)?
            .ok_or(RewardError::NotRegistered(participant_id))?;

        let request = self.store.create_withdrawal(participant_id, destination)?;

        let prompt = ModerationPrompt {
            body: format!(
                "New withdrawal request!\n\nParticipant: {}\nName: {}\nAmount: {} so'm\nCard: {}",
                participant_id, account.display_name, request.amount, destination,
            ),
            evidence_ref: None,
            accept: DecisionKey {
                kind: DecisionKind::WithdrawalPaid,
                participant_id,
                key: destination.to_string(),
            },
            reject: DecisionKey {
                kind: DecisionKind::WithdrawalInvalidCard,
                participant_id,
                key: destination.to_string(),
            },
        };
        self.notifier.send_prompt(&prompt)?;

        tracing::info!(
            participant_id,
            amount = request.amount,
            "withdrawal request forwarded to moderation"
        );
        Ok(request)
    }
}

// ============================================================================
// TESTS
// ============================================================================
