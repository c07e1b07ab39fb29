// ⚖️ Moderation ledger
//
// Applies administrator decisions to pending votes and withdrawals.
// Authorization runs before any lookup; a decision that finds its
// record already resolved is a silent no-op, which makes duplicate
// delivery of the same callback safe. Status flips and balance moves
// commit together inside the store.

use std::sync::Arc;

use crate::error::{Result, RewardError};
use crate::events::{DecisionInput, DecisionKind};
use crate::outbound::{AdminDirectory, Notifier, PromptHandle};
use crate::pricing;
use crate::store::Store;

/// What processing a decision actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Side effects applied exactly once
    Applied,
    /// Target record already resolved or unknown; nothing changed
    AlreadyResolved,
}

pub struct ModerationLedger {
    store: Store,
    notifier: Arc<dyn Notifier>,
    admins: Arc<dyn AdminDirectory>,
}

impl ModerationLedger {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>, admins: Arc<dyn AdminDirectory>) -> Self {
        Self {
            store,
            notifier,
            admins,
        }
    }

    /// Process one administrator decision.
    ///
    /// `prompt` is the handle of the original moderation prompt, when
    /// the transport passes it along with the callback; the outcome is
    /// written back to it best-effort.
    pub fn process(
        &self,
        decision: &DecisionInput,
        prompt: Option<&PromptHandle>,
    ) -> Result<DecisionOutcome> {
        if !self.admins.is_administrator(decision.admin_id)? {
            tracing::warn!(
                admin_id = decision.admin_id,
                "decision from non-administrator discarded"
            );
            return Err(RewardError::Unauthorized(decision.admin_id));
        }

        let outcome = match decision.kind {
            DecisionKind::ApproveVote => self.approve_vote(decision)?,
            DecisionKind::RejectVote => self.reject_vote(decision)?,
            DecisionKind::WithdrawalPaid => self.pay_withdrawal(decision)?,
            DecisionKind::WithdrawalInvalidCard => self.reject_withdrawal(decision)?,
        };

        match outcome {
            DecisionOutcome::Applied => {
                self.resolve_prompt(prompt, outcome_label(decision.kind));
            }
            DecisionOutcome::AlreadyResolved => {
                tracing::debug!(
                    participant_id = decision.participant_id,
                    key = %decision.key,
                    "duplicate decision ignored"
                );
            }
        }

        Ok(outcome)
    }

    fn approve_vote(&self, decision: &DecisionInput) -> Result<DecisionOutcome> {
        let applied = self
            .store
            .approve_vote(decision.participant_id, &decision.key)?;
        let outcome = match applied {
            Some(o) => o,
            None => return Ok(DecisionOutcome::AlreadyResolved),
        };

        tracing::info!(
            participant_id = decision.participant_id,
            credited = outcome.credited,
            balance = outcome.new_balance,
            "vote approved"
        );
        self.notifier.reply(
            decision.participant_id,
            &format!(
                "Your vote was approved!\n\nNote: your next vote is worth {} so'm.\n\nPress \"view balance\" to see your current balance.",
                pricing::next_rate(outcome.new_approved_count as u64),
            ),
        )?;
        Ok(DecisionOutcome::Applied)
    }

    fn reject_vote(&self, decision: &DecisionInput) -> Result<DecisionOutcome> {
        if !self
            .store
            .reject_vote(decision.participant_id, &decision.key)?
        {
            return Ok(DecisionOutcome::AlreadyResolved);
        }

        tracing::info!(participant_id = decision.participant_id, "vote rejected");
        self.notifier.reply(
            decision.participant_id,
            "Sorry, your vote was not approved. Please try again.",
        )?;
        Ok(DecisionOutcome::Applied)
    }

    fn pay_withdrawal(&self, decision: &DecisionInput) -> Result<DecisionOutcome> {
        let payout = self
            .store
            .complete_withdrawal(decision.participant_id, &decision.key)?;
        let payout = match payout {
            Some(p) => p,
            None => return Ok(DecisionOutcome::AlreadyResolved),
        };

        tracing::info!(
            participant_id = decision.participant_id,
            debited = payout.debited,
            remaining = payout.remaining_balance,
            "withdrawal paid"
        );
        self.notifier.reply(
            decision.participant_id,
            &format!(
                "💰 Your money was transferred to the card you provided!\nRemaining balance: {} so'm.",
                payout.remaining_balance,
            ),
        )?;
        Ok(DecisionOutcome::Applied)
    }

    fn reject_withdrawal(&self, decision: &DecisionInput) -> Result<DecisionOutcome> {
        if !self
            .store
            .reject_withdrawal(decision.participant_id, &decision.key)?
        {
            return Ok(DecisionOutcome::AlreadyResolved);
        }

        tracing::info!(
            participant_id = decision.participant_id,
            "withdrawal card marked invalid"
        );
        self.notifier.reply(
            decision.participant_id,
            "❌ Sorry, the card number you entered is wrong. Press \"withdraw\" and try again.",
        )?;
        Ok(DecisionOutcome::Applied)
    }

    /// Write the outcome back to the original prompt. On failure the
    /// edit is abandoned and a fresh status notice is posted instead.
    fn resolve_prompt(&self, prompt: Option<&PromptHandle>, label: &str) {
        let Some(handle) = prompt else { return };
        if let Err(e) = self.notifier.update_prompt(handle, label) {
            tracing::warn!("prompt edit failed, posting notice instead: {e}");
            if let Err(e) = self.notifier.post_notice(label) {
                tracing::warn!("fallback notice also failed: {e}");
            }
        }
    }
}

fn outcome_label(kind: DecisionKind) -> &'static str {
    match kind {
        DecisionKind::ApproveVote => "✅ Approved",
        DecisionKind::RejectVote => "❌ Rejected",
        DecisionKind::WithdrawalPaid => "✅ Paid",
        DecisionKind::WithdrawalInvalidCard => "❌ Wrong card",
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{RecordingNotifier, StaticAdminDirectory};

    const ADMIN: i64 = 100;
    const OUTSIDER: i64 = 999;

    fn ledger() -> (ModerationLedger, Store, RecordingNotifier) {
        let store = Store::open_in_memory().unwrap();
        let notifier = RecordingNotifier::new();
        let ledger = ModerationLedger::new(
            store.clone(),
            Arc::new(notifier.clone()),
            Arc::new(StaticAdminDirectory::new(vec![ADMIN])),
        );
        (ledger, store, notifier)
    }

    fn decision(kind: DecisionKind, participant_id: i64, key: &str) -> DecisionInput {
        DecisionInput {
            admin_id: ADMIN,
            kind,
            participant_id,
            key: key.to_string(),
        }
    }

    fn submit_vote(store: &Store, participant_id: i64, proof: &str) {
        store.upsert_account(participant_id, "Aziz", None).unwrap();
        store.create_pending_vote(participant_id, proof, "file").unwrap();
    }

    #[test]
    fn test_approve_credits_and_notifies_next_rate() {
        let (ledger, store, notifier) = ledger();
        submit_vote(&store, 1, "+998901234567");

        let outcome = ledger
            .process(&decision(DecisionKind::ApproveVote, 1, "+998901234567"), None)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Applied);
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 10_000);

        // Approval message previews the 2nd-vote rate
        let reply = notifier.last_reply_to(1).unwrap();
        assert!(reply.contains("12000 so'm"));
    }

    #[test]
    fn test_duplicate_approve_is_noop() {
        let (ledger, store, notifier) = ledger();
        submit_vote(&store, 1, "+998901234567");
        let d = decision(DecisionKind::ApproveVote, 1, "+998901234567");

        assert_eq!(ledger.process(&d, None).unwrap(), DecisionOutcome::Applied);
        assert_eq!(
            ledger.process(&d, None).unwrap(),
            DecisionOutcome::AlreadyResolved
        );

        // Credited exactly once, notified exactly once
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 10_000);
        assert_eq!(notifier.replies().len(), 1);
    }

    #[test]
    fn test_unauthorized_decision_mutates_nothing() {
        let (ledger, store, notifier) = ledger();
        submit_vote(&store, 1, "+998901234567");

        let mut d = decision(DecisionKind::ApproveVote, 1, "+998901234567");
        d.admin_id = OUTSIDER;

        let err = ledger.process(&d, None).unwrap_err();
        assert!(matches!(err, RewardError::Unauthorized(OUTSIDER)));
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 0);
        assert!(notifier.replies().is_empty());
    }

    #[test]
    fn test_reject_leaves_balance_and_notifies() {
        let (ledger, store, notifier) = ledger();
        submit_vote(&store, 1, "+998901234567");

        let outcome = ledger
            .process(&decision(DecisionKind::RejectVote, 1, "+998901234567"), None)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Applied);
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 0);
        assert!(notifier.last_reply_to(1).unwrap().contains("not approved"));
    }

    #[test]
    fn test_paid_debits_snapshot_and_reports_remaining() {
        let (ledger, store, notifier) = ledger();
        store.upsert_account(1, "Aziz", None).unwrap();
        for k in 0..5 {
            let proof = format!("+99890000000{}", k);
            store.create_pending_vote(1, &proof, "file").unwrap();
            ledger
                .process(&decision(DecisionKind::ApproveVote, 1, &proof), None)
                .unwrap();
        }
        store.create_withdrawal(1, "8600123412341234").unwrap();

        // A 6th approval lands while the request is pending
        store.create_pending_vote(1, "+998977777777", "file").unwrap();
        ledger
            .process(&decision(DecisionKind::ApproveVote, 1, "+998977777777"), None)
            .unwrap();

        let outcome = ledger
            .process(
                &decision(DecisionKind::WithdrawalPaid, 1, "8600123412341234"),
                None,
            )
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Applied);
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 20_000);
        assert!(notifier.last_reply_to(1).unwrap().contains("20000 so'm"));

        // Duplicate paid decision is silent
        let again = ledger
            .process(
                &decision(DecisionKind::WithdrawalPaid, 1, "8600123412341234"),
                None,
            )
            .unwrap();
        assert_eq!(again, DecisionOutcome::AlreadyResolved);
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 20_000);
    }

    #[test]
    fn test_invalid_card_keeps_balance() {
        let (ledger, store, notifier) = ledger();
        submit_vote(&store, 1, "+998901234567");
        ledger
            .process(&decision(DecisionKind::ApproveVote, 1, "+998901234567"), None)
            .unwrap();
        store.create_withdrawal(1, "8600123412341234").unwrap();

        let outcome = ledger
            .process(
                &decision(DecisionKind::WithdrawalInvalidCard, 1, "8600123412341234"),
                None,
            )
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Applied);
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 10_000);
        assert!(notifier.last_reply_to(1).unwrap().contains("wrong"));
    }

    #[test]
    fn test_prompt_updated_on_applied_decision() {
        let (ledger, store, notifier) = ledger();
        submit_vote(&store, 1, "+998901234567");
        let handle = "prompt-1".to_string();

        ledger
            .process(
                &decision(DecisionKind::ApproveVote, 1, "+998901234567"),
                Some(&handle),
            )
            .unwrap();
        assert_eq!(
            notifier.updates(),
            vec![("prompt-1".to_string(), "✅ Approved".to_string())]
        );
    }

    #[test]
    fn test_prompt_edit_failure_falls_back_to_notice() {
        let (ledger, store, notifier) = ledger();
        submit_vote(&store, 1, "+998901234567");
        notifier.fail_updates();
        let handle = "prompt-1".to_string();

        let outcome = ledger
            .process(
                &decision(DecisionKind::ApproveVote, 1, "+998901234567"),
                Some(&handle),
            )
            .unwrap();

        // The failed edit is non-fatal and compensated with a notice
        assert_eq!(outcome, DecisionOutcome::Applied);
        assert_eq!(notifier.notices(), vec!["✅ Approved".to_string()]);
    }

    #[test]
    fn test_noop_produces_no_reply_or_edit() {
        let (ledger, _store, notifier) = ledger();
        let handle = "prompt-1".to_string();

        let outcome = ledger
            .process(
                &decision(DecisionKind::ApproveVote, 42, "+998901234567"),
                Some(&handle),
            )
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::AlreadyResolved);
        assert!(notifier.replies().is_empty());
        assert!(notifier.updates().is_empty());
    }
}
