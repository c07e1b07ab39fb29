// 🧭 Conversational dispatcher
//
// Routes inbound transport events through the session state machine and
// into the submission pipeline, the withdrawal workflow, or the
// moderation ledger. All domain errors are absorbed here and turned
// into participant-facing replies; only transport failures escape.

use anyhow::Result;
use std::sync::Arc;

use crate::error::RewardError;
use crate::events::{DecisionInput, EvidenceInput, TextInput};
use crate::ledger::{DecisionOutcome, ModerationLedger};
use crate::outbound::{AdminDirectory, Notifier, PromptHandle};
use crate::pricing;
use crate::session::{SessionStep, SessionStore};
use crate::store::Store;
use crate::submission::{validate_proof, SubmissionPipeline};
use crate::withdrawal::{validate_destination, WithdrawalWorkflow};

// ============================================================================
// MENU COMMANDS
// ============================================================================

pub const CMD_START: &str = "/start";
pub const MENU_BEGIN: &str = "🔗 Begin voting";
pub const MENU_CONFIRM: &str = "✅ Confirm vote";
pub const MENU_BALANCE: &str = "💰 View balance";
pub const MENU_WITHDRAW: &str = "💳 Withdraw";
pub const MENU_CANCEL: &str = "❌ Cancel";

// ============================================================================
// DISPATCHER
// ============================================================================

pub struct Dispatcher {
    store: Store,
    sessions: SessionStore,
    notifier: Arc<dyn Notifier>,
    submission: SubmissionPipeline,
    withdrawal: WithdrawalWorkflow,
    ledger: ModerationLedger,
    campaign_url: String,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        notifier: Arc<dyn Notifier>,
        admins: Arc<dyn AdminDirectory>,
        campaign_url: String,
    ) -> Self {
        Self {
            submission: SubmissionPipeline::new(store.clone(), notifier.clone()),
            withdrawal: WithdrawalWorkflow::new(store.clone(), notifier.clone()),
            ledger: ModerationLedger::new(store.clone(), notifier.clone(), admins),
            sessions: SessionStore::new(),
            store,
            notifier,
            campaign_url,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ------------------------------------------------------------------------
    // Text events
    // ------------------------------------------------------------------------

    pub fn handle_text(&self, event: &TextInput) -> Result<()> {
        let participant_id = event.participant_id;
        let text = event.text.trim();

        if text == CMD_START {
            self.sessions.set_step(participant_id, SessionStep::AwaitingName);
            return self
                .notifier
                .reply(participant_id, "Welcome! Please enter your name:");
        }

        if text == MENU_CANCEL {
            return self.cancel(participant_id);
        }

        let step = self.sessions.get(participant_id).step;
        let routed = match step {
            SessionStep::AwaitingName => self.register(participant_id, text),
            SessionStep::AwaitingProof => self.accept_proof(participant_id, text),
            SessionStep::AwaitingEvidence => {
                // Text while a screenshot is expected: re-prompt, keep state
                self.notifier
                    .reply(participant_id, "Please send a screenshot of your vote:")?;
                Ok(())
            }
            SessionStep::AwaitingDestination => self.accept_destination(participant_id, text),
            SessionStep::Idle => self.menu(participant_id, text),
        };

        self.absorb(participant_id, routed)
    }

    fn register(&self, participant_id: i64, name: &str) -> crate::error::Result<()> {
        let existing = self.store.get_account(participant_id)?.is_some();
        let account = self.store.upsert_account(participant_id, name, None)?;
        self.sessions.reset(participant_id);

        tracing::info!(participant_id, name = %account.display_name, existing, "participant registered");
        let greeting = if existing {
            "your name was updated"
        } else {
            "you are now registered"
        };
        self.notifier.reply(
            participant_id,
            &format!(
                "Thank you, {}! {}.\n\n🎯 Vote prices:\n{}\n\nUse the menu below.",
                account.display_name,
                greeting,
                pricing::schedule_lines().join("\n"),
            ),
        )?;
        Ok(())
    }

    fn menu(&self, participant_id: i64, text: &str) -> crate::error::Result<()> {
        match text {
            MENU_BEGIN => {
                self.notifier.reply(
                    participant_id,
                    &format!(
                        "Open the link below and vote for the campaign:\n{}\n\nOnce you have voted, press \"{}\" and send the details of your vote.",
                        self.campaign_url, MENU_CONFIRM,
                    ),
                )?;
                Ok(())
            }
            MENU_CONFIRM => {
                self.require_account(participant_id)?;
                self.sessions.set_step(participant_id, SessionStep::AwaitingProof);
                self.notifier.reply(
                    participant_id,
                    "Please enter the phone number you voted with (for example: +998901234567):",
                )?;
                Ok(())
            }
            MENU_BALANCE => self.show_balance(participant_id),
            MENU_WITHDRAW => {
                self.require_account(participant_id)?;
                let balance = self.withdrawal.entry(participant_id)?;
                self.sessions
                    .set_step(participant_id, SessionStep::AwaitingDestination);
                self.notifier.reply(
                    participant_id,
                    &format!(
                        "You have {} so'm available.\n\nEnter the card number to receive the money:",
                        balance,
                    ),
                )?;
                Ok(())
            }
            other => {
                // Unknown free text in idle is ignored, like any chat noise
                tracing::debug!(participant_id, text = other, "unrouted idle input");
                Ok(())
            }
        }
    }

    fn show_balance(&self, participant_id: i64) -> crate::error::Result<()> {
        let account = self.require_account(participant_id)?;
        self.notifier.reply(
            participant_id,
            &format!(
                "💰 Your balance: {} so'm\n🎯 Approved votes: {}\n💵 Next vote is worth: {} so'm\n\n🎯 Vote prices:\n{}",
                account.balance,
                account.approved_count,
                pricing::next_rate(account.approved_count as u64),
                pricing::schedule_lines().join("\n"),
            ),
        )?;
        Ok(())
    }

    fn accept_proof(&self, participant_id: i64, text: &str) -> crate::error::Result<()> {
        let proof = validate_proof(text)?;
        if !self.store.proof_available(&proof)? {
            return Err(RewardError::DuplicateProof(proof));
        }

        self.sessions.set_pending_proof(participant_id, &proof);
        self.sessions
            .set_step(participant_id, SessionStep::AwaitingEvidence);
        self.notifier
            .reply(participant_id, "Now send a screenshot of your vote:")?;
        Ok(())
    }

    fn accept_destination(&self, participant_id: i64, text: &str) -> crate::error::Result<()> {
        let destination = validate_destination(text)?;
        if let Err(e) = self.withdrawal.submit(participant_id, &destination) {
            // A lost insert race or drained balance ends the flow; only a
            // bad card number keeps the prompt open for another attempt
            if matches!(
                e,
                RewardError::WithdrawalAlreadyPending(_) | RewardError::InsufficientBalance(_)
            ) {
                self.sessions.reset(participant_id);
            }
            return Err(e);
        }
        self.sessions.reset(participant_id);
        self.notifier.reply(
            participant_id,
            "Your request was received. The money will be transferred once an administrator reviews it.",
        )?;
        Ok(())
    }

    fn cancel(&self, participant_id: i64) -> Result<()> {
        let step = self.sessions.get(participant_id).step;
        if !step.is_awaiting() {
            // Cancel while idle is a no-op
            return Ok(());
        }

        let message = if step == SessionStep::AwaitingDestination {
            "Withdrawal cancelled."
        } else {
            "Vote submission cancelled."
        };
        self.sessions.reset(participant_id);
        self.notifier.reply(participant_id, message)
    }

    // ------------------------------------------------------------------------
    // Evidence events
    // ------------------------------------------------------------------------

    pub fn handle_evidence(&self, event: &EvidenceInput) -> Result<()> {
        let participant_id = event.participant_id;
        if self.sessions.get(participant_id).step != SessionStep::AwaitingEvidence {
            tracing::debug!(participant_id, "evidence outside submission flow ignored");
            return Ok(());
        }

        let Some(proof) = self.sessions.take_pending_proof(participant_id) else {
            // Scratch lost (restart mid-flow): restart the submission
            self.sessions.reset(participant_id);
            return self.notifier.reply(
                participant_id,
                &format!("Something went wrong. Press \"{}\" to start again.", MENU_CONFIRM),
            );
        };

        let routed = match self.submission.submit(participant_id, &proof, &event.evidence_ref) {
            Ok(_) => {
                self.sessions.reset(participant_id);
                self.notifier.reply(
                    participant_id,
                    "Thank you! Your vote is being checked by an administrator and will be confirmed shortly.",
                )?;
                Ok(())
            }
            Err(RewardError::DuplicateProof(proof)) => {
                // Lost the race for this proof; ask for a new one
                self.sessions
                    .set_step(participant_id, SessionStep::AwaitingProof);
                Err(RewardError::DuplicateProof(proof))
            }
            Err(e) => Err(e),
        };

        self.absorb(participant_id, routed)
    }

    // ------------------------------------------------------------------------
    // Decision events
    // ------------------------------------------------------------------------

    /// Administrator decision, independent of any participant session.
    pub fn handle_decision(
        &self,
        event: &DecisionInput,
        prompt: Option<&PromptHandle>,
    ) -> Result<Option<DecisionOutcome>> {
        match self.ledger.process(event, prompt) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(RewardError::Unauthorized(admin_id)) => {
                // Reported to the issuer only
                self.notifier
                    .reply(admin_id, "Only administrators can resolve decisions!")?;
                Ok(None)
            }
            Err(RewardError::Store(e)) => {
                tracing::error!("store failure while processing decision: {e:#}");
                self.notifier
                    .reply(event.admin_id, "An error occurred. Please try again.")?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("decision discarded: {e}");
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Error absorption
    // ------------------------------------------------------------------------

    /// Turn a domain error into the participant-facing reply the state
    /// machine prescribes. State is left wherever the failing routine
    /// put it, so re-prompts keep the participant in place.
    fn absorb(&self, participant_id: i64, routed: crate::error::Result<()>) -> Result<()> {
        let message = match routed {
            Ok(()) => return Ok(()),
            Err(RewardError::InvalidProof(_)) => {
                "Wrong format. Please enter the phone number like +998901234567:".to_string()
            }
            Err(RewardError::InvalidDestination(_)) => {
                "Wrong format. Please enter a 16-digit card number:".to_string()
            }
            Err(RewardError::DuplicateProof(_)) => {
                "This phone number was already used for a vote. Please enter a different number:"
                    .to_string()
            }
            Err(RewardError::InsufficientBalance(_)) => {
                "Sorry, you have no funds available to withdraw.".to_string()
            }
            Err(RewardError::WithdrawalAlreadyPending(_)) => {
                "You already have a withdrawal request waiting for review.".to_string()
            }
            Err(RewardError::NotRegistered(_)) => {
                format!("You are not registered yet. Send {} first.", CMD_START)
            }
            Err(RewardError::Unauthorized(_)) => {
                // Participant routes never produce this
                "Only administrators can resolve decisions!".to_string()
            }
            Err(RewardError::Store(e)) => {
                tracing::error!(participant_id, "store failure: {e:#}");
                "An error occurred. Please try again.".to_string()
            }
        };
        self.notifier.reply(participant_id, &message)
    }

    fn require_account(&self, participant_id: i64) -> crate::error::Result<crate::store::Account> {
        self.store
            .get_account(participant_id)?
            .ok_or(RewardError::NotRegistered(participant_id))
    }
}

// ============================================================================
// TESTS
// ============================================================================
