// 📤 Outbound collaborator seams
//
// The chat transport and the administrator directory are external
// collaborators. The core only sees these two capabilities, injected
// at construction time, so tests substitute recording fakes.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::events::DecisionKey;

// ============================================================================
// MODERATION PROMPT
// ============================================================================

/// Moderation prompt forwarded to the administrator surface.
///
/// Carries exactly two resolution options; the keys round-trip through
/// the surface's callback data and come back as `DecisionInput`s.
#[derive(Debug, Clone)]
pub struct ModerationPrompt {
    pub body: String,
    /// Optional evidence handle to attach (vote prompts only).
    pub evidence_ref: Option<String>,
    pub accept: DecisionKey,
    pub reject: DecisionKey,
}

/// Handle to a delivered prompt, used for the post-resolution update.
pub type PromptHandle = String;

// ============================================================================
// TRAITS
// ============================================================================

/// Outbound side of the chat transport.
pub trait Notifier: Send + Sync {
    /// Plain reply to a participant.
    fn reply(&self, participant_id: i64, text: &str) -> Result<()>;

    /// Forward a moderation prompt to the administrator surface.
    fn send_prompt(&self, prompt: &ModerationPrompt) -> Result<PromptHandle>;

    /// Edit a delivered prompt to reflect the decision outcome.
    ///
    /// Best-effort: callers fall back to `post_notice` when this fails,
    /// so a failed edit is never authoritative state.
    fn update_prompt(&self, handle: &PromptHandle, outcome: &str) -> Result<()>;

    /// Post a fresh status notice to the administrator surface.
    fn post_notice(&self, text: &str) -> Result<()>;
}

/// Capability check against the moderation surface's membership.
pub trait AdminDirectory: Send + Sync {
    fn is_administrator(&self, admin_id: i64) -> Result<bool>;
}

// ============================================================================
// RECORDING FAKE (tests and local runs)
// ============================================================================

/// In-memory notifier that records everything it is asked to deliver.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    inner: Arc<Mutex<RecordingState>>,
}

#[derive(Default)]
struct RecordingState {
    replies: Vec<(i64, String)>,
    prompts: Vec<ModerationPrompt>,
    updates: Vec<(PromptHandle, String)>,
    notices: Vec<String>,
    /// When set, `update_prompt` fails to exercise the fallback path.
    fail_updates: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_updates(&self) {
        self.inner.lock().unwrap().fail_updates = true;
    }

    pub fn replies(&self) -> Vec<(i64, String)> {
        self.inner.lock().unwrap().replies.clone()
    }

    pub fn prompts(&self) -> Vec<ModerationPrompt> {
        self.inner.lock().unwrap().prompts.clone()
    }

    pub fn updates(&self) -> Vec<(PromptHandle, String)> {
        self.inner.lock().unwrap().updates.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.inner.lock().unwrap().notices.clone()
    }

    pub fn last_reply_to(&self, participant_id: i64) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .replies
            .iter()
            .rev()
            .find(|(id, _)| *id == participant_id)
            .map(|(_, text)| text.clone())
    }
}

impl Notifier for RecordingNotifier {
    fn reply(&self, participant_id: i64, text: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.replies.push((participant_id, text.to_string()));
        Ok(())
    }

    fn send_prompt(&self, prompt: &ModerationPrompt) -> Result<PromptHandle> {
        let mut state = self.inner.lock().unwrap();
        state.prompts.push(prompt.clone());
        Ok(format!("prompt-{}", state.prompts.len()))
    }

    fn update_prompt(&self, handle: &PromptHandle, outcome: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_updates {
            anyhow::bail!("prompt edit rejected by transport");
        }
        state.updates.push((handle.clone(), outcome.to_string()));
        Ok(())
    }

    fn post_notice(&self, text: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.notices.push(text.to_string());
        Ok(())
    }
}

/// Fixed administrator roster for tests and single-operator deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticAdminDirectory {
    admins: Vec<i64>,
}

impl StaticAdminDirectory {
    pub fn new(admins: Vec<i64>) -> Self {
        Self { admins }
    }
}

impl AdminDirectory for StaticAdminDirectory {
    fn is_administrator(&self, admin_id: i64) -> Result<bool> {
        Ok(self.admins.contains(&admin_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DecisionKey, DecisionKind};

    fn sample_prompt() -> ModerationPrompt {
        ModerationPrompt {
            body: "New vote".to_string(),
            evidence_ref: None,
            accept: DecisionKey {
                kind: DecisionKind::ApproveVote,
                participant_id: 1,
                key: "+998901234567".to_string(),
            },
            reject: DecisionKey {
                kind: DecisionKind::RejectVote,
                participant_id: 1,
                key: "+998901234567".to_string(),
            },
        }
    }

    #[test]
    fn test_recording_notifier_captures_traffic() {
        let notifier = RecordingNotifier::new();
        notifier.reply(7, "hello").unwrap();
        let handle = notifier.send_prompt(&sample_prompt()).unwrap();
        notifier.update_prompt(&handle, "approved").unwrap();

        assert_eq!(notifier.replies(), vec![(7, "hello".to_string())]);
        assert_eq!(notifier.prompts().len(), 1);
        assert_eq!(notifier.updates(), vec![(handle, "approved".to_string())]);
    }

    #[test]
    fn test_recording_notifier_can_fail_updates() {
        let notifier = RecordingNotifier::new();
        notifier.fail_updates();
        let handle = notifier.send_prompt(&sample_prompt()).unwrap();
        assert!(notifier.update_prompt(&handle, "approved").is_err());
        assert!(notifier.updates().is_empty());
    }

    #[test]
    fn test_static_admin_directory() {
        let dir = StaticAdminDirectory::new(vec![100, 200]);
        assert!(dir.is_administrator(100).unwrap());
        assert!(!dir.is_administrator(300).unwrap());
    }
}
