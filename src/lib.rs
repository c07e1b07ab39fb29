// Vote Rewards - Core Library
// Exposes all modules for use in the CLI, the intake server, and tests

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod ledger;
pub mod outbound;
pub mod pricing;
pub mod session;
pub mod store;
pub mod submission;
pub mod withdrawal;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{
    Dispatcher, CMD_START, MENU_BALANCE, MENU_BEGIN, MENU_CANCEL, MENU_CONFIRM, MENU_WITHDRAW,
};
pub use error::{Result, RewardError};
pub use events::{DecisionInput, DecisionKey, DecisionKind, EvidenceInput, TextInput};
pub use ledger::{DecisionOutcome, ModerationLedger};
pub use outbound::{
    AdminDirectory, ModerationPrompt, Notifier, PromptHandle, RecordingNotifier,
    StaticAdminDirectory,
};
pub use pricing::{next_rate, rate, schedule_lines, Tier, TIERS};
pub use session::{Session, SessionStep, SessionStore};
pub use store::{
    Account, ApprovalOutcome, PayoutOutcome, Store, StoreCounts, VoteRecord, VoteStatus,
    WithdrawalRequest, WithdrawalStatus,
};
pub use submission::{validate_proof, SubmissionPipeline};
pub use withdrawal::{validate_destination, WithdrawalWorkflow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
