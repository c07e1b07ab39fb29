// 🗄️ Persistent store - accounts, votes, withdrawals
//
// Three logical collections backed by SQLite (WAL mode). Every mutation
// that touches a status field together with a balance runs inside one
// SQLite transaction, with a compare-and-swap on `status = 'pending'`
// as the serialization point. Duplicate submission and the
// single-pending-withdrawal rule are enforced by UNIQUE indexes, so the
// check and the insert are one atomic step.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, RewardError};
use crate::pricing;

// ============================================================================
// RECORD TYPES
// ============================================================================

/// Durable record per participant.
///
/// Balance and counters are mutated only by the moderation ledger;
/// name and identity metadata only by registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable record identity (UUID) - never changes
    pub id: String,
    /// Opaque transport identity (chat user id)
    pub participant_id: i64,
    pub display_name: String,
    pub username: Option<String>,
    /// Minor currency units; never negative
    pub balance: i64,
    pub approved_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteStatus {
    Pending,
    Approved,
    Rejected,
}

impl VoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteStatus::Pending => "pending",
            VoteStatus::Approved => "approved",
            VoteStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> rusqlite::Result<Self> {
        match s {
            "pending" => Ok(VoteStatus::Pending),
            "approved" => Ok(VoteStatus::Approved),
            "rejected" => Ok(VoteStatus::Rejected),
            _ => Err(rusqlite::Error::InvalidQuery),
        }
    }
}

/// One unit of proof submission awaiting or holding a moderation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: String,
    pub participant_id: i64,
    pub proof: String,
    pub evidence_ref: String,
    pub status: VoteStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> rusqlite::Result<Self> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "completed" => Ok(WithdrawalStatus::Completed),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            _ => Err(rusqlite::Error::InvalidQuery),
        }
    }
}

/// Withdrawal request with the amount snapshotted at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub participant_id: i64,
    pub destination: String,
    /// Balance snapshot at request time; never re-read at resolution
    pub amount: i64,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
}

/// Result of an approved vote applied by the ledger.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalOutcome {
    pub credited: i64,
    pub new_balance: i64,
    pub new_approved_count: i64,
}

/// Result of a paid withdrawal applied by the ledger.
#[derive(Debug, Clone, Copy)]
pub struct PayoutOutcome {
    pub debited: i64,
    pub remaining_balance: i64,
}

/// Audit trail entry. Every balance-relevant mutation leaves one, with
/// a JSON payload describing what moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub participant_id: i64,
    pub data: serde_json::Value,
}

// ============================================================================
// STORE
// ============================================================================

/// Repository over the three collections. Cloneable; clones share one
/// connection behind a mutex.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RewardError::Store(anyhow::anyhow!("store mutex poisoned")))
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    /// Create the account on first registration, or rename it on repeat
    /// /start. Balance and counters are untouched on rename.
    pub fn upsert_account(
        &self,
        participant_id: i64,
        display_name: &str,
        username: Option<&str>,
    ) -> Result<Account> {
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE accounts SET display_name = ?1, username = ?2 WHERE participant_id = ?3",
            params![display_name, username, participant_id],
        )?;

        if updated == 0 {
            conn.execute(
                "INSERT INTO accounts (
                    account_uuid, participant_id, display_name, username,
                    balance, approved_count, created_at
                ) VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    participant_id,
                    display_name,
                    username,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }

        drop(conn);
        self.get_account(participant_id)?
            .ok_or_else(|| RewardError::Store(anyhow::anyhow!("account vanished after upsert")))
    }

    pub fn get_account(&self, participant_id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT account_uuid, participant_id, display_name, username,
                        balance, approved_count, created_at
                 FROM accounts WHERE participant_id = ?1",
                params![participant_id],
                map_account,
            )
            .optional()?;
        Ok(account)
    }

    // ------------------------------------------------------------------------
    // Votes
    // ------------------------------------------------------------------------

    /// Best-effort uniqueness probe used while prompting for evidence.
    ///
    /// The authoritative check is the atomic insert in
    /// `create_pending_vote`; this one exists so duplicates are caught
    /// before the participant is asked for a screenshot.
    pub fn proof_available(&self, proof: &str) -> Result<bool> {
        let conn = self.conn()?;
        let taken: i64 = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM used_proofs WHERE proof = ?1)
                  + (SELECT COUNT(*) FROM votes WHERE proof = ?1 AND status != 'rejected')",
            params![proof],
            |row| row.get(0),
        )?;
        Ok(taken == 0)
    }

    /// Atomic check-and-insert of a pending vote.
    ///
    /// The proof must not appear in any account's used-proof set, nor in
    /// any pending-or-approved vote. Both checks and the insert run in
    /// one transaction; the partial UNIQUE index on active proofs turns
    /// a concurrent duplicate into a constraint violation.
    pub fn create_pending_vote(
        &self,
        participant_id: i64,
        proof: &str,
        evidence_ref: &str,
    ) -> Result<VoteRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;

        let used: i64 = tx.query_row(
            "SELECT COUNT(*) FROM used_proofs WHERE proof = ?1",
            params![proof],
            |row| row.get(0),
        )?;
        if used > 0 {
            return Err(RewardError::DuplicateProof(proof.to_string()));
        }

        let vote_uuid = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let insert = tx.execute(
            "INSERT INTO votes (
                vote_uuid, participant_id, proof, evidence_ref, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                vote_uuid,
                participant_id,
                proof,
                evidence_ref,
                created_at.to_rfc3339(),
            ],
        );

        match insert {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(RewardError::DuplicateProof(proof.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        record_audit(
            &tx,
            "vote_submitted",
            participant_id,
            serde_json::json!({ "proof": proof, "evidence_ref": evidence_ref }),
        )?;

        tx.commit().context("failed to commit pending vote")?;

        Ok(VoteRecord {
            id: vote_uuid,
            participant_id,
            proof: proof.to_string(),
            evidence_ref: evidence_ref.to_string(),
            status: VoteStatus::Pending,
            created_at,
        })
    }

    /// Approve the unique pending vote matching (participant, proof).
    ///
    /// Returns `Ok(None)` when no such pending vote exists - the
    /// idempotency guard for duplicate decision delivery. On success the
    /// status flip, the balance credit, the counter increment and the
    /// used-proof insert commit as one transaction.
    pub fn approve_vote(&self, participant_id: i64, proof: &str) -> Result<Option<ApprovalOutcome>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;

        let flipped = tx.execute(
            "UPDATE votes SET status = 'approved'
             WHERE participant_id = ?1 AND proof = ?2 AND status = 'pending'",
            params![participant_id, proof],
        )?;
        if flipped == 0 {
            return Ok(None);
        }

        let approved_count: i64 = tx.query_row(
            "SELECT approved_count FROM accounts WHERE participant_id = ?1",
            params![participant_id],
            |row| row.get(0),
        )?;

        let new_count = approved_count + 1;
        let credited = pricing::rate(new_count as u64);

        tx.execute(
            "UPDATE accounts SET balance = balance + ?1, approved_count = ?2
             WHERE participant_id = ?3",
            params![credited, new_count, participant_id],
        )?;

        tx.execute(
            "INSERT OR IGNORE INTO used_proofs (proof, participant_id, added_at)
             VALUES (?1, ?2, ?3)",
            params![proof, participant_id, Utc::now().to_rfc3339()],
        )?;

        let new_balance: i64 = tx.query_row(
            "SELECT balance FROM accounts WHERE participant_id = ?1",
            params![participant_id],
            |row| row.get(0),
        )?;

        record_audit(
            &tx,
            "vote_approved",
            participant_id,
            serde_json::json!({
                "proof": proof,
                "credited": credited,
                "new_balance": new_balance,
            }),
        )?;

        tx.commit().context("failed to commit vote approval")?;

        Ok(Some(ApprovalOutcome {
            credited,
            new_balance,
            new_approved_count: new_count,
        }))
    }

    /// Reject the unique pending vote matching (participant, proof).
    ///
    /// Returns `Ok(false)` when already resolved or unknown. No balance
    /// effect; the proof becomes reusable.
    pub fn reject_vote(&self, participant_id: i64, proof: &str) -> Result<bool> {
        let conn = self.conn()?;
        let flipped = conn.execute(
            "UPDATE votes SET status = 'rejected'
             WHERE participant_id = ?1 AND proof = ?2 AND status = 'pending'",
            params![participant_id, proof],
        )?;
        if flipped > 0 {
            record_audit(
                &conn,
                "vote_rejected",
                participant_id,
                serde_json::json!({ "proof": proof }),
            )?;
        }
        Ok(flipped > 0)
    }

    pub fn get_vote(&self, participant_id: i64, proof: &str) -> Result<Option<VoteRecord>> {
        let conn = self.conn()?;
        let vote = conn
            .query_row(
                "SELECT vote_uuid, participant_id, proof, evidence_ref, status, created_at
                 FROM votes WHERE participant_id = ?1 AND proof = ?2
                 ORDER BY id DESC LIMIT 1",
                params![participant_id, proof],
                map_vote,
            )
            .optional()?;
        Ok(vote)
    }

    // ------------------------------------------------------------------------
    // Withdrawals
    // ------------------------------------------------------------------------

    /// Create a pending withdrawal snapshotting the current balance.
    ///
    /// The balance read and the insert share one transaction; the
    /// partial UNIQUE index on (participant, pending) turns a concurrent
    /// second request into `WithdrawalAlreadyPending`.
    pub fn create_withdrawal(
        &self,
        participant_id: i64,
        destination: &str,
    ) -> Result<WithdrawalRequest> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;

        let balance: i64 = tx
            .query_row(
                "SELECT balance FROM accounts WHERE participant_id = ?1",
                params![participant_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RewardError::NotRegistered(participant_id))?;

        if balance <= 0 {
            return Err(RewardError::InsufficientBalance(participant_id));
        }

        let withdrawal_uuid = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let insert = tx.execute(
            "INSERT INTO withdrawals (
                withdrawal_uuid, participant_id, destination, amount, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                withdrawal_uuid,
                participant_id,
                destination,
                balance,
                created_at.to_rfc3339(),
            ],
        );

        match insert {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(RewardError::WithdrawalAlreadyPending(participant_id));
            }
            Err(e) => return Err(e.into()),
        }

        record_audit(
            &tx,
            "withdrawal_requested",
            participant_id,
            serde_json::json!({ "destination": destination, "amount": balance }),
        )?;

        tx.commit().context("failed to commit withdrawal request")?;

        Ok(WithdrawalRequest {
            id: withdrawal_uuid,
            participant_id,
            destination: destination.to_string(),
            amount: balance,
            status: WithdrawalStatus::Pending,
            created_at,
        })
    }

    pub fn has_pending_withdrawal(&self, participant_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM withdrawals
             WHERE participant_id = ?1 AND status = 'pending'",
            params![participant_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Mark the pending withdrawal matching (participant, destination)
    /// as paid and debit exactly the snapshot amount.
    ///
    /// Returns `Ok(None)` when already resolved or unknown (idempotency
    /// guard). The status flip and the debit commit together.
    pub fn complete_withdrawal(
        &self,
        participant_id: i64,
        destination: &str,
    ) -> Result<Option<PayoutOutcome>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("failed to begin transaction")?;

        let pending: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, amount FROM withdrawals
                 WHERE participant_id = ?1 AND destination = ?2 AND status = 'pending'",
                params![participant_id, destination],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (row_id, amount) = match pending {
            Some(found) => found,
            None => return Ok(None),
        };

        let flipped = tx.execute(
            "UPDATE withdrawals SET status = 'completed'
             WHERE id = ?1 AND status = 'pending'",
            params![row_id],
        )?;
        if flipped == 0 {
            return Ok(None);
        }

        // Debit the snapshot amount, never the whole balance
        tx.execute(
            "UPDATE accounts SET balance = balance - ?1 WHERE participant_id = ?2",
            params![amount, participant_id],
        )?;

        let remaining: i64 = tx.query_row(
            "SELECT balance FROM accounts WHERE participant_id = ?1",
            params![participant_id],
            |row| row.get(0),
        )?;

        record_audit(
            &tx,
            "withdrawal_paid",
            participant_id,
            serde_json::json!({
                "destination": destination,
                "debited": amount,
                "remaining_balance": remaining,
            }),
        )?;

        tx.commit().context("failed to commit withdrawal payout")?;

        Ok(Some(PayoutOutcome {
            debited: amount,
            remaining_balance: remaining,
        }))
    }

    /// Mark the pending withdrawal as rejected (bad destination).
    ///
    /// No balance effect; the participant may request again.
    pub fn reject_withdrawal(&self, participant_id: i64, destination: &str) -> Result<bool> {
        let conn = self.conn()?;
        let flipped = conn.execute(
            "UPDATE withdrawals SET status = 'rejected'
             WHERE participant_id = ?1 AND destination = ?2 AND status = 'pending'",
            params![participant_id, destination],
        )?;
        if flipped > 0 {
            record_audit(
                &conn,
                "withdrawal_rejected",
                participant_id,
                serde_json::json!({ "destination": destination }),
            )?;
        }
        Ok(flipped > 0)
    }

    pub fn get_withdrawal(
        &self,
        participant_id: i64,
        destination: &str,
    ) -> Result<Option<WithdrawalRequest>> {
        let conn = self.conn()?;
        let request = conn
            .query_row(
                "SELECT withdrawal_uuid, participant_id, destination, amount, status, created_at
                 FROM withdrawals
                 WHERE participant_id = ?1 AND destination = ?2
                 ORDER BY id DESC LIMIT 1",
                params![participant_id, destination],
                map_withdrawal,
            )
            .optional()?;
        Ok(request)
    }

    // ------------------------------------------------------------------------
    // Operator status
    // ------------------------------------------------------------------------

    /// Audit trail for one participant, newest first.
    pub fn audit_events(&self, participant_id: i64) -> Result<Vec<AuditEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, timestamp, event_type, participant_id, data
             FROM audit_events
             WHERE participant_id = ?1
             ORDER BY id DESC",
        )?;
        let events = stmt
            .query_map(params![participant_id], map_audit)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Test hook: remove a table so later calls hit storage failures.
    #[cfg(test)]
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(&format!("DROP TABLE {}", name))
            .context("failed to drop table")?;
        Ok(())
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn()?;
        let accounts: i64 =
            conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        let pending_votes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM votes WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        let pending_withdrawals: i64 = conn.query_row(
            "SELECT COUNT(*) FROM withdrawals WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreCounts {
            accounts,
            pending_votes,
            pending_withdrawals,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreCounts {
    pub accounts: i64,
    pub pending_votes: i64,
    pub pending_withdrawals: i64,
}

// ============================================================================
// SCHEMA
// ============================================================================

fn setup_database(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL mode")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_uuid TEXT UNIQUE NOT NULL,
            participant_id INTEGER UNIQUE NOT NULL,
            display_name TEXT NOT NULL,
            username TEXT,
            balance INTEGER NOT NULL DEFAULT 0,
            approved_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create accounts table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vote_uuid TEXT UNIQUE NOT NULL,
            participant_id INTEGER NOT NULL,
            proof TEXT NOT NULL,
            evidence_ref TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create votes table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS withdrawals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            withdrawal_uuid TEXT UNIQUE NOT NULL,
            participant_id INTEGER NOT NULL,
            destination TEXT NOT NULL,
            amount INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create withdrawals table")?;

    // Proofs consumed by an approved submission lineage
    conn.execute(
        "CREATE TABLE IF NOT EXISTS used_proofs (
            proof TEXT PRIMARY KEY,
            participant_id INTEGER NOT NULL,
            added_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create used_proofs table")?;

    // A proof may appear in at most one pending-or-approved vote,
    // system-wide. Rejected votes release the proof.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_votes_active_proof
         ON votes(proof) WHERE status != 'rejected'",
        [],
    )
    .context("failed to create active proof index")?;

    // At most one pending withdrawal per participant
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_withdrawals_single_pending
         ON withdrawals(participant_id) WHERE status = 'pending'",
        [],
    )
    .context("failed to create pending withdrawal index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_votes_participant ON votes(participant_id)",
        [],
    )
    .context("failed to create vote participant index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            participant_id INTEGER NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create audit_events table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_participant
         ON audit_events(participant_id)",
        [],
    )
    .context("failed to create audit participant index")?;

    Ok(())
}

/// Append one audit entry. Takes any connection-like handle so callers
/// inside a transaction write through that transaction.
fn record_audit(
    conn: &Connection,
    event_type: &str,
    participant_id: i64,
    data: serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO audit_events (event_id, timestamp, event_type, participant_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::new_v4().to_string(),
            Utc::now().to_rfc3339(),
            event_type,
            participant_id,
            data.to_string(),
        ],
    )?;
    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_timestamp(value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

fn map_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        participant_id: row.get(1)?,
        display_name: row.get(2)?,
        username: row.get(3)?,
        balance: row.get(4)?,
        approved_count: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?)?,
    })
}

fn map_vote(row: &rusqlite::Row<'_>) -> rusqlite::Result<VoteRecord> {
    let status: String = row.get(4)?;
    Ok(VoteRecord {
        id: row.get(0)?,
        participant_id: row.get(1)?,
        proof: row.get(2)?,
        evidence_ref: row.get(3)?,
        status: VoteStatus::parse(&status)?,
        created_at: parse_timestamp(row.get(5)?)?,
    })
}

fn map_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let data_json: String = row.get(4)?;
    Ok(AuditEvent {
        event_id: row.get(0)?,
        timestamp: parse_timestamp(row.get(1)?)?,
        event_type: row.get(2)?,
        participant_id: row.get(3)?,
        data: serde_json::from_str(&data_json).map_err(|_| rusqlite::Error::InvalidQuery)?,
    })
}

fn map_withdrawal(row: &rusqlite::Row<'_>) -> rusqlite::Result<WithdrawalRequest> {
    let status: String = row.get(4)?;
    Ok(WithdrawalRequest {
        id: row.get(0)?,
        participant_id: row.get(1)?,
        destination: row.get(2)?,
        amount: row.get(3)?,
        status: WithdrawalStatus::parse(&status)?,
        created_at: parse_timestamp(row.get(5)?)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn register(store: &Store, participant_id: i64, name: &str) -> Account {
        store.upsert_account(participant_id, name, None).unwrap()
    }

    #[test]
    fn test_upsert_creates_then_renames() {
        let store = test_store();
        let created = register(&store, 1, "Aziz");
        assert_eq!(created.balance, 0);
        assert_eq!(created.approved_count, 0);

        let renamed = store.upsert_account(1, "Aziza", Some("aziza")).unwrap();
        assert_eq!(renamed.id, created.id);
        assert_eq!(renamed.display_name, "Aziza");
        assert_eq!(renamed.username.as_deref(), Some("aziza"));
        assert_eq!(renamed.balance, 0);
    }

    #[test]
    fn test_pending_vote_then_approve_credits_once() {
        let store = test_store();
        register(&store, 1, "Aziz");
        store.create_pending_vote(1, "+998901234567", "file-1").unwrap();

        let outcome = store.approve_vote(1, "+998901234567").unwrap().unwrap();
        assert_eq!(outcome.credited, 10_000);
        assert_eq!(outcome.new_balance, 10_000);
        assert_eq!(outcome.new_approved_count, 1);

        // Duplicate delivery of the same decision is a no-op
        assert!(store.approve_vote(1, "+998901234567").unwrap().is_none());
        let account = store.get_account(1).unwrap().unwrap();
        assert_eq!(account.balance, 10_000);
        assert_eq!(account.approved_count, 1);
    }

    #[test]
    fn test_proof_available_probe() {
        let store = test_store();
        register(&store, 1, "Aziz");
        assert!(store.proof_available("+998901234567").unwrap());

        store.create_pending_vote(1, "+998901234567", "file").unwrap();
        assert!(!store.proof_available("+998901234567").unwrap());

        store.reject_vote(1, "+998901234567").unwrap();
        assert!(store.proof_available("+998901234567").unwrap());

        store.create_pending_vote(1, "+998901234567", "file").unwrap();
        store.approve_vote(1, "+998901234567").unwrap();
        assert!(!store.proof_available("+998901234567").unwrap());
    }

    #[test]
    fn test_duplicate_proof_rejected_while_pending() {
        let store = test_store();
        register(&store, 1, "Aziz");
        register(&store, 2, "Bek");
        store.create_pending_vote(1, "+998901234567", "file-1").unwrap();

        let err = store
            .create_pending_vote(2, "+998901234567", "file-2")
            .unwrap_err();
        assert!(matches!(err, RewardError::DuplicateProof(_)));
    }

    #[test]
    fn test_duplicate_proof_rejected_after_approval() {
        let store = test_store();
        register(&store, 1, "Aziz");
        register(&store, 2, "Bek");
        store.create_pending_vote(1, "+998901234567", "file-1").unwrap();
        store.approve_vote(1, "+998901234567").unwrap();

        // Used-proof set blocks reuse even by another participant
        let err = store
            .create_pending_vote(2, "+998901234567", "file-2")
            .unwrap_err();
        assert!(matches!(err, RewardError::DuplicateProof(_)));
    }

    #[test]
    fn test_rejected_vote_releases_proof() {
        let store = test_store();
        register(&store, 1, "Aziz");
        store.create_pending_vote(1, "+998901234567", "file-1").unwrap();
        assert!(store.reject_vote(1, "+998901234567").unwrap());
        // Second reject is a no-op
        assert!(!store.reject_vote(1, "+998901234567").unwrap());

        // Proof can be resubmitted after a rejection
        store.create_pending_vote(1, "+998901234567", "file-2").unwrap();
    }

    #[test]
    fn test_additive_balance_ladder() {
        let store = test_store();
        register(&store, 1, "Aziz");
        let expected = [10_000, 22_000, 36_000, 50_000, 70_000];
        for (k, want) in (1..=5).zip(expected) {
            let proof = format!("+99890123456{}", k);
            store.create_pending_vote(1, &proof, "file").unwrap();
            let outcome = store.approve_vote(1, &proof).unwrap().unwrap();
            assert_eq!(outcome.new_balance, want);
        }
    }

    #[test]
    fn test_withdrawal_snapshot_not_whole_balance() {
        let store = test_store();
        register(&store, 1, "Aziz");
        for k in 1..=5 {
            let proof = format!("+99890123456{}", k);
            store.create_pending_vote(1, &proof, "file").unwrap();
            store.approve_vote(1, &proof).unwrap();
        }

        let request = store.create_withdrawal(1, "8600123412341234").unwrap();
        assert_eq!(request.amount, 70_000);

        // A 6th approval lands while the request is pending
        store.create_pending_vote(1, "+998901234566", "file").unwrap();
        store.approve_vote(1, "+998901234566").unwrap();
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 90_000);

        let payout = store.complete_withdrawal(1, "8600123412341234").unwrap().unwrap();
        assert_eq!(payout.debited, 70_000);
        assert_eq!(payout.remaining_balance, 20_000);

        // Duplicate paid decision is a no-op
        assert!(store.complete_withdrawal(1, "8600123412341234").unwrap().is_none());
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 20_000);
    }

    #[test]
    fn test_single_pending_withdrawal() {
        let store = test_store();
        register(&store, 1, "Aziz");
        store.create_pending_vote(1, "+998901234567", "file").unwrap();
        store.approve_vote(1, "+998901234567").unwrap();

        store.create_withdrawal(1, "8600123412341234").unwrap();
        let err = store.create_withdrawal(1, "8600999912341234").unwrap_err();
        assert!(matches!(err, RewardError::WithdrawalAlreadyPending(_)));
        assert!(store.has_pending_withdrawal(1).unwrap());
    }

    #[test]
    fn test_withdrawal_requires_balance() {
        let store = test_store();
        register(&store, 1, "Aziz");
        let err = store.create_withdrawal(1, "8600123412341234").unwrap_err();
        assert!(matches!(err, RewardError::InsufficientBalance(_)));
    }

    #[test]
    fn test_rejected_withdrawal_keeps_balance() {
        let store = test_store();
        register(&store, 1, "Aziz");
        store.create_pending_vote(1, "+998901234567", "file").unwrap();
        store.approve_vote(1, "+998901234567").unwrap();
        store.create_withdrawal(1, "8600123412341234").unwrap();

        assert!(store.reject_withdrawal(1, "8600123412341234").unwrap());
        assert_eq!(store.get_account(1).unwrap().unwrap().balance, 10_000);
        assert!(!store.has_pending_withdrawal(1).unwrap());

        // A fresh request is allowed after rejection
        store.create_withdrawal(1, "8600999912341234").unwrap();
    }

    #[test]
    fn test_audit_trail_records_lifecycle() {
        let store = test_store();
        register(&store, 1, "Aziz");
        store.create_pending_vote(1, "+998901234567", "file").unwrap();
        store.approve_vote(1, "+998901234567").unwrap();
        store.create_withdrawal(1, "8600123412341234").unwrap();
        store.complete_withdrawal(1, "8600123412341234").unwrap();

        let events = store.audit_events(1).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        // Newest first
        assert_eq!(
            types,
            vec![
                "withdrawal_paid",
                "withdrawal_requested",
                "vote_approved",
                "vote_submitted",
            ]
        );

        let paid = &events[0];
        assert_eq!(paid.data["debited"], 10_000);
        assert_eq!(paid.data["remaining_balance"], 0);
        let approved = &events[2];
        assert_eq!(approved.data["credited"], 10_000);
        assert_eq!(approved.data["proof"], "+998901234567");
    }

    #[test]
    fn test_audit_trail_skips_noop_decisions() {
        let store = test_store();
        register(&store, 1, "Aziz");
        store.create_pending_vote(1, "+998901234567", "file").unwrap();
        store.reject_vote(1, "+998901234567").unwrap();
        // Duplicate delivery leaves no second entry
        store.reject_vote(1, "+998901234567").unwrap();

        let events = store.audit_events(1).unwrap();
        let rejected: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == "vote_rejected")
            .collect();
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_counts() {
        let store = test_store();
        register(&store, 1, "Aziz");
        store.create_pending_vote(1, "+998901234567", "file").unwrap();
        let counts = store.counts().unwrap();
        assert_eq!(counts.accounts, 1);
        assert_eq!(counts.pending_votes, 1);
        assert_eq!(counts.pending_withdrawals, 0);
    }
}
