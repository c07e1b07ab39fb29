// 📨 Inbound event shapes + decision key codec
//
// The transport delivers three event classes: participant text,
// participant evidence (photo), and administrator decisions. Decisions
// carry a compact correlating token that round-trips through the
// moderation surface's callback data.

use serde::{Deserialize, Serialize};

// ============================================================================
// INBOUND EVENTS
// ============================================================================

/// Plain text from a participant (commands, menu presses, form input).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextInput {
    pub participant_id: i64,
    pub text: String,
}

/// Evidence payload from a participant (opaque file handle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceInput {
    pub participant_id: i64,
    pub evidence_ref: String,
}

/// Administrator decision against a pending record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInput {
    pub admin_id: i64,
    pub kind: DecisionKind,
    pub participant_id: i64,
    /// Proof identifier for vote decisions, destination for withdrawals.
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    ApproveVote,
    RejectVote,
    WithdrawalPaid,
    WithdrawalInvalidCard,
}

impl DecisionKind {
    /// Single-character discriminant for the wire token.
    ///
    /// One fixed character means kind discrimination can never misparse
    /// a payload containing the field separator.
    fn tag(&self) -> char {
        match self {
            DecisionKind::ApproveVote => 'a',
            DecisionKind::RejectVote => 'r',
            DecisionKind::WithdrawalPaid => 'p',
            DecisionKind::WithdrawalInvalidCard => 'w',
        }
    }

    fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'a' => Some(DecisionKind::ApproveVote),
            'r' => Some(DecisionKind::RejectVote),
            'p' => Some(DecisionKind::WithdrawalPaid),
            'w' => Some(DecisionKind::WithdrawalInvalidCard),
            _ => None,
        }
    }
}

// ============================================================================
// DECISION KEY CODEC
// ============================================================================

/// Wire form of a decision, minus the issuing admin (the transport
/// attaches the admin identity to the callback itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionKey {
    pub kind: DecisionKind,
    pub participant_id: i64,
    pub key: String,
}

impl DecisionKey {
    /// Encode as `<tag>:<participant>:<payload>`.
    ///
    /// The payload is the final field and is emitted verbatim;
    /// decoding splits into at most three parts, so a payload may
    /// itself contain `:` without corrupting the token.
    pub fn encode(&self) -> String {
        format!("{}:{}:{}", self.kind.tag(), self.participant_id, self.key)
    }

    pub fn decode(token: &str) -> Option<DecisionKey> {
        let mut parts = token.splitn(3, ':');
        let tag = parts.next()?;
        let participant = parts.next()?;
        let key = parts.next()?;

        let mut tag_chars = tag.chars();
        let tag_char = tag_chars.next()?;
        if tag_chars.next().is_some() {
            return None;
        }

        Some(DecisionKey {
            kind: DecisionKind::from_tag(tag_char)?,
            participant_id: participant.parse().ok()?,
            key: key.to_string(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let key = DecisionKey {
            kind: DecisionKind::ApproveVote,
            participant_id: 123456789,
            key: "+998901234567".to_string(),
        };
        let token = key.encode();
        assert_eq!(token, "a:123456789:+998901234567");
        assert_eq!(DecisionKey::decode(&token), Some(key));
    }

    #[test]
    fn test_decode_payload_containing_separator() {
        // The payload keeps its own separators intact
        let key = DecisionKey {
            kind: DecisionKind::WithdrawalInvalidCard,
            participant_id: 42,
            key: "8600:1234:5678:9012".to_string(),
        };
        let decoded = DecisionKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded.kind, DecisionKind::WithdrawalInvalidCard);
        assert_eq!(decoded.key, "8600:1234:5678:9012");
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        assert_eq!(DecisionKey::decode("x:42:+998901234567"), None);
        // Multi-character tag is not a valid discriminant
        assert_eq!(DecisionKey::decode("wrong_card:42:8600123412341234"), None);
    }

    #[test]
    fn test_decode_rejects_short_tokens() {
        assert_eq!(DecisionKey::decode(""), None);
        assert_eq!(DecisionKey::decode("a"), None);
        assert_eq!(DecisionKey::decode("a:42"), None);
        assert_eq!(DecisionKey::decode("a:notanumber:+998901234567"), None);
    }

    #[test]
    fn test_all_kinds_round_trip() {
        for kind in [
            DecisionKind::ApproveVote,
            DecisionKind::RejectVote,
            DecisionKind::WithdrawalPaid,
            DecisionKind::WithdrawalInvalidCard,
        ] {
            let key = DecisionKey {
                kind,
                participant_id: 7,
                key: "k".to_string(),
            };
            assert_eq!(DecisionKey::decode(&key.encode()), Some(key));
        }
    }
}
