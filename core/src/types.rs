/// Shared types for the conversation sync layer
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for an unordered pair of participants.
/// Derived by [`crate::conversation::conversation_key`].
pub type ConversationKey = String;

/// A message in a rendered conversation log.
///
/// Ordering is always `created_at` ascending; ties break on the
/// store-assigned insertion sequence `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id, unique within the conversation
    pub id: String,
    pub sender_id: String,
    pub text: String,
    /// Server-assigned creation time, immutable after creation
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Set on first edit, never reverts
    #[serde(default)]
    pub edited: bool,
    /// Store insertion order, used only to break `created_at` ties
    pub seq: u64,
}

/// A message as delivered inside a subscription snapshot.
///
/// `created_at` is `None` while the server timestamp marker is still
/// pending; such messages are withheld from the chronological log until a
/// later snapshot resolves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    /// Epoch milliseconds, or `None` for a pending server timestamp
    pub created_at: Option<i64>,
    #[serde(default)]
    pub edited: bool,
    pub seq: u64,
}

/// Denormalized per-conversation record (roster list previews).
///
/// Written as a merge on every successful send; `created_at` is set on the
/// first write and preserved by later merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationKey,
    pub participants: Vec<String>,
    pub last_message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Stored user directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Last presence heartbeat, absent for users that never signed in
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// A directory entry augmented with presence at fetch time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub is_online: bool,
}

/// Real-time events streamed to the UI (SSE /events endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The log for a conversation changed; re-read it via `get_log`
    LogUpdated { conversation_id: ConversationKey },
    /// The live subscription failed; the conversation view is stale
    SubscriptionFailed {
        conversation_id: ConversationKey,
        reason: String,
    },
}
