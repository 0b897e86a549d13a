/// Deterministic conversation identity for two-party chats.
/// Canonical key: "{min_id}_{max_id}" — commutative by construction.
use crate::types::ConversationKey;

/// Separator between the two participant ids. Participant identifiers must
/// not contain it.
pub const KEY_SEPARATOR: char = '_';

/// Derive the stable key for the conversation between `a` and `b`.
///
/// Pure and commutative: `conversation_key(a, b) == conversation_key(b, a)`.
/// Self-chat (`a == b`) degenerates to a single-participant key; defined but
/// not a supported use case.
pub fn conversation_key(a: &str, b: &str) -> ConversationKey {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{}{}", lo, KEY_SEPARATOR, hi)
}

/// Split a conversation key back into its two participant ids.
pub fn participants(key: &str) -> Option<(String, String)> {
    key.split_once(KEY_SEPARATOR)
        .map(|(a, b)| (a.to_string(), b.to_string()))
}
