/// Remote store collaborator, modeled at its interface boundary:
/// document writes with server-assigned ids and timestamps, field-merge
/// updates, idempotent deletes, and per-conversation subscriptions that
/// deliver full ordered snapshots. Documents persist in sled; the transport
/// in front of this store is out of scope.
use crate::error::{ChatError, Result};
use crate::presence::FRESHNESS_WINDOW_MS;
use crate::session::CurrentUser;
use crate::types::{ConversationKey, ConversationSummary, RawMessage, UserProfile};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Snapshots buffered per subscriber before lag kicks in
const SNAPSHOT_BUFFER: usize = 64;

pub struct RemoteStore {
    db: sled::Db,
    messages: sled::Tree,
    summaries: sled::Tree,
    users: sled::Tree,
    watchers: Arc<RwLock<HashMap<ConversationKey, broadcast::Sender<Vec<RawMessage>>>>>,
}

impl RemoteStore {
    /// Open (or create) the store under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("remote.db"))
            .map_err(|e| ChatError::Storage(format!("Failed to open remote DB: {}", e)))?;
        let messages = db
            .open_tree("messages")
            .map_err(|e| ChatError::Storage(format!("messages tree: {}", e)))?;
        let summaries = db
            .open_tree("conversations")
            .map_err(|e| ChatError::Storage(format!("conversations tree: {}", e)))?;
        let users = db
            .open_tree("users")
            .map_err(|e| ChatError::Storage(format!("users tree: {}", e)))?;

        Ok(Self {
            db,
            messages,
            summaries,
            users,
            watchers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    // ─── Messages ────────────────────────────────────────────────────────

    fn message_key(conversation_id: &str, seq: u64) -> String {
        // Zero-padded seq keeps sled's key order aligned with insertion order
        format!("{}:{:020}", conversation_id, seq)
    }

    fn conversation_prefix(conversation_id: &str) -> String {
        format!("{}:", conversation_id)
    }

    /// Create a message document. The store assigns the id, the insertion
    /// sequence, and the creation timestamp — client timestamps are never
    /// trusted for ordering.
    pub async fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<RawMessage> {
        let seq = self
            .db
            .generate_id()
            .map_err(|e| ChatError::Storage(format!("generate_id: {}", e)))?;

        let msg = RawMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            created_at: Some(Utc::now().timestamp_millis()),
            edited: false,
            seq,
        };

        let val = serde_json::to_vec(&msg).map_err(ChatError::Serialization)?;
        self.messages
            .insert(Self::message_key(conversation_id, seq).as_bytes(), val)
            .map_err(|e| ChatError::Storage(format!("create_message: {}", e)))?;

        self.publish_snapshot(conversation_id).await?;
        Ok(msg)
    }

    /// Look a message up by id within one conversation
    pub fn get_message(&self, conversation_id: &str, message_id: &str) -> Result<Option<RawMessage>> {
        Ok(self
            .find_message(conversation_id, message_id)?
            .map(|(_, msg)| msg))
    }

    /// Field-merge `{text, edited: true}` onto an existing message.
    /// Returns `false` when the id is unknown in this conversation.
    pub async fn merge_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        new_text: &str,
    ) -> Result<bool> {
        let Some((key, mut msg)) = self.find_message(conversation_id, message_id)? else {
            return Ok(false);
        };

        msg.text = new_text.to_string();
        msg.edited = true;
        // created_at and seq stay untouched: an edit never reorders

        let val = serde_json::to_vec(&msg).map_err(ChatError::Serialization)?;
        self.messages
            .insert(key.as_bytes(), val)
            .map_err(|e| ChatError::Storage(format!("merge_message: {}", e)))?;

        self.publish_snapshot(conversation_id).await?;
        Ok(true)
    }

    /// Delete a message document. Deleting an unknown id is a success.
    pub async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let Some((key, _)) = self.find_message(conversation_id, message_id)? else {
            return Ok(());
        };

        self.messages
            .remove(key.as_bytes())
            .map_err(|e| ChatError::Storage(format!("delete_message: {}", e)))?;

        self.publish_snapshot(conversation_id).await?;
        Ok(())
    }

    /// Full ordered snapshot of one conversation: `created_at` ascending,
    /// ties broken by insertion sequence, pending timestamps last.
    pub fn snapshot(&self, conversation_id: &str) -> Result<Vec<RawMessage>> {
        let prefix = Self::conversation_prefix(conversation_id);
        let mut out = Vec::new();
        for entry in self.messages.scan_prefix(prefix.as_bytes()).flatten() {
            let (_, val) = entry;
            if let Ok(msg) = serde_json::from_slice::<RawMessage>(&val) {
                out.push(msg);
            }
        }
        out.sort_by(|a, b| {
            let ta = a.created_at.unwrap_or(i64::MAX);
            let tb = b.created_at.unwrap_or(i64::MAX);
            ta.cmp(&tb).then(a.seq.cmp(&b.seq))
        });
        Ok(out)
    }

    fn find_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Option<(String, RawMessage)>> {
        let prefix = Self::conversation_prefix(conversation_id);
        for entry in self.messages.scan_prefix(prefix.as_bytes()).flatten() {
            let (key, val) = entry;
            if let Ok(msg) = serde_json::from_slice::<RawMessage>(&val) {
                if msg.id == message_id {
                    return Ok(Some((String::from_utf8_lossy(&key).to_string(), msg)));
                }
            }
        }
        Ok(None)
    }

    // ─── Subscriptions ───────────────────────────────────────────────────

    /// Subscribe to a conversation: returns the current snapshot plus a
    /// receiver that gets a full snapshot after every subsequent mutation.
    pub async fn subscribe(
        &self,
        conversation_id: &str,
    ) -> Result<(Vec<RawMessage>, broadcast::Receiver<Vec<RawMessage>>)> {
        let rx = {
            let mut watchers = self.watchers.write().await;
            let sender = watchers
                .entry(conversation_id.to_string())
                .or_insert_with(|| broadcast::channel(SNAPSHOT_BUFFER).0);
            sender.subscribe()
        };
        // Receiver registered before the read: a mutation in between is
        // visible in the snapshot AND queued on the receiver — replaying a
        // wholesale snapshot is harmless.
        let initial = self.snapshot(conversation_id)?;
        Ok((initial, rx))
    }

    /// Live subscriber count for a conversation
    pub async fn watcher_count(&self, conversation_id: &str) -> usize {
        let watchers = self.watchers.read().await;
        watchers
            .get(conversation_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    async fn publish_snapshot(&self, conversation_id: &str) -> Result<()> {
        let watchers = self.watchers.read().await;
        if let Some(sender) = watchers.get(conversation_id) {
            let snap = self.snapshot(conversation_id)?;
            // No live receivers is fine
            let _ = sender.send(snap);
        }
        Ok(())
    }

    // ─── Conversation summaries ──────────────────────────────────────────

    /// Merge a summary update: participants, last message preview, and
    /// `updated_at` are overwritten; `created_at` survives from the first
    /// write.
    pub fn merge_summary(
        &self,
        conversation_id: &str,
        participants: Vec<String>,
        last_message: &str,
    ) -> Result<ConversationSummary> {
        let now = Utc::now();
        let summary = match self.get_summary(conversation_id)? {
            Some(mut existing) => {
                existing.participants = participants;
                existing.last_message = last_message.to_string();
                existing.updated_at = now;
                existing
            }
            None => ConversationSummary {
                conversation_id: conversation_id.to_string(),
                participants,
                last_message: last_message.to_string(),
                updated_at: now,
                created_at: now,
            },
        };

        let val = serde_json::to_vec(&summary).map_err(ChatError::Serialization)?;
        self.summaries
            .insert(conversation_id.as_bytes(), val)
            .map_err(|e| ChatError::Storage(format!("merge_summary: {}", e)))?;
        Ok(summary)
    }

    pub fn get_summary(&self, conversation_id: &str) -> Result<Option<ConversationSummary>> {
        match self
            .summaries
            .get(conversation_id.as_bytes())
            .map_err(|e| ChatError::Storage(format!("get_summary: {}", e)))?
        {
            Some(val) => {
                let s = serde_json::from_slice(&val).map_err(ChatError::Serialization)?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    // ─── User directory ──────────────────────────────────────────────────

    /// Register a sign-in: create the profile if needed and stamp a fresh
    /// presence heartbeat.
    pub fn record_sign_in(&self, user: &CurrentUser) -> Result<UserProfile> {
        let now = Utc::now();
        let profile = match self.get_user(&user.id)? {
            Some(mut existing) => {
                existing.display_name = user.display_name.clone();
                existing.last_seen = Some(now);
                existing
            }
            None => UserProfile {
                id: user.id.clone(),
                display_name: user.display_name.clone(),
                avatar_url: None,
                last_seen: Some(now),
                created_at: now,
            },
        };
        self.put_user(&profile)?;
        Ok(profile)
    }

    /// All profiles in store key order
    pub fn get_users(&self) -> Result<Vec<UserProfile>> {
        let mut out = Vec::new();
        for entry in self.users.iter().flatten() {
            let (_, val) = entry;
            if let Ok(p) = serde_json::from_slice::<UserProfile>(&val) {
                out.push(p);
            }
        }
        Ok(out)
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        match self
            .users
            .get(user_id.as_bytes())
            .map_err(|e| ChatError::Storage(format!("get_user: {}", e)))?
        {
            Some(val) => {
                let p = serde_json::from_slice(&val).map_err(ChatError::Serialization)?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    /// Merge display name and avatar onto an existing profile.
    /// Returns `false` when the user is unknown.
    pub fn update_user_profile(
        &self,
        user_id: &str,
        display_name: &str,
        avatar_url: Option<String>,
    ) -> Result<bool> {
        let Some(mut profile) = self.get_user(user_id)? else {
            return Ok(false);
        };
        profile.display_name = display_name.to_string();
        profile.avatar_url = avatar_url;
        self.put_user(&profile)?;
        Ok(true)
    }

    /// Backdate the heartbeat past the freshness window so the next roster
    /// fetch evaluates the user offline. Returns `false` for unknown users.
    pub fn mark_offline(&self, user_id: &str) -> Result<bool> {
        let Some(mut profile) = self.get_user(user_id)? else {
            return Ok(false);
        };
        profile.last_seen = Some(Utc::now() - Duration::milliseconds(FRESHNESS_WINDOW_MS));
        self.put_user(&profile)?;
        Ok(true)
    }

    fn put_user(&self, profile: &UserProfile) -> Result<()> {
        let val = serde_json::to_vec(profile).map_err(ChatError::Serialization)?;
        self.users
            .insert(profile.id.as_bytes(), val)
            .map_err(|e| ChatError::Storage(format!("put_user: {}", e)))?;
        Ok(())
    }
}

impl Clone for RemoteStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            messages: self.messages.clone(),
            summaries: self.summaries.clone(),
            users: self.users.clone(),
            watchers: self.watchers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_messages_persist_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store = RemoteStore::open(temp_dir.path()).unwrap();

        store.create_message("a_b", "a", "hello").await.unwrap();
        store.create_message("a_b", "b", "hi back").await.unwrap();
        drop(store);

        let store2 = RemoteStore::open(temp_dir.path()).unwrap();
        let snap = store2.snapshot("a_b").unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].text, "hello");
        assert_eq!(snap[1].text, "hi back");
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_success() {
        let temp_dir = TempDir::new().unwrap();
        let store = RemoteStore::open(temp_dir.path()).unwrap();

        store.delete_message("a_b", "no-such-id").await.unwrap();
        assert!(store.snapshot("a_b").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_message_keeps_created_at() {
        let temp_dir = TempDir::new().unwrap();
        let store = RemoteStore::open(temp_dir.path()).unwrap();

        let msg = store.create_message("a_b", "a", "hi").await.unwrap();
        assert!(store.merge_message("a_b", &msg.id, "hello").await.unwrap());

        let snap = store.snapshot("a_b").unwrap();
        assert_eq!(snap[0].text, "hello");
        assert!(snap[0].edited);
        assert_eq!(snap[0].created_at, msg.created_at);
    }

    #[tokio::test]
    async fn test_summary_merge_preserves_created_at() {
        let temp_dir = TempDir::new().unwrap();
        let store = RemoteStore::open(temp_dir.path()).unwrap();

        let first = store
            .merge_summary("a_b", vec!["a".into(), "b".into()], "hi")
            .unwrap();
        let second = store
            .merge_summary("a_b", vec!["a".into(), "b".into()], "newer")
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.last_message, "newer");
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_snapshot_on_create() {
        let temp_dir = TempDir::new().unwrap();
        let store = RemoteStore::open(temp_dir.path()).unwrap();

        let (initial, mut rx) = store.subscribe("a_b").await.unwrap();
        assert!(initial.is_empty());

        store.create_message("a_b", "a", "ping").await.unwrap();
        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].text, "ping");
    }

    #[tokio::test]
    async fn test_snapshots_are_keyed_per_conversation() {
        let temp_dir = TempDir::new().unwrap();
        let store = RemoteStore::open(temp_dir.path()).unwrap();

        store.create_message("a_b", "a", "for ab").await.unwrap();
        store.create_message("a_c", "a", "for ac").await.unwrap();

        let ab = store.snapshot("a_b").unwrap();
        let ac = store.snapshot("a_c").unwrap();
        assert_eq!(ab.len(), 1);
        assert_eq!(ac.len(), 1);
        assert_eq!(ab[0].text, "for ab");
        assert_eq!(ac[0].text, "for ac");
    }
}
