/// Render-side message cache: one ordered log per conversation key.
/// Single source of truth for what the UI draws; written by the sync
/// engine (snapshot replacement) and by the command dispatcher's
/// edit/delete bookkeeping paths.
use crate::types::{ChatEvent, ConversationKey, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Events buffered per observer before lag kicks in
const EVENT_BUFFER: usize = 256;

pub struct MessageStore {
    logs: Arc<RwLock<HashMap<ConversationKey, Vec<Message>>>>,
    events: broadcast::Sender<ChatEvent>,
}

impl MessageStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            logs: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Replace the whole log for `key`. Snapshots are applied wholesale —
    /// there is no incremental patching path.
    pub async fn replace_log(&self, key: &str, messages: Vec<Message>) {
        {
            let mut logs = self.logs.write().await;
            logs.insert(key.to_string(), messages);
        }
        self.notify(key);
    }

    /// The current log for `key`; empty when the key is unknown
    pub async fn get_log(&self, key: &str) -> Vec<Message> {
        let logs = self.logs.read().await;
        logs.get(key).cloned().unwrap_or_default()
    }

    /// Drop one message ahead of the next snapshot (delete bookkeeping).
    /// No-op when the id is absent.
    pub async fn remove_message(&self, key: &str, message_id: &str) {
        let changed = {
            let mut logs = self.logs.write().await;
            match logs.get_mut(key) {
                Some(log) => {
                    let before = log.len();
                    log.retain(|m| m.id != message_id);
                    log.len() != before
                }
                None => false,
            }
        };
        if changed {
            self.notify(key);
        }
    }

    /// Apply an edit ahead of the next snapshot (edit bookkeeping).
    /// No-op when the id is absent.
    pub async fn patch_message(&self, key: &str, message_id: &str, new_text: &str) {
        let changed = {
            let mut logs = self.logs.write().await;
            match logs.get_mut(key) {
                Some(log) => match log.iter_mut().find(|m| m.id == message_id) {
                    Some(msg) => {
                        msg.text = new_text.to_string();
                        msg.edited = true;
                        true
                    }
                    None => false,
                },
                None => false,
            }
        };
        if changed {
            self.notify(key);
        }
    }

    /// Observe store changes (and sync-engine failures routed through the
    /// same bus). Used by the SSE endpoint.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> &broadcast::Sender<ChatEvent> {
        &self.events
    }

    fn notify(&self, key: &str) {
        // No live observers is fine
        let _ = self.events.send(ChatEvent::LogUpdated {
            conversation_id: key.to_string(),
        });
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageStore {
    fn clone(&self) -> Self {
        Self {
            logs: self.logs.clone(),
            events: self.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(id: &str, text: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: "u1".to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            edited: false,
            seq: 0,
        }
    }

    #[tokio::test]
    async fn test_replace_log_is_idempotent() {
        let store = MessageStore::new();
        let log = vec![msg("m1", "hi"), msg("m2", "there")];

        store.replace_log("a_b", log.clone()).await;
        assert_eq!(store.get_log("a_b").await, log);

        store.replace_log("a_b", log.clone()).await;
        assert_eq!(store.get_log("a_b").await, log);
    }

    #[tokio::test]
    async fn test_unknown_key_yields_empty_log() {
        let store = MessageStore::new();
        assert!(store.get_log("nobody_here").await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_id_is_noop() {
        let store = MessageStore::new();
        store.replace_log("a_b", vec![msg("m1", "hi")]).await;

        store.remove_message("a_b", "m2").await;
        assert_eq!(store.get_log("a_b").await.len(), 1);

        store.remove_message("a_b", "m1").await;
        assert!(store.get_log("a_b").await.is_empty());
    }

    #[tokio::test]
    async fn test_patch_sets_text_and_edited() {
        let store = MessageStore::new();
        store.replace_log("a_b", vec![msg("m1", "hi")]).await;

        store.patch_message("a_b", "m1", "hello").await;
        let log = store.get_log("a_b").await;
        assert_eq!(log[0].text, "hello");
        assert!(log[0].edited);

        // absent id: nothing happens
        store.patch_message("a_b", "m9", "x").await;
        assert_eq!(store.get_log("a_b").await.len(), 1);
    }

    #[tokio::test]
    async fn test_mutations_notify_observers() {
        let store = MessageStore::new();
        let mut rx = store.subscribe();

        store.replace_log("a_b", vec![msg("m1", "hi")]).await;
        match rx.recv().await.unwrap() {
            ChatEvent::LogUpdated { conversation_id } => assert_eq!(conversation_id, "a_b"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
