/// Subscription lifecycle: keeps the local message log convergent with the
/// remote store's snapshot stream. At most one live subscription exists per
/// chat surface; opening a new conversation tears the previous one down
/// first.
use crate::error::{ChatError, Result};
use crate::message_store::MessageStore;
use crate::remote_store::RemoteStore;
use crate::session::AuthSession;
use crate::types::{ChatEvent, ConversationKey, Message, RawMessage};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-surface subscription state: Closed → Subscribing → Streaming → Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Closed,
    Subscribing,
    Streaming,
}

struct ActiveSub {
    key: ConversationKey,
    handle: JoinHandle<()>,
}

pub struct SyncEngine {
    remote: RemoteStore,
    store: MessageStore,
    session: AuthSession,
    active: Arc<RwLock<Option<ActiveSub>>>,
    /// Bumped on every open/close; a streaming task applies snapshots only
    /// while its own generation is still current
    generation: Arc<AtomicU64>,
    state: Arc<RwLock<SyncState>>,
}

impl SyncEngine {
    pub fn new(remote: RemoteStore, store: MessageStore, session: AuthSession) -> Self {
        Self {
            remote,
            store,
            session,
            active: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(RwLock::new(SyncState::Closed)),
        }
    }

    /// Open the live subscription for `key`, closing any previous one.
    /// Refused when no user is signed in.
    pub async fn open_conversation(&self, key: &str) -> Result<()> {
        self.session.require_user().await?;
        self.close_conversation().await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write().await = SyncState::Subscribing;

        let (initial, rx) = match self.remote.subscribe(key).await {
            Ok(sub) => sub,
            Err(e) => {
                self.fail_subscription(key, &e.to_string()).await;
                return Err(ChatError::Subscription(e.to_string()));
            }
        };

        // First snapshot: Subscribing → Streaming
        self.store.replace_log(key, normalize_snapshot(initial)).await;
        *self.state.write().await = SyncState::Streaming;
        debug!("streaming conversation {}", key);

        let engine = self.clone();
        let task_key = key.to_string();
        let handle = tokio::spawn(async move {
            engine.run_stream(task_key, generation, rx).await;
        });

        *self.active.write().await = Some(ActiveSub {
            key: key.to_string(),
            handle,
        });
        Ok(())
    }

    /// Tear down the live subscription, if any
    pub async fn close_conversation(&self) {
        // Invalidate in-flight snapshot application before aborting
        self.generation.fetch_add(1, Ordering::SeqCst);
        let prev = self.active.write().await.take();
        if let Some(sub) = prev {
            sub.handle.abort();
            debug!("closed subscription for {}", sub.key);
        }
        *self.state.write().await = SyncState::Closed;
    }

    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    /// The key of the currently-open conversation, if any
    pub async fn active_key(&self) -> Option<ConversationKey> {
        self.active.read().await.as_ref().map(|s| s.key.clone())
    }

    async fn run_stream(
        &self,
        key: String,
        generation: u64,
        mut rx: broadcast::Receiver<Vec<RawMessage>>,
    ) {
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    if self.generation.load(Ordering::SeqCst) != generation {
                        // Superseded by a newer open/close; drop the snapshot
                        break;
                    }
                    self.store.replace_log(&key, normalize_snapshot(snapshot)).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Skipped snapshots are subsumed by the next one:
                    // last-applied wins
                    warn!("subscription for {} lagged {} snapshots", key, n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    if self.generation.load(Ordering::SeqCst) == generation {
                        self.fail_subscription(&key, "snapshot stream closed").await;
                    }
                    break;
                }
            }
        }
    }

    /// Land in Closed and surface the failure to the UI. No automatic
    /// retry — re-opening is a UI action.
    async fn fail_subscription(&self, key: &str, reason: &str) {
        warn!("subscription for {} failed: {}", key, reason);
        *self.state.write().await = SyncState::Closed;
        let _ = self.store.event_sender().send(ChatEvent::SubscriptionFailed {
            conversation_id: key.to_string(),
            reason: reason.to_string(),
        });
    }
}

impl Clone for SyncEngine {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            store: self.store.clone(),
            session: self.session.clone(),
            active: self.active.clone(),
            generation: self.generation.clone(),
            state: self.state.clone(),
        }
    }
}

/// Coerce a raw snapshot into the render form: pending server timestamps
/// are withheld until a later snapshot resolves them, and the rest is
/// ordered by `created_at` ascending with store insertion order as the
/// tie-break.
pub fn normalize_snapshot(raw: Vec<RawMessage>) -> Vec<Message> {
    let mut out: Vec<Message> = raw
        .into_iter()
        .filter_map(|m| {
            let millis = m.created_at?;
            let created_at = Utc.timestamp_millis_opt(millis).single()?;
            Some(Message {
                id: m.id,
                sender_id: m.sender_id,
                text: m.text,
                created_at,
                edited: m.edited,
                seq: m.seq,
            })
        })
        .collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
    out
}
