/// Client facade: wires the session, remote store, message cache, sync
/// engine, command dispatcher, and roster service, and exposes the
/// operations a UI layer drives.
use crate::commands::{CommandDispatcher, SendOutcome};
use crate::config::Config;
use crate::conversation::conversation_key;
use crate::error::Result;
use crate::message_store::MessageStore;
use crate::remote_store::RemoteStore;
use crate::roster::RosterService;
use crate::session::{AuthSession, CurrentUser};
use crate::sync::{SyncEngine, SyncState};
use crate::types::{ChatEvent, ConversationKey, ConversationSummary, Message, RosterEntry, UserProfile};
use tokio::sync::broadcast;
use tracing::info;

pub struct ChatClient {
    session: AuthSession,
    remote: RemoteStore,
    store: MessageStore,
    sync: SyncEngine,
    dispatcher: CommandDispatcher,
    roster: RosterService,
}

impl ChatClient {
    /// Assemble a client around an already-open remote store
    pub fn new(remote: RemoteStore, session: AuthSession) -> Self {
        let store = MessageStore::new();
        let sync = SyncEngine::new(remote.clone(), store.clone(), session.clone());
        let dispatcher = CommandDispatcher::new(remote.clone(), store.clone(), session.clone());
        let roster = RosterService::new(remote.clone(), session.clone());

        Self {
            session,
            remote,
            store,
            sync,
            dispatcher,
            roster,
        }
    }

    /// Open the store at the configured data directory and assemble a
    /// client with an empty session
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let remote = RemoteStore::open(&config.data_dir)?;
        info!("Opened chat store at {}", config.data_dir.display());
        Ok(Self::new(remote, AuthSession::new()))
    }

    // ─── Session ─────────────────────────────────────────────────────────

    /// Accept an identity from the auth collaborator: upsert the directory
    /// profile with a fresh heartbeat, then mark the session signed in.
    pub async fn sign_in(&self, user: CurrentUser) -> Result<UserProfile> {
        let profile = self.remote.record_sign_in(&user)?;
        self.session.sign_in(user).await;
        Ok(profile)
    }

    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.session.current_user().await
    }

    /// Close the open conversation and sign out (best-effort presence
    /// update inside)
    pub async fn logout(&self) -> Result<()> {
        self.sync.close_conversation().await;
        self.roster.logout().await
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    // ─── Conversations ───────────────────────────────────────────────────

    /// Open the conversation with another user; returns its key
    pub async fn open_conversation_with(&self, other_user_id: &str) -> Result<ConversationKey> {
        let user = self.session.require_user().await?;
        let key = conversation_key(&user.id, other_user_id);
        self.sync.open_conversation(&key).await?;
        Ok(key)
    }

    pub async fn open_conversation(&self, key: &str) -> Result<()> {
        self.sync.open_conversation(key).await
    }

    pub async fn close_conversation(&self) {
        self.sync.close_conversation().await;
    }

    /// The render-ready log for a conversation key
    pub async fn log(&self, key: &str) -> Vec<Message> {
        self.store.get_log(key).await
    }

    pub async fn sync_state(&self) -> SyncState {
        self.sync.state().await
    }

    pub async fn active_conversation(&self) -> Option<ConversationKey> {
        self.sync.active_key().await
    }

    pub fn summary(&self, key: &str) -> Result<Option<ConversationSummary>> {
        self.remote.get_summary(key)
    }

    // ─── Commands ────────────────────────────────────────────────────────

    pub async fn send(
        &self,
        conversation_id: &str,
        text: &str,
        recipient_id: &str,
    ) -> Result<SendOutcome> {
        self.dispatcher.send(conversation_id, text, recipient_id).await
    }

    pub async fn edit(&self, conversation_id: &str, message_id: &str, new_text: &str) -> Result<()> {
        self.dispatcher.edit(conversation_id, message_id, new_text).await
    }

    pub async fn delete(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.dispatcher.delete(conversation_id, message_id).await
    }

    // ─── Roster ──────────────────────────────────────────────────────────

    pub fn fetch_roster(&self) -> Result<Vec<RosterEntry>> {
        self.roster.fetch_users()
    }

    pub fn update_profile(
        &self,
        user_id: &str,
        display_name: &str,
        avatar_url: Option<String>,
    ) -> Result<bool> {
        self.roster.update_profile(user_id, display_name, avatar_url)
    }

    // ─── Events ──────────────────────────────────────────────────────────

    /// Observe log updates and subscription failures (drives the SSE feed)
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.store.subscribe()
    }

    pub fn event_sender(&self) -> &broadcast::Sender<ChatEvent> {
        self.store.event_sender()
    }
}

impl Clone for ChatClient {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            remote: self.remote.clone(),
            store: self.store.clone(),
            sync: self.sync.clone(),
            dispatcher: self.dispatcher.clone(),
            roster: self.roster.clone(),
        }
    }
}
