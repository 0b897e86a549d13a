/// Write-command protocol: send / edit / delete against the remote store.
///
/// Send performs no local insert — the subscription snapshot is the only
/// path by which the sender sees their own message appear. Edit and delete
/// additionally apply local bookkeeping so the effect is visible before the
/// next snapshot lands.
use crate::error::{ChatError, Result};
use crate::message_store::MessageStore;
use crate::remote_store::RemoteStore;
use crate::session::AuthSession;
use crate::types::ConversationKey;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Identifiers effected by a successful send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub conversation_id: ConversationKey,
    pub message_id: String,
}

pub struct CommandDispatcher {
    remote: RemoteStore,
    store: MessageStore,
    session: AuthSession,
}

impl CommandDispatcher {
    pub fn new(remote: RemoteStore, store: MessageStore, session: AuthSession) -> Self {
        Self {
            remote,
            store,
            session,
        }
    }

    /// Create a message document and merge the conversation summary.
    /// The store assigns id and creation timestamp. At-least-once on
    /// retry: no client-side deduplication is performed.
    pub async fn send(
        &self,
        conversation_id: &str,
        text: &str,
        recipient_id: &str,
    ) -> Result<SendOutcome> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation("message text is empty".to_string()));
        }
        let sender = self.session.require_user().await?;

        let msg = self
            .remote
            .create_message(conversation_id, &sender.id, trimmed)
            .await
            .map_err(|e| ChatError::RemoteWrite(e.to_string()))?;

        self.remote
            .merge_summary(
                conversation_id,
                vec![sender.id.clone(), recipient_id.to_string()],
                trimmed,
            )
            .map_err(|e| ChatError::RemoteWrite(e.to_string()))?;

        // No local insert here; the snapshot delivers the message
        info!("sent message {} in {}", msg.id, conversation_id);
        Ok(SendOutcome {
            conversation_id: conversation_id.to_string(),
            message_id: msg.id,
        })
    }

    /// Merge `{text, edited: true}` onto an existing message. The creation
    /// timestamp never changes; an edit never reorders.
    pub async fn edit(&self, conversation_id: &str, message_id: &str, new_text: &str) -> Result<()> {
        let trimmed = new_text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation("message text is empty".to_string()));
        }
        self.session.require_user().await?;

        let merged = self
            .remote
            .merge_message(conversation_id, message_id, trimmed)
            .await
            .map_err(|e| ChatError::RemoteWrite(e.to_string()))?;
        if !merged {
            return Err(ChatError::Validation(format!(
                "message {} does not belong to conversation {}",
                message_id, conversation_id
            )));
        }

        // Bookkeeping until the next snapshot arrives
        self.store
            .patch_message(conversation_id, message_id, trimmed)
            .await;
        info!("edited message {} in {}", message_id, conversation_id);
        Ok(())
    }

    /// Remove a message document. Deleting an id that no longer exists is
    /// a success — the command is idempotent.
    pub async fn delete(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.session.require_user().await?;

        self.remote
            .delete_message(conversation_id, message_id)
            .await
            .map_err(|e| ChatError::RemoteWrite(e.to_string()))?;

        // Bookkeeping until the next snapshot arrives
        self.store.remove_message(conversation_id, message_id).await;
        info!("deleted message {} in {}", message_id, conversation_id);
        Ok(())
    }
}

impl Clone for CommandDispatcher {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            store: self.store.clone(),
            session: self.session.clone(),
        }
    }
}
