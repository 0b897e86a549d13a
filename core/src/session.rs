/// Authentication collaborator boundary.
///
/// Identity issuance lives outside the core; the session only carries the
/// signed-in user handed over by the auth layer. Components receive the
/// session explicitly at construction — there is no ambient global.
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The authenticated user as provided by the auth collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: String,
}

#[derive(Clone)]
pub struct AuthSession {
    current: Arc<RwLock<Option<CurrentUser>>>,
}

impl AuthSession {
    /// Create a session with no signed-in user
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a session already signed in as `user` (tests, embedded use)
    pub fn with_user(user: CurrentUser) -> Self {
        Self {
            current: Arc::new(RwLock::new(Some(user))),
        }
    }

    pub async fn sign_in(&self, user: CurrentUser) {
        let mut current = self.current.write().await;
        *current = Some(user);
    }

    pub async fn sign_out(&self) {
        let mut current = self.current.write().await;
        *current = None;
    }

    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.current.read().await.clone()
    }

    /// The signed-in user, or `Unauthenticated` — write commands and
    /// subscription opens fail fast through this.
    pub async fn require_user(&self) -> Result<CurrentUser> {
        self.current_user().await.ok_or(ChatError::Unauthenticated)
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}
