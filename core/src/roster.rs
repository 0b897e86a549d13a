/// User directory with presence, profile updates, and the logout flow
use crate::error::Result;
use crate::presence;
use crate::remote_store::RemoteStore;
use crate::session::AuthSession;
use crate::types::RosterEntry;
use chrono::Utc;
use tracing::{info, warn};

pub struct RosterService {
    remote: RemoteStore,
    session: AuthSession,
}

impl RosterService {
    pub fn new(remote: RemoteStore, session: AuthSession) -> Self {
        Self { remote, session }
    }

    /// All directory profiles in store order, each with presence evaluated
    /// against a single instant taken at fetch time. Presence is a
    /// snapshot-at-fetch — it does not update without a re-fetch.
    pub fn fetch_users(&self) -> Result<Vec<RosterEntry>> {
        let now = Utc::now();
        let entries = self
            .remote
            .get_users()?
            .into_iter()
            .map(|profile| RosterEntry {
                is_online: presence::is_online(profile.last_seen, now),
                profile,
            })
            .collect();
        Ok(entries)
    }

    /// Merge display name and avatar onto the stored profile
    pub fn update_profile(
        &self,
        user_id: &str,
        display_name: &str,
        avatar_url: Option<String>,
    ) -> Result<bool> {
        self.remote
            .update_user_profile(user_id, display_name, avatar_url)
    }

    /// Sign the current user out. The mark-offline write is best-effort:
    /// a failure is logged and the sign-out still completes.
    pub async fn logout(&self) -> Result<()> {
        if let Some(user) = self.session.current_user().await {
            if let Err(e) = self.remote.mark_offline(&user.id) {
                warn!("Failed to update presence for {}: {}", user.id, e);
            }
            info!("signed out {}", user.id);
        }
        self.session.sign_out().await;
        Ok(())
    }
}

impl Clone for RosterService {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            session: self.session.clone(),
        }
    }
}
