//! Session bookkeeping on top of the local and session key-value stores.
//!
//! Tokens are never logged or displayed in full.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::kv::KeyValueStore;

/// Primary access token key.
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// Minimal user profile key (`{"id","email"}` JSON).
pub const USER_DATA_KEY: &str = "userData";
/// Refresh token key.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Provider-namespaced keys an SDK may have left behind.
const PROVIDER_KEYS: &[&str] = &["supabase.auth.token", "sb-access-token", "sb-refresh-token"];
const PROVIDER_PREFIXES: &[&str] = &["sb-", "supabase."];

/// Authenticated user's token and minimal profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProfile {
    id: String,
    #[serde(default)]
    email: String,
}

/// Result of persisting a session.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved,
    /// Signed in remotely, but the local write failed.
    LocalWriteFailed(anyhow::Error),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

/// Owns the session record inside the local store and purges both stores on
/// sign-out.
pub struct CredentialStore<L, S> {
    local: L,
    session: S,
}

impl<L: KeyValueStore, S: KeyValueStore> CredentialStore<L, S> {
    pub fn new(local: L, session: S) -> Self {
        Self { local, session }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut L {
        &mut self.local
    }

    pub fn session_store_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Persists token and profile. A failed write is reported as a warning
    /// outcome; the server-side session is still valid. A partial write is
    /// rolled back so no key of the record is left behind.
    pub fn save(&mut self, session: &Session) -> SaveOutcome {
        let written = self.write_session(session);
        if written.is_err() {
            self.discard_session_keys();
        }
        match written {
            Ok(()) => {
                tracing::debug!(
                    user_id = %session.user_id,
                    token = %mask_token(&session.access_token),
                    "Session saved locally"
                );
                SaveOutcome::Saved
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Failed to store authentication data");
                SaveOutcome::LocalWriteFailed(e)
            }
        }
    }

    fn write_session(&mut self, session: &Session) -> Result<()> {
        let profile = serde_json::to_string(&StoredProfile {
            id: session.user_id.clone(),
            email: session.email.clone(),
        })
        .context("Failed to serialize user profile")?;

        self.local.set(AUTH_TOKEN_KEY, &session.access_token)?;
        self.local.set(USER_DATA_KEY, &profile)?;
        match &session.refresh_token {
            Some(refresh) => self.local.set(REFRESH_TOKEN_KEY, refresh)?,
            None => self.local.remove(REFRESH_TOKEN_KEY)?,
        }
        Ok(())
    }

    fn discard_session_keys(&mut self) {
        for key in [AUTH_TOKEN_KEY, USER_DATA_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.local.remove(key) {
                tracing::error!(key, error = %format!("{e:#}"), "Failed to roll back partial session write");
            }
        }
    }

    /// Returns the stored session, if a token and a readable profile exist.
    ///
    /// # Errors
    /// Returns an error if the local store cannot be read.
    pub fn load(&self) -> Result<Option<Session>> {
        let Some(access_token) = self.local.get(AUTH_TOKEN_KEY)? else {
            return Ok(None);
        };
        let Some(raw_profile) = self.local.get(USER_DATA_KEY)? else {
            return Ok(None);
        };
        let profile: StoredProfile = match serde_json::from_str(&raw_profile) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable stored profile");
                return Ok(None);
            }
        };

        Ok(Some(Session {
            user_id: profile.id,
            email: profile.email,
            access_token,
            refresh_token: self.local.get(REFRESH_TOKEN_KEY)?,
        }))
    }

    /// Returns just the stored access token.
    ///
    /// # Errors
    /// Returns an error if the local store cannot be read.
    pub fn access_token(&self) -> Result<Option<String>> {
        self.local.get(AUTH_TOKEN_KEY)
    }

    /// Removes every known credential key, any provider-namespaced key, and
    /// the whole session store. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns an error if either store cannot be updated.
    pub fn clear_all(&mut self) -> Result<()> {
        for key in [AUTH_TOKEN_KEY, USER_DATA_KEY, REFRESH_TOKEN_KEY]
            .iter()
            .chain(PROVIDER_KEYS)
        {
            self.local
                .remove(key)
                .with_context(|| format!("Failed to remove {key}"))?;
        }

        let residue: Vec<String> = self
            .local
            .keys()?
            .into_iter()
            .filter(|key| PROVIDER_PREFIXES.iter().any(|p| key.starts_with(p)))
            .collect();
        for key in residue {
            self.local
                .remove(&key)
                .with_context(|| format!("Failed to remove {key}"))?;
        }

        self.session
            .clear()
            .context("Failed to clear session storage")?;
        tracing::info!("All authentication data cleared from storage");
        Ok(())
    }

    /// Last-resort purge: wipes both stores entirely, ignoring failures.
    pub fn wipe_everything(&mut self) {
        if let Err(e) = self.local.clear() {
            tracing::error!(error = %format!("{e:#}"), "Emergency clear of local storage failed");
        }
        if let Err(e) = self.session.clear() {
            tracing::error!(error = %format!("{e:#}"), "Emergency clear of session storage failed");
        }
    }
}

/// Masks a token for display (shows first 10 and last 4 chars).
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 14 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
