//! Two-tier session storage
//!
//! Holds the signed-in user's tokens and profile across two mutually
//! exclusive tiers: a durable tier mirrored to a JSON session file, and an
//! ephemeral tier that lives only in process memory. All file writes use
//! atomic temp-file + rename to prevent corruption on crash. A tokio Mutex
//! serializes concurrent writes from login, refresh, and background tasks.
//!
//! Reads are total: a missing token is `None`, a malformed stored user is
//! `None`, and a corrupt session file starts the store signed out. Callers
//! never have to handle a read error mid-request.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::UserProfile;

use crate::error::{Error, Result};

/// Which tier a session write lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTier {
    /// Survives process restart; mirrored to the session file.
    Durable,
    /// Lives only in process memory; gone when the process exits.
    Ephemeral,
}

impl SessionTier {
    /// Map a "remember me" choice to a tier.
    pub fn from_remember(remember: bool) -> Self {
        if remember {
            Self::Durable
        } else {
            Self::Ephemeral
        }
    }
}

/// The three slots a tier can hold.
///
/// Tokens always move as a pair; the user slot is written independently of
/// them. The durable tier's slots are exactly what the session file holds.
#[derive(Default, Clone, Serialize, Deserialize)]
struct TierSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<Value>,
}

impl TierSlots {
    fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }

    fn has_tokens(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }
}

struct TierState {
    durable: TierSlots,
    ephemeral: TierSlots,
}

/// Thread-safe two-tier session store.
///
/// The Mutex serializes all access. Reads acquire the lock briefly to
/// clone out the values they need, so request paths don't block on file
/// writes from other tasks.
pub struct SessionStore {
    path: PathBuf,
    state: Mutex<TierState>,
}

impl SessionStore {
    /// Load the session from the given file path.
    ///
    /// A missing file is created empty (cold start, signed out). A file
    /// that no longer parses is dropped and rewritten empty with a
    /// warning; store reads never surface a parse error.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let durable = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            match serde_json::from_str::<TierSlots>(&contents) {
                Ok(slots) => {
                    info!(
                        path = %path.display(),
                        signed_in = slots.access_token.is_some(),
                        "loaded session file"
                    );
                    slots
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "session file unreadable, starting signed out");
                    let slots = TierSlots::default();
                    write_atomic(&path, &slots).await?;
                    slots
                }
            }
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            let slots = TierSlots::default();
            // Create the empty file so future loads don't need the cold-start path
            write_atomic(&path, &slots).await?;
            slots
        };

        Ok(Self {
            path,
            state: Mutex::new(TierState {
                durable,
                ephemeral: TierSlots::default(),
            }),
        })
    }

    /// Store a token pair in the chosen tier and remove any pair from the
    /// other tier. User slots are untouched.
    pub async fn set_tokens(&self, access: String, refresh: String, tier: SessionTier) -> Result<()> {
        let mut state = self.state.lock().await;
        let TierState { durable, ephemeral } = &mut *state;
        let (target, other) = match tier {
            SessionTier::Durable => (durable, ephemeral),
            SessionTier::Ephemeral => (ephemeral, durable),
        };
        target.access_token = Some(access);
        target.refresh_token = Some(refresh);
        other.clear_tokens();
        debug!(tier = ?tier, "stored session tokens");
        // Either the write or the exclusivity clear touched the durable tier
        write_atomic(&self.path, &state.durable).await
    }

    /// Rotate tokens after a refresh, preserving the session's tier.
    ///
    /// Writes into whichever tier currently holds tokens. A `None` new
    /// refresh token keeps the existing one.
    pub async fn rotate_tokens(&self, access: String, refresh: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let persist = state.durable.has_tokens();
        let target = if persist {
            &mut state.durable
        } else {
            &mut state.ephemeral
        };
        target.access_token = Some(access);
        if let Some(refresh) = refresh {
            target.refresh_token = Some(refresh);
        }
        debug!(durable = persist, "rotated session tokens");
        if persist {
            write_atomic(&self.path, &state.durable).await
        } else {
            Ok(())
        }
    }

    /// Current access token, durable tier first.
    pub async fn access_token(&self) -> Option<String> {
        let state = self.state.lock().await;
        state
            .durable
            .access_token
            .clone()
            .or_else(|| state.ephemeral.access_token.clone())
    }

    /// Current refresh token, durable tier first.
    pub async fn refresh_token(&self) -> Option<String> {
        let state = self.state.lock().await;
        state
            .durable
            .refresh_token
            .clone()
            .or_else(|| state.ephemeral.refresh_token.clone())
    }

    /// Store the signed-in user's profile.
    ///
    /// With `tier = None` the tier is inferred: durable iff the durable
    /// tier currently holds an access token. The other tier's user slot
    /// is cleared either way.
    pub async fn set_user(&self, user: &UserProfile, tier: Option<SessionTier>) -> Result<()> {
        let value = serde_json::to_value(user)
            .map_err(|e| Error::SessionParse(format!("serializing user profile: {e}")))?;
        let mut state = self.state.lock().await;
        let tier = tier.unwrap_or_else(|| {
            if state.durable.access_token.is_some() {
                SessionTier::Durable
            } else {
                SessionTier::Ephemeral
            }
        });
        let TierState { durable, ephemeral } = &mut *state;
        let (target, other) = match tier {
            SessionTier::Durable => (durable, ephemeral),
            SessionTier::Ephemeral => (ephemeral, durable),
        };
        target.user = Some(value);
        other.user = None;
        debug!(tier = ?tier, "stored user profile");
        write_atomic(&self.path, &state.durable).await
    }

    /// Stored user profile, durable tier first.
    ///
    /// A stored value that doesn't parse as a profile reads as `None`,
    /// never as an error.
    pub async fn user(&self) -> Option<UserProfile> {
        let state = self.state.lock().await;
        let raw = state
            .durable
            .user
            .clone()
            .or_else(|| state.ephemeral.user.clone())?;
        serde_json::from_value(raw).ok()
    }

    /// Sign out locally: empty both tiers and rewrite the session file.
    ///
    /// Idempotent; safe to call when already signed out.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.durable = TierSlots::default();
        state.ephemeral = TierSlots::default();
        debug!("cleared session");
        write_atomic(&self.path, &state.durable).await
    }

    /// Whether the current session survives a restart.
    pub async fn is_persistent(&self) -> bool {
        let state = self.state.lock().await;
        state.durable.access_token.is_some()
    }
}

/// Write the durable tier to the session file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. This prevents corruption if the process crashes mid-write.
/// Permissions are set to 0600 since the file holds live tokens.
async fn write_atomic(path: &Path, slots: &TierSlots) -> Result<()> {
    let json = serde_json::to_string_pretty(slots)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile() -> UserProfile {
        UserProfile {
            id: 7,
            email: "owner@fleet.test".into(),
            first_name: "Rosa".into(),
            last_name: "Marchetti".into(),
            roles: vec!["owner".into()],
            is_active: true,
            email_verified: true,
            logo_url: None,
        }
    }

    async fn store_at(path: PathBuf) -> SessionStore {
        SessionStore::load(path).await.unwrap()
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        assert!(!path.exists());
        let store = store_at(path.clone()).await;
        assert!(store.access_token().await.is_none());
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: TierSlots = serde_json::from_str(&contents).unwrap();
        assert!(parsed.access_token.is_none());
    }

    #[tokio::test]
    async fn durable_tokens_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_1".into(), "rt_1".into(), SessionTier::Durable)
            .await
            .unwrap();

        let reloaded = store_at(path).await;
        assert_eq!(reloaded.access_token().await.as_deref(), Some("at_1"));
        assert_eq!(reloaded.refresh_token().await.as_deref(), Some("rt_1"));
        assert!(reloaded.is_persistent().await);
    }

    #[tokio::test]
    async fn ephemeral_tokens_lost_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_1".into(), "rt_1".into(), SessionTier::Ephemeral)
            .await
            .unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("at_1"));
        assert!(!store.is_persistent().await);

        let reloaded = store_at(path).await;
        assert!(reloaded.access_token().await.is_none());
        assert!(reloaded.refresh_token().await.is_none());
    }

    #[tokio::test]
    async fn tier_writes_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_d".into(), "rt_d".into(), SessionTier::Durable)
            .await
            .unwrap();
        store
            .set_tokens("at_e".into(), "rt_e".into(), SessionTier::Ephemeral)
            .await
            .unwrap();

        // Reads now come from the ephemeral tier
        assert_eq!(store.access_token().await.as_deref(), Some("at_e"));
        assert!(!store.is_persistent().await);

        // And the durable tier (the file) holds nothing
        let reloaded = store_at(path).await;
        assert!(reloaded.access_token().await.is_none());
    }

    #[tokio::test]
    async fn malformed_file_starts_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"not json{{{").await.unwrap();

        let store = store_at(path.clone()).await;
        assert!(store.access_token().await.is_none());

        // The file was rewritten as valid empty state
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(serde_json::from_str::<TierSlots>(&contents).is_ok());
    }

    #[tokio::test]
    async fn malformed_user_value_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(
            &path,
            br#"{"access_token":"at_1","refresh_token":"rt_1","user":{"bogus":true}}"#,
        )
        .await
        .unwrap();

        let store = store_at(path).await;
        assert_eq!(store.access_token().await.as_deref(), Some("at_1"));
        assert!(store.user().await.is_none());
    }

    #[tokio::test]
    async fn user_tier_inferred_from_durable_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_1".into(), "rt_1".into(), SessionTier::Durable)
            .await
            .unwrap();
        store.set_user(&test_profile(), None).await.unwrap();

        let reloaded = store_at(path).await;
        let user = reloaded.user().await.unwrap();
        assert_eq!(user.email, "owner@fleet.test");
    }

    #[tokio::test]
    async fn user_without_durable_token_stays_ephemeral() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_1".into(), "rt_1".into(), SessionTier::Ephemeral)
            .await
            .unwrap();
        store.set_user(&test_profile(), None).await.unwrap();
        assert!(store.user().await.is_some());

        let reloaded = store_at(path).await;
        assert!(reloaded.user().await.is_none());
    }

    #[tokio::test]
    async fn set_user_clears_other_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_user(&test_profile(), Some(SessionTier::Durable))
            .await
            .unwrap();
        store
            .set_user(&test_profile(), Some(SessionTier::Ephemeral))
            .await
            .unwrap();
        assert!(store.user().await.is_some());

        // Durable slot was cleared by the ephemeral write
        let reloaded = store_at(path).await;
        assert!(reloaded.user().await.is_none());
    }

    #[tokio::test]
    async fn rotate_preserves_durable_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_old".into(), "rt_old".into(), SessionTier::Durable)
            .await
            .unwrap();
        store
            .rotate_tokens("at_new".into(), Some("rt_new".into()))
            .await
            .unwrap();

        let reloaded = store_at(path).await;
        assert_eq!(reloaded.access_token().await.as_deref(), Some("at_new"));
        assert_eq!(reloaded.refresh_token().await.as_deref(), Some("rt_new"));
    }

    #[tokio::test]
    async fn rotate_preserves_ephemeral_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_old".into(), "rt_old".into(), SessionTier::Ephemeral)
            .await
            .unwrap();
        store
            .rotate_tokens("at_new".into(), Some("rt_new".into()))
            .await
            .unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("at_new"));

        // Rotation must not promote an ephemeral session to disk
        let reloaded = store_at(path).await;
        assert!(reloaded.access_token().await.is_none());
    }

    #[tokio::test]
    async fn rotate_without_new_refresh_keeps_old() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path).await;
        store
            .set_tokens("at_old".into(), "rt_old".into(), SessionTier::Durable)
            .await
            .unwrap();
        store.rotate_tokens("at_new".into(), None).await.unwrap();

        assert_eq!(store.access_token().await.as_deref(), Some("at_new"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("rt_old"));
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path).await;
        store
            .set_tokens("at_1".into(), "rt_1".into(), SessionTier::Durable)
            .await
            .unwrap();
        store.set_user(&test_profile(), None).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.access_token().await.is_none());
        assert!(store.refresh_token().await.is_none());
        assert!(store.user().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = store_at(path.clone()).await;
        store
            .set_tokens("at_1".into(), "rt_1".into(), SessionTier::Durable)
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = std::sync::Arc::new(store_at(path.clone()).await);

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_tokens(format!("at_{i}"), format!("rt_{i}"), SessionTier::Durable)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // The file holds whichever write landed last, and parses cleanly
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: TierSlots = serde_json::from_str(&contents).unwrap();
        let access = parsed.access_token.unwrap();
        assert!(access.starts_with("at_"), "got: {access}");
    }
}
