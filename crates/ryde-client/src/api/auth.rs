//! Auth API.
//!
//! The operations here are the only writers of session state besides the
//! refresh path: login and signup store what the server hands back, and
//! logout tears local state down whatever the server says.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use common::{Envelope, UserProfile};
use ryde_auth::SessionTier;

use crate::client::RydeClient;
use crate::error::{Error, Result};

use super::decode_data;

/// Credentials for [`AuthApi::login`].
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Fields for [`AuthApi::signup`].
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

/// A signed-in session as the server returns it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

/// Signup response; tokens are absent when the account still needs
/// email verification.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupWire {
    user: UserProfile,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// What a signup produced.
#[derive(Debug, Clone)]
pub enum SignupOutcome {
    /// The account is live and its session has been stored.
    Active(AuthPayload),
    /// The account exists but cannot sign in until the email is verified.
    /// Nothing was stored.
    EmailVerificationRequired {
        user: UserProfile,
        message: Option<String>,
    },
}

/// Auth API client.
pub struct AuthApi {
    client: RydeClient,
}

impl AuthApi {
    pub(crate) fn new(client: RydeClient) -> Self {
        Self { client }
    }

    /// Sign in and store the returned session.
    ///
    /// `remember` picks the tier: `true` persists the session to disk so
    /// it survives restarts, `false` keeps it in process memory only.
    pub async fn login(&self, request: &LoginRequest, remember: bool) -> Result<AuthPayload> {
        let body = serde_json::to_value(request).map_err(|e| Error::Serialize(format!("{e}")))?;
        let envelope = self.client.post("/auth/login", body).await?;
        let payload: AuthPayload = decode_data(envelope)?;

        let tier = SessionTier::from_remember(remember);
        let store = self.client.store();
        store
            .set_tokens(
                payload.access_token.clone(),
                payload.refresh_token.clone(),
                tier,
            )
            .await
            .map_err(|e| Error::Storage(format!("{e}")))?;
        store
            .set_user(&payload.user, Some(tier))
            .await
            .map_err(|e| Error::Storage(format!("{e}")))?;
        info!(user_id = payload.user.id, persistent = remember, "signed in");
        Ok(payload)
    }

    /// Register a new account.
    ///
    /// When the server returns tokens the account is active and the
    /// session is stored durably. Without tokens the account is pending
    /// email verification and no session state is written.
    pub async fn signup(&self, request: &SignupRequest) -> Result<SignupOutcome> {
        let body = serde_json::to_value(request).map_err(|e| Error::Serialize(format!("{e}")))?;
        let envelope = self.client.post("/auth/register", body).await?;
        let message = envelope.message.clone();
        let wire: SignupWire = decode_data(envelope)?;

        match (wire.access_token, wire.refresh_token) {
            (Some(access), Some(refresh)) => {
                let store = self.client.store();
                store
                    .set_tokens(access.clone(), refresh.clone(), SessionTier::Durable)
                    .await
                    .map_err(|e| Error::Storage(format!("{e}")))?;
                store
                    .set_user(&wire.user, Some(SessionTier::Durable))
                    .await
                    .map_err(|e| Error::Storage(format!("{e}")))?;
                info!(user_id = wire.user.id, "account created and signed in");
                Ok(SignupOutcome::Active(AuthPayload {
                    user: wire.user,
                    access_token: access,
                    refresh_token: refresh,
                }))
            }
            _ => {
                info!(user_id = wire.user.id, "account created, awaiting email verification");
                Ok(SignupOutcome::EmailVerificationRequired {
                    user: wire.user,
                    message,
                })
            }
        }
    }

    /// Sign out.
    ///
    /// Local state is always cleared; a server-side failure is logged and
    /// swallowed so logout cannot leave a client stuck signed in.
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.client.post("/auth/logout", json!({})).await {
            warn!(error = %e, "server-side logout failed, clearing local session anyway");
        }
        self.client
            .store()
            .clear()
            .await
            .map_err(|e| Error::Storage(format!("{e}")))?;
        info!("signed out");
        Ok(())
    }

    /// Request a password reset email.
    pub async fn reset_password(&self, email: &str) -> Result<Envelope> {
        self.client
            .post("/auth/reset-password", json!({ "email": email }))
            .await
    }

    /// Confirm an email address with the token from the verification mail.
    pub async fn verify_email(&self, token: &str) -> Result<Envelope> {
        self.client
            .post("/auth/verify-email", json!({ "token": token }))
            .await
    }

    /// Fetch the signed-in user's profile and cache it in the session.
    pub async fn profile(&self) -> Result<UserProfile> {
        let envelope = self.client.get("/auth/profile", None).await?;
        let profile: UserProfile = decode_data(envelope)?;
        if let Err(e) = self.client.store().set_user(&profile, None).await {
            warn!(error = %e, "profile fetched but could not be cached");
        }
        Ok(profile)
    }
}
