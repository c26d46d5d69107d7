//! Auth provider interface.

use crate::AuthResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential handed out by a successful sign-in or sign-up.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub token: String,
    pub user_id: String,
    pub email: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGrant")
            .field("token", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Display name and avatar shown for the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Remote view of the signed-in account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub email: Option<String>,
    pub email_verified: bool,
    pub profile: UserProfile,
}

/// Remote identity service.
///
/// Implementations map their own rejection codes into
/// [`ProviderErrorCode`](tracker_config_and_utils::ProviderErrorCode) through
/// [`AuthError::Provider`](crate::AuthError::Provider).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthGrant>;

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthGrant>;

    /// Reload the account behind `token`.
    async fn lookup(&self, token: &str) -> AuthResult<UserRecord>;

    async fn send_verification_email(&self, token: &str) -> AuthResult<()>;

    async fn send_password_reset(&self, email: &str) -> AuthResult<()>;

    async fn update_profile(&self, token: &str, profile: &UserProfile) -> AuthResult<UserRecord>;

    /// Best-effort remote revocation. Providers with stateless tokens may do nothing.
    async fn sign_out(&self, _token: &str) -> AuthResult<()> {
        Ok(())
    }
}
