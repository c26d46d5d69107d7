//! Session management with FSM-based state tracking.
//!
//! `SessionManager` owns the [`Session`] value. Every change goes through the
//! session FSM under one lock, is mirrored to the credential store in the same
//! critical section and is then published on a watch channel.
//!
//! Remote calls run without the lock. Each in-flight request remembers the
//! session epoch it started in; when the epoch moved on (logout, expiry, a new
//! login) the result is discarded instead of applied.

use crate::auth_fsm::{SessionMachine, SessionMachineInput, SessionStatus};
use crate::provider::{AuthGrant, AuthProvider, UserProfile, UserRecord};
use crate::theme::{ThemeMode, ThemePreference};
use crate::validation;
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracker_config_and_utils::{ErrorKind, ProviderErrorCode};
use tracker_storage::{CredentialStore, StoredSession};

/// Message returned for every password reset request, whether or not the
/// account exists.
pub const PASSWORD_RESET_NOTICE: &str =
    "If an account with this email exists, a password reset link has been sent. Please check your inbox.";

/// Authenticated identity and its credential.
///
/// `token` is set exactly when `status` is `Authenticated` or
/// `AwaitingVerification`; `user_id` only when `token` is.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub status: SessionStatus,
    pub user_id: Option<String>,
    pub token: Option<String>,
    pub token_issued_at: Option<DateTime<Utc>>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
    pub email: Option<String>,
    pub profile: Option<UserProfile>,
    /// Bumped whenever the credential changes hands (login, restore, expiry, logout).
    pub epoch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous(0)
    }
}

impl Session {
    fn anonymous(epoch: u64) -> Self {
        Self {
            status: SessionStatus::Anonymous,
            user_id: None,
            token: None,
            token_issued_at: None,
            token_expires_at: None,
            last_error: None,
            email: None,
            profile: None,
            epoch,
        }
    }

    fn clear_credentials(&mut self) {
        self.user_id = None;
        self.token = None;
        self.token_issued_at = None;
        self.token_expires_at = None;
        self.email = None;
        self.profile = None;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status)
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .field("token_expires_at", &self.token_expires_at)
            .field("last_error", &self.last_error)
            .field("email", &self.email)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Outcome of [`SessionManager::send_verification_email`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationEmail {
    Sent,
    /// The account turned out to be verified already; nothing was sent.
    AlreadyVerified,
}

struct Inner {
    fsm: SessionMachine,
    session: Session,
}

/// Credential of the current session, captured for one remote call.
struct Credential {
    token: String,
    epoch: u64,
}

/// Owner of the session state machine.
pub struct SessionManager {
    provider: Arc<dyn AuthProvider>,
    credentials: Arc<CredentialStore>,
    theme: Arc<ThemePreference>,
    inner: Mutex<Inner>,
    tx: watch::Sender<Session>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        credentials: Arc<CredentialStore>,
        theme: Arc<ThemePreference>,
    ) -> Self {
        let session = Session::anonymous(0);
        let (tx, _) = watch::channel(session.clone());
        Self {
            provider,
            credentials,
            theme,
            inner: Mutex::new(Inner {
                fsm: SessionMachine::new(),
                session,
            }),
            tx,
        }
    }

    /// Observe every committed session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Session {
        self.inner.lock().session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().session.status
    }

    pub fn theme(&self) -> &Arc<ThemePreference> {
        &self.theme
    }

    // ==========================================
    // State plumbing
    // ==========================================

    fn transition(inner: &mut Inner, input: SessionMachineInput) -> AuthResult<SessionStatus> {
        let old_status = inner.session.status;
        inner.fsm.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                inner.fsm.state()
            ))
        })?;

        let new_status = SessionStatus::from(inner.fsm.state());
        inner.session.status = new_status;
        if old_status != new_status {
            debug!(old_status = %old_status, new_status = %new_status, "Session state transition");
        }
        Ok(new_status)
    }

    fn publish(&self, inner: &Inner) {
        self.tx.send_replace(inner.session.clone());
    }

    fn credential(&self) -> AuthResult<Credential> {
        let inner = self.inner.lock();
        match (&inner.session.token, inner.session.status.has_credentials()) {
            (Some(token), true) => Ok(Credential {
                token: token.clone(),
                epoch: inner.session.epoch,
            }),
            _ => Err(AuthError::NotLoggedIn),
        }
    }

    fn begin_attempt(&self) -> AuthResult<u64> {
        let mut inner = self.inner.lock();
        if inner.session.status == SessionStatus::Authenticating {
            return Err(AuthError::AttemptInProgress);
        }
        Self::transition(&mut inner, SessionMachineInput::Attempt)?;
        inner.session.epoch += 1;
        inner.session.last_error = None;
        self.publish(&inner);
        Ok(inner.session.epoch)
    }

    fn fail_attempt(&self, epoch: u64, error: AuthError) -> AuthError {
        let mut inner = self.inner.lock();
        if inner.session.epoch != epoch {
            debug!(error = %error, "Discarding failure of a superseded attempt");
            return AuthError::Superseded;
        }

        let input = if error.is_unrecoverable() {
            SessionMachineInput::Unrecoverable
        } else {
            SessionMachineInput::Rejected
        };
        if let Err(e) = Self::transition(&mut inner, input) {
            warn!(error = %e, "Unexpected state while failing attempt");
        }
        inner.session.last_error = Some(error.kind());
        self.publish(&inner);
        warn!(kind = %error.kind(), "Authentication failed");
        error
    }

    fn complete_attempt(
        &self,
        epoch: u64,
        grant: AuthGrant,
        record: Option<UserRecord>,
        lookup_error: Option<ErrorKind>,
    ) -> AuthResult<Session> {
        let mut inner = self.inner.lock();
        if inner.session.epoch != epoch {
            info!(user_id = %grant.user_id, "Session changed during authentication, discarding result");
            return Err(AuthError::Superseded);
        }

        let verified = record.as_ref().map(|r| r.email_verified).unwrap_or(false);
        let email = grant
            .email
            .clone()
            .or_else(|| record.as_ref().and_then(|r| r.email.clone()));

        let stored = StoredSession {
            token: grant.token.clone(),
            user_id: grant.user_id.clone(),
            email: email.clone(),
            verified,
            issued_at: grant.issued_at,
            expires_at: grant.expires_at,
        };
        if let Err(e) = self.credentials.persist_session(&stored) {
            let error = AuthError::from(e);
            if let Err(e) = Self::transition(&mut inner, SessionMachineInput::Rejected) {
                warn!(error = %e, "Unexpected state while failing attempt");
            }
            inner.session.last_error = Some(error.kind());
            self.publish(&inner);
            return Err(error);
        }

        let input = if verified {
            SessionMachineInput::SucceededVerified
        } else {
            SessionMachineInput::SucceededUnverified
        };
        Self::transition(&mut inner, input)?;

        let session = &mut inner.session;
        session.user_id = Some(grant.user_id);
        session.token = Some(grant.token);
        session.token_issued_at = grant.issued_at;
        session.token_expires_at = grant.expires_at;
        session.email = email;
        session.profile = record.map(|r| r.profile);
        session.last_error = lookup_error;

        self.publish(&inner);
        info!(
            user_id = ?inner.session.user_id,
            status = %inner.session.status,
            "Authenticated"
        );
        Ok(inner.session.clone())
    }

    /// Treat the credential captured at `epoch` as rejected by another remote
    /// service (for example the record store). No-op if the session moved on.
    pub fn expire_session(&self, epoch: u64) {
        self.expire(epoch);
    }

    /// Treat the credential captured at `epoch` as rejected by the provider.
    fn expire(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.session.epoch != epoch || !inner.session.status.has_credentials() {
            return;
        }
        if let Err(e) = Self::transition(&mut inner, SessionMachineInput::SessionExpired) {
            warn!(error = %e, "Unexpected state while expiring session");
            return;
        }
        if let Err(e) = self.credentials.clear_session() {
            warn!(error = %e, "Failed to clear expired credentials");
        }
        inner.session.clear_credentials();
        inner.session.epoch += 1;
        inner.session.last_error = Some(ErrorKind::AuthProvider(ProviderErrorCode::ExpiredSession));
        self.publish(&inner);
        info!("Session expired");
    }

    /// Record a failed remote call made with the credential from `epoch`.
    fn remote_failure(&self, epoch: u64, error: AuthError) -> AuthError {
        if error.is_expired_session() {
            self.expire(epoch);
            return error;
        }
        let mut inner = self.inner.lock();
        if inner.session.epoch == epoch {
            inner.session.last_error = Some(error.kind());
            self.publish(&inner);
        }
        error
    }

    // ==========================================
    // Operations
    // ==========================================

    /// Create an account. The new session awaits email verification.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> AuthResult<Session> {
        let email = validation::validate_signup(email, password, confirmation)?;
        let epoch = self.begin_attempt()?;

        match self.provider.sign_up(&email, password).await {
            Ok(grant) => {
                info!(user_id = %grant.user_id, "Account created");
                // A fresh account is never treated as verified.
                self.complete_attempt(epoch, grant, None, None)
            }
            Err(e) => Err(self.fail_attempt(epoch, e)),
        }
    }

    /// Sign in and resolve the verification status in one step.
    ///
    /// A failed verification lookup keeps the session (awaiting verification,
    /// with `last_error` set); only the sign-in itself can fail the login.
    pub async fn log_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = validation::validate_login(email, password)?;
        let epoch = self.begin_attempt()?;

        let grant = match self.provider.sign_in(&email, password).await {
            Ok(grant) => grant,
            Err(e) => return Err(self.fail_attempt(epoch, e)),
        };

        let (record, lookup_error) = match self.provider.lookup(&grant.token).await {
            Ok(record) => (Some(record), None),
            Err(e) => {
                warn!(user_id = %grant.user_id, error = %e, "Verification lookup failed after sign-in");
                (None, Some(e.kind()))
            }
        };

        self.complete_attempt(epoch, grant, record, lookup_error)
    }

    /// Ask the provider to send a verification email.
    ///
    /// The account is reloaded first; if it is already verified the session
    /// is promoted and nothing is sent.
    pub async fn send_verification_email(&self) -> AuthResult<VerificationEmail> {
        let credential = self.credential()?;

        match self.provider.lookup(&credential.token).await {
            Ok(record) if record.email_verified => {
                self.apply_record(credential.epoch, record)?;
                return Ok(VerificationEmail::AlreadyVerified);
            }
            Ok(_) => {}
            Err(e) if e.is_expired_session() => return Err(self.remote_failure(credential.epoch, e)),
            Err(e) => debug!(error = %e, "Lookup before verification email failed, sending anyway"),
        }

        match self.provider.send_verification_email(&credential.token).await {
            Ok(()) => {
                info!("Verification email sent");
                Ok(VerificationEmail::Sent)
            }
            Err(e) => Err(self.remote_failure(credential.epoch, e)),
        }
    }

    /// Reload the account and promote the session when the email is verified.
    ///
    /// Never downgrades an authenticated session; a failed lookup only sets
    /// `last_error` (unless the provider says the credential expired).
    pub async fn check_verification(&self) -> AuthResult<bool> {
        let credential = self.credential()?;
        match self.provider.lookup(&credential.token).await {
            Ok(record) => {
                let verified = record.email_verified;
                self.apply_record(credential.epoch, record)?;
                Ok(verified)
            }
            Err(e) => Err(self.remote_failure(credential.epoch, e)),
        }
    }

    fn apply_record(&self, epoch: u64, record: UserRecord) -> AuthResult<()> {
        let mut inner = self.inner.lock();
        if inner.session.epoch != epoch {
            return Err(AuthError::Superseded);
        }

        if record.email_verified && inner.session.status == SessionStatus::AwaitingVerification {
            Self::transition(&mut inner, SessionMachineInput::VerificationConfirmed)?;
            if let Err(e) = self.credentials.set_verified(true) {
                warn!(error = %e, "Failed to persist verification flag");
            }
            info!(user_id = ?inner.session.user_id, "Email verified");
        }
        if record.email.is_some() {
            inner.session.email = record.email;
        }
        inner.session.profile = Some(record.profile);
        inner.session.last_error = None;
        self.publish(&inner);
        Ok(())
    }

    /// Request a password reset email.
    ///
    /// Always answers with [`PASSWORD_RESET_NOTICE`] when the provider
    /// rejects the address, so callers cannot discover accounts. Validation
    /// and transport failures are still returned.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<&'static str> {
        let email = validation::validate_email(email)?;
        match self.provider.send_password_reset(&email).await {
            Ok(()) => Ok(PASSWORD_RESET_NOTICE),
            Err(e) => match e.kind() {
                ErrorKind::Validation | ErrorKind::Network => Err(e),
                kind => {
                    info!(kind = %kind, "Password reset rejected by provider, reporting success");
                    Ok(PASSWORD_RESET_NOTICE)
                }
            },
        }
    }

    /// Update display name and/or photo URL of the signed-in account.
    pub async fn update_profile(&self, profile: UserProfile) -> AuthResult<Session> {
        let profile = UserProfile {
            display_name: trimmed(profile.display_name),
            photo_url: trimmed(profile.photo_url),
        };
        let credential = self.credential()?;

        match self.provider.update_profile(&credential.token, &profile).await {
            Ok(record) => {
                self.apply_record(credential.epoch, record)?;
                info!("Profile updated");
                Ok(self.current())
            }
            Err(e) => Err(self.remote_failure(credential.epoch, e)),
        }
    }

    /// Sign out locally, then best-effort remotely.
    ///
    /// The in-memory session is reset first and unconditionally. Stored
    /// credentials are cleared and the theme is forced to `Light`; a failure
    /// of those local steps is returned after every step has been tried.
    pub async fn log_out(&self) -> AuthResult<()> {
        let (token, clear_result) = {
            let mut inner = self.inner.lock();
            let token = inner.session.token.take();
            Self::transition(&mut inner, SessionMachineInput::Logout)?;
            let epoch = inner.session.epoch + 1;
            inner.session = Session::anonymous(epoch);
            let clear_result = self.credentials.clear_session();
            self.publish(&inner);
            (token, clear_result)
        };

        let theme_result = self.theme.set(ThemeMode::Light);

        if let Some(token) = token {
            if let Err(e) = self.provider.sign_out(&token).await {
                warn!(error = %e, "Remote sign-out failed, local session already cleared");
            }
        }

        info!("Logged out");
        clear_result?;
        theme_result?;
        Ok(())
    }

    /// Restore a persisted session at startup without a network round trip.
    ///
    /// An unexpired token yields `Authenticated` or `AwaitingVerification`
    /// from the stored verification flag. An expired token is cleared and the
    /// session reports `Expired`.
    pub async fn rehydrate(&self) -> AuthResult<Session> {
        let stored = self.credentials.load_session()?;

        let mut inner = self.inner.lock();
        let Some(stored) = stored else {
            debug!("No stored session");
            return Ok(inner.session.clone());
        };

        if stored.is_expired_at(Utc::now()) {
            Self::transition(&mut inner, SessionMachineInput::RestoreExpired)?;
            self.credentials.clear_session()?;
            inner.session.last_error =
                Some(ErrorKind::AuthProvider(ProviderErrorCode::ExpiredSession));
            self.publish(&inner);
            info!(user_id = %stored.user_id, "Stored session expired");
            return Ok(inner.session.clone());
        }

        let input = if stored.verified {
            SessionMachineInput::RestoreVerified
        } else {
            SessionMachineInput::RestoreUnverified
        };
        Self::transition(&mut inner, input)?;

        let session = &mut inner.session;
        session.epoch += 1;
        session.user_id = Some(stored.user_id);
        session.token = Some(stored.token);
        session.token_issued_at = stored.issued_at;
        session.token_expires_at = stored.expires_at;
        session.email = stored.email;
        session.last_error = None;

        self.publish(&inner);
        info!(user_id = ?inner.session.user_id, status = %inner.session.status, "Session restored");
        Ok(inner.session.clone())
    }

    /// Dismiss the last error. `Failed` and `Expired` return to `Anonymous`.
    pub fn acknowledge_error(&self) -> Session {
        let mut inner = self.inner.lock();
        if matches!(
            inner.session.status,
            SessionStatus::Failed | SessionStatus::Expired
        ) {
            if let Err(e) = Self::transition(&mut inner, SessionMachineInput::Acknowledge) {
                warn!(error = %e, "Unexpected state while acknowledging error");
            }
        }
        inner.session.last_error = None;
        self.publish(&inner);
        inner.session.clone()
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
