//! Scriptable in-process auth provider for tests.

use crate::provider::{AuthGrant, AuthProvider, UserProfile, UserRecord};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracker_config_and_utils::ProviderErrorCode;

/// Provider operations that can be scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    SignIn,
    SignUp,
    Lookup,
    SendVerification,
    SendPasswordReset,
    UpdateProfile,
    SignOut,
}

/// Pauses one provider call until released.
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Wait until the held call has reached the provider.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    password: String,
    verified: bool,
    profile: UserProfile,
}

#[derive(Default)]
struct ScriptState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    failures: HashMap<ProviderOp, VecDeque<AuthError>>,
    gates: HashMap<ProviderOp, Gate>,
    calls: HashMap<ProviderOp, usize>,
    issued: u64,
}

/// In-memory provider with accounts, injectable failures and call gates.
#[derive(Default)]
pub struct ScriptedAuthProvider {
    state: Mutex<ScriptState>,
}

impl ScriptedAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and return its user id.
    pub fn add_account(&self, email: &str, password: &str, verified: bool) -> String {
        let mut state = self.state.lock();
        let user_id = format!("uid-{}", state.accounts.len() + 1);
        state.accounts.insert(
            email.to_string(),
            Account {
                user_id: user_id.clone(),
                password: password.to_string(),
                verified,
                profile: UserProfile::default(),
            },
        );
        user_id
    }

    pub fn set_verified(&self, email: &str, verified: bool) {
        if let Some(account) = self.state.lock().accounts.get_mut(email) {
            account.verified = verified;
        }
    }

    /// Make the next call of `op` fail with `error`. Failures queue up.
    pub fn fail_next(&self, op: ProviderOp, error: AuthError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Hold the next call of `op` until the returned gate is released.
    pub fn hold_next(&self, op: ProviderOp) -> Gate {
        let gate = Gate::default();
        self.state.lock().gates.insert(op, gate.clone());
        gate
    }

    /// Invalidate every issued token, as if they all expired server-side.
    pub fn expire_all_tokens(&self) {
        self.state.lock().tokens.clear();
    }

    /// Number of calls made for `op` (including failed ones).
    pub fn calls(&self, op: ProviderOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: ProviderOp) -> AuthResult<()> {
        let (gate, failure) = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_default() += 1;
            let gate = state.gates.remove(&op);
            let failure = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (gate, failure)
        };

        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn issue_grant(state: &mut ScriptState, email: &str, user_id: &str) -> AuthGrant {
        state.issued += 1;
        let token = format!("token-{}-{}", user_id, state.issued);
        state.tokens.insert(token.clone(), email.to_string());
        let now = Utc::now();
        AuthGrant {
            token,
            user_id: user_id.to_string(),
            email: Some(email.to_string()),
            issued_at: Some(now),
            expires_at: Some(now + Duration::hours(1)),
        }
    }

    fn account_for_token(state: &ScriptState, token: &str) -> AuthResult<Account> {
        state
            .tokens
            .get(token)
            .and_then(|email| state.accounts.get(email))
            .cloned()
            .ok_or_else(|| AuthError::provider(ProviderErrorCode::ExpiredSession, "INVALID_ID_TOKEN"))
    }

    fn record(email: &str, account: &Account) -> UserRecord {
        UserRecord {
            email: Some(email.to_string()),
            email_verified: account.verified,
            profile: account.profile.clone(),
        }
    }
}

#[async_trait]
impl AuthProvider for ScriptedAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthGrant> {
        self.enter(ProviderOp::SignIn).await?;
        let mut state = self.state.lock();
        let account = match state.accounts.get(email) {
            Some(account) if account.password == password => account.clone(),
            _ => {
                return Err(AuthError::provider(
                    ProviderErrorCode::InvalidCredentials,
                    "INVALID_LOGIN_CREDENTIALS",
                ))
            }
        };
        Ok(Self::issue_grant(&mut state, email, &account.user_id))
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthGrant> {
        self.enter(ProviderOp::SignUp).await?;
        let mut state = self.state.lock();
        if state.accounts.contains_key(email) {
            return Err(AuthError::provider(ProviderErrorCode::AlreadyExists, "EMAIL_EXISTS"));
        }
        let user_id = format!("uid-{}", state.accounts.len() + 1);
        state.accounts.insert(
            email.to_string(),
            Account {
                user_id: user_id.clone(),
                password: password.to_string(),
                verified: false,
                profile: UserProfile::default(),
            },
        );
        Ok(Self::issue_grant(&mut state, email, &user_id))
    }

    async fn lookup(&self, token: &str) -> AuthResult<UserRecord> {
        self.enter(ProviderOp::Lookup).await?;
        let state = self.state.lock();
        let account = Self::account_for_token(&state, token)?;
        let email = state.tokens.get(token).cloned().unwrap_or_default();
        Ok(Self::record(&email, &account))
    }

    async fn send_verification_email(&self, token: &str) -> AuthResult<()> {
        self.enter(ProviderOp::SendVerification).await?;
        Self::account_for_token(&self.state.lock(), token).map(|_| ())
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        self.enter(ProviderOp::SendPasswordReset).await?;
        if self.state.lock().accounts.contains_key(email) {
            Ok(())
        } else {
            Err(AuthError::provider(
                ProviderErrorCode::InvalidCredentials,
                "EMAIL_NOT_FOUND",
            ))
        }
    }

    async fn update_profile(&self, token: &str, profile: &UserProfile) -> AuthResult<UserRecord> {
        self.enter(ProviderOp::UpdateProfile).await?;
        let mut state = self.state.lock();
        Self::account_for_token(&state, token)?;
        let email = state.tokens.get(token).cloned().unwrap_or_default();
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or_else(|| AuthError::provider(ProviderErrorCode::ExpiredSession, "USER_NOT_FOUND"))?;
        if profile.display_name.is_some() {
            account.profile.display_name = profile.display_name.clone();
        }
        if profile.photo_url.is_some() {
            account.profile.photo_url = profile.photo_url.clone();
        }
        Ok(Self::record(&email, account))
    }

    async fn sign_out(&self, token: &str) -> AuthResult<()> {
        self.enter(ProviderOp::SignOut).await?;
        self.state.lock().tokens.remove(token);
        Ok(())
    }
}
