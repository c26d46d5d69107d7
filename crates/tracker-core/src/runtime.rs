//! Tracker runtime: one session manager, one ledger engine and the policy
//! observer, wired together.
//!
//! The runtime threads the session credential into every ledger call and
//! reacts to session changes: logout tears the ledger down, a credential the
//! record store rejects expires the session.

use crate::export::export_csv;
use crate::policy::{evaluate, PolicyObserver, PolicyState};
use crate::{RuntimeError, RuntimeResult};
use auth_session::{
    AuthProvider, IdentityToolkitClient, Session, SessionManager, ThemeMode, ThemePreference,
    UserProfile, VerificationEmail,
};
use ledger_sync::{
    DeleteOutcome, EntryDraft, EntryPatch, Ledger, LedgerEntry, LedgerStore, LedgerSyncEngine,
    LiveSubscription, RealtimeLedgerStore, SyncContext, SyncError,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracker_config_and_utils::{Config, ErrorKind, Paths, ProviderErrorCode};
use tracker_storage::{open_credential_store, CredentialStore};

/// Tunables taken from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub premium_threshold: Decimal,
    pub live_refresh: Duration,
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            premium_threshold: Decimal::from(config.premium_threshold),
            live_refresh: Duration::from_secs(config.live_refresh_secs),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Consumer surface of the tracker.
pub struct TrackerRuntime {
    session: Arc<SessionManager>,
    theme: Arc<ThemePreference>,
    ledger: Arc<LedgerSyncEngine>,
    policy: PolicyObserver,
    live: Mutex<Option<LiveSubscription>>,
    settings: RuntimeSettings,
}

impl TrackerRuntime {
    /// Wire the runtime from its collaborators. Spawns the policy observer,
    /// so it must be called from within a Tokio runtime.
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        store: Arc<dyn LedgerStore>,
        credentials: Arc<CredentialStore>,
        settings: RuntimeSettings,
    ) -> Self {
        let theme = Arc::new(ThemePreference::load(credentials.clone()));
        let session = Arc::new(SessionManager::new(provider, credentials, theme.clone()));
        let ledger = Arc::new(LedgerSyncEngine::new(store, settings.premium_threshold));
        let policy = PolicyObserver::spawn(
            session.subscribe(),
            ledger.subscribe(),
            theme.clone(),
            settings.premium_threshold,
        );

        Self {
            session,
            theme,
            ledger,
            policy,
            live: Mutex::new(None),
            settings,
        }
    }

    /// Production wiring: file-backed credentials and the hosted REST services.
    pub fn from_config(config: &Config, paths: &Paths) -> RuntimeResult<Self> {
        config.validate()?;
        paths.ensure_dirs()?;
        let credentials = Arc::new(open_credential_store(&paths.credentials_file())?);
        let provider = Arc::new(IdentityToolkitClient::new(
            config.auth_api_url()?.as_str(),
            config.api_key.clone(),
        ));
        let store = Arc::new(RealtimeLedgerStore::new(config.database_url()?.as_str()));
        Ok(Self::new(
            provider,
            store,
            credentials,
            RuntimeSettings::from_config(config),
        ))
    }

    // ==========================================
    // Observation
    // ==========================================

    pub fn subscribe_session(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn subscribe_ledger(&self) -> watch::Receiver<Ledger> {
        self.ledger.subscribe()
    }

    pub fn subscribe_policy(&self) -> watch::Receiver<PolicyState> {
        self.policy.subscribe()
    }

    pub fn subscribe_theme(&self) -> watch::Receiver<ThemeMode> {
        self.theme.subscribe()
    }

    pub fn session(&self) -> Session {
        self.session.current()
    }

    pub fn ledger(&self) -> Ledger {
        self.ledger.snapshot()
    }

    pub fn theme(&self) -> ThemeMode {
        self.theme.mode()
    }

    /// Policy state evaluated from the current inputs.
    pub fn policy(&self) -> PolicyState {
        let session = self.session.current();
        evaluate(
            &self.ledger.snapshot(),
            &session,
            session.status,
            self.theme.mode(),
            self.settings.premium_threshold,
        )
        .state
    }

    pub fn settings(&self) -> RuntimeSettings {
        self.settings
    }

    // ==========================================
    // Lifecycle
    // ==========================================

    /// Restore the stored session and, if it holds a credential, load the ledger.
    pub async fn start(&self) -> RuntimeResult<Session> {
        let session = self.session.rehydrate().await?;
        if session.status.has_credentials() {
            self.load_after_sign_in().await;
        }
        Ok(self.session.current())
    }

    /// Stop background work. Stored credentials are kept.
    pub fn shutdown(&self) {
        self.stop_live();
        self.policy.stop();
        debug!("runtime shut down");
    }

    // ==========================================
    // Session
    // ==========================================

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> RuntimeResult<Session> {
        let session = self.session.sign_up(email, password, confirmation).await?;
        self.load_after_sign_in().await;
        Ok(session)
    }

    pub async fn log_in(&self, email: &str, password: &str) -> RuntimeResult<Session> {
        let session = self.session.log_in(email, password).await?;
        self.load_after_sign_in().await;
        Ok(session)
    }

    pub async fn send_verification_email(&self) -> RuntimeResult<VerificationEmail> {
        let result = self.session.send_verification_email().await;
        self.drop_ledger_if_signed_out();
        Ok(result?)
    }

    pub async fn check_verification(&self) -> RuntimeResult<bool> {
        let verified = self.session.check_verification().await;
        self.drop_ledger_if_signed_out();
        Ok(verified?)
    }

    pub async fn request_password_reset(&self, email: &str) -> RuntimeResult<&'static str> {
        Ok(self.session.request_password_reset(email).await?)
    }

    pub async fn update_profile(&self, profile: UserProfile) -> RuntimeResult<Session> {
        let result = self.session.update_profile(profile).await;
        self.drop_ledger_if_signed_out();
        Ok(result?)
    }

    /// Sign out locally (always) and remotely (best effort). In-flight ledger
    /// requests finish without touching the emptied ledger.
    pub async fn log_out(&self) -> RuntimeResult<()> {
        self.stop_live();
        self.ledger.reset();
        let result = self.session.log_out().await;
        info!("runtime logged out");
        Ok(result?)
    }

    pub fn acknowledge_error(&self) -> Session {
        self.session.acknowledge_error()
    }

    // ==========================================
    // Ledger
    // ==========================================

    pub async fn load_ledger(&self) -> RuntimeResult<Ledger> {
        let ctx = self.context()?;
        self.ledger
            .load(&ctx)
            .await
            .map_err(|e| self.sync_failure(&ctx, e))?;
        Ok(self.ledger.snapshot())
    }

    pub async fn create_entry(&self, draft: EntryDraft) -> RuntimeResult<LedgerEntry> {
        let ctx = self.context()?;
        self.ledger
            .create(&ctx, draft)
            .await
            .map_err(|e| self.sync_failure(&ctx, e))
    }

    pub async fn update_entry(&self, id: &str, patch: EntryPatch) -> RuntimeResult<LedgerEntry> {
        let ctx = self.context()?;
        self.ledger
            .update(&ctx, id, patch)
            .await
            .map_err(|e| self.sync_failure(&ctx, e))
    }

    pub async fn delete_entry(&self, id: &str) -> RuntimeResult<DeleteOutcome> {
        let ctx = self.context()?;
        let outcome = self
            .ledger
            .delete(&ctx, id)
            .await
            .map_err(|e| self.sync_failure(&ctx, e))?;
        if let DeleteOutcome::LocalOnly { error } = outcome {
            if error == ErrorKind::AuthProvider(ProviderErrorCode::ExpiredSession) {
                self.expire(&ctx);
            }
        }
        Ok(outcome)
    }

    pub fn total(&self) -> Decimal {
        self.ledger.total()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.ledger.entries()
    }

    /// CSV of the visible entries, newest first.
    pub fn export_csv(&self) -> String {
        export_csv(&self.ledger.entries())
    }

    /// Turn premium on and switch to the dark theme.
    pub fn activate_premium(&self) -> RuntimeResult<()> {
        self.context()?;
        self.ledger.activate_premium()?;
        self.theme.set(ThemeMode::Dark)?;
        Ok(())
    }

    /// Switch between light and dark. Dark requires premium.
    pub fn toggle_theme(&self) -> RuntimeResult<ThemeMode> {
        let next = self.theme.mode().toggled();
        if next == ThemeMode::Dark && !self.ledger.premium_activated() {
            return Err(RuntimeError::PremiumRequired);
        }
        Ok(self.theme.set(next)?)
    }

    /// Keep the ledger in step with the store until [`Self::stop_live`] or logout.
    pub fn start_live(&self) -> RuntimeResult<()> {
        let ctx = self.context()?;
        let subscription = self
            .ledger
            .watch_remote(ctx, self.settings.live_refresh);
        if self.live.lock().replace(subscription).is_some() {
            debug!("replaced running live reload");
        }
        Ok(())
    }

    pub fn stop_live(&self) {
        if let Some(subscription) = self.live.lock().take() {
            subscription.cancel();
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
            .lock()
            .as_ref()
            .is_some_and(LiveSubscription::is_active)
    }

    // ==========================================
    // Internals
    // ==========================================

    fn context(&self) -> RuntimeResult<SyncContext> {
        Ok(SyncContext::from_session(&self.session.current())?)
    }

    async fn load_after_sign_in(&self) {
        match self.load_ledger().await {
            Ok(ledger) => debug!(count = ledger.entries.len(), "ledger loaded after sign-in"),
            Err(e) => warn!(error = %e, "initial ledger load failed"),
        }
    }

    /// Map a ledger failure, expiring the session when the store rejected the
    /// credential.
    fn sync_failure(&self, ctx: &SyncContext, error: SyncError) -> RuntimeError {
        if matches!(error, SyncError::ExpiredSession) {
            self.expire(ctx);
        }
        RuntimeError::Sync(error)
    }

    fn expire(&self, ctx: &SyncContext) {
        warn!(user_id = %ctx.user_id, "record store rejected the session credential");
        self.stop_live();
        self.session.expire_session(ctx.epoch);
        self.drop_ledger_if_signed_out();
    }

    fn drop_ledger_if_signed_out(&self) {
        if !self.session.status().has_credentials() {
            self.stop_live();
            self.ledger.reset();
        }
    }
}

impl Drop for TrackerRuntime {
    fn drop(&mut self) {
        self.stop_live();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_session::SessionStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_from_config_creates_layout_and_starts_anonymous() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(temp.path().join("tracker"));

        let runtime = TrackerRuntime::from_config(&Config::default(), &paths).unwrap();
        assert!(paths.logs_dir().is_dir());
        assert_eq!(
            runtime.settings().premium_threshold,
            Decimal::from(tracker_config_and_utils::DEFAULT_PREMIUM_THRESHOLD)
        );

        let session = runtime.start().await.unwrap();
        assert_eq!(session.status, SessionStatus::Anonymous);
        assert_eq!(runtime.theme(), ThemeMode::Light);
        runtime.shutdown();
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(temp.path().to_path_buf());
        let config = Config {
            live_refresh_secs: 0,
            ..Config::default()
        };
        let err = TrackerRuntime::from_config(&config, &paths).err().unwrap();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
