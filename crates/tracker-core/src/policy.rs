//! Policy rules derived from the ledger, the session and the theme.
//!
//! [`evaluate`] is pure. [`PolicyObserver`] re-runs it on every change of its
//! inputs, publishes the resulting [`PolicyState`] and executes the commands.

use auth_session::{Session, SessionStatus, ThemeMode, ThemePreference};
use ledger_sync::Ledger;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Derived view for consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyState {
    /// Offer premium activation to the user.
    pub premium_offer: bool,
    pub premium_activated: bool,
    /// Premium can be activated now.
    pub activation_allowed: bool,
    /// Theme to render. Dark only applies inside a session; choosing it
    /// takes premium, and the stored choice survives a restart.
    pub effective_theme: ThemeMode,
    pub total: Decimal,
    pub threshold: Decimal,
}

/// Side effect requested by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCommand {
    ForceLight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub state: PolicyState,
    pub commands: Vec<PolicyCommand>,
}

/// Apply every rule to one observation of the inputs.
///
/// `previous` is the session status seen on the prior observation. Light is
/// forced only when a session ends (credentials lost, expiry or failure), never
/// because the session has not been restored yet.
pub fn evaluate(
    ledger: &Ledger,
    session: &Session,
    previous: SessionStatus,
    theme: ThemeMode,
    threshold: Decimal,
) -> PolicyOutcome {
    let signed_in = session.status.has_credentials();
    let premium_offer = signed_in && ledger.total > threshold && !ledger.premium_activated;
    let effective_theme = if signed_in { theme } else { ThemeMode::Light };
    let session_ended = !signed_in
        && (previous.has_credentials()
            || matches!(session.status, SessionStatus::Expired | SessionStatus::Failed));

    let mut commands = Vec::new();
    if session_ended && theme == ThemeMode::Dark {
        commands.push(PolicyCommand::ForceLight);
    }

    PolicyOutcome {
        state: PolicyState {
            premium_offer,
            premium_activated: ledger.premium_activated,
            activation_allowed: signed_in && ledger.threshold_crossed && !ledger.premium_activated,
            effective_theme,
            total: ledger.total,
            threshold,
        },
        commands,
    }
}

/// Background task keeping [`PolicyState`] current. Stops when dropped.
pub struct PolicyObserver {
    rx: watch::Receiver<PolicyState>,
    handle: JoinHandle<()>,
}

impl PolicyObserver {
    /// Start observing. Must be called from within a Tokio runtime.
    pub fn spawn(
        mut session_rx: watch::Receiver<Session>,
        mut ledger_rx: watch::Receiver<Ledger>,
        theme: Arc<ThemePreference>,
        threshold: Decimal,
    ) -> Self {
        let mut theme_rx = theme.subscribe();
        let mut previous = session_rx.borrow().status;
        let initial = evaluate(
            &ledger_rx.borrow(),
            &session_rx.borrow(),
            previous,
            *theme_rx.borrow(),
            threshold,
        );
        let (tx, rx) = watch::channel(initial.state);

        let handle = tokio::spawn(async move {
            loop {
                // Copy the inputs out; theme commands write to a watched channel.
                let session = session_rx.borrow_and_update().clone();
                let ledger = ledger_rx.borrow_and_update().clone();
                let mode = *theme_rx.borrow_and_update();

                let outcome = evaluate(&ledger, &session, previous, mode, threshold);
                previous = session.status;
                for command in &outcome.commands {
                    match command {
                        PolicyCommand::ForceLight => {
                            info!(status = %session.status, "session ended, forcing light theme");
                            if let Err(e) = theme.set(ThemeMode::Light) {
                                warn!(error = %e, "failed to force light theme");
                            }
                        }
                    }
                }
                tx.send_if_modified(|current| {
                    if *current == outcome.state {
                        false
                    } else {
                        debug!(premium_offer = outcome.state.premium_offer, "policy state changed");
                        *current = outcome.state;
                        true
                    }
                });

                let closed = tokio::select! {
                    r = session_rx.changed() => r.is_err(),
                    r = ledger_rx.changed() => r.is_err(),
                    r = theme_rx.changed() => r.is_err(),
                };
                if closed {
                    debug!("policy inputs closed, observer exiting");
                    break;
                }
            }
        });

        Self { rx, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<PolicyState> {
        self.rx.clone()
    }

    pub fn current(&self) -> PolicyState {
        self.rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for PolicyObserver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_session::SessionStatus;

    fn session(status: SessionStatus) -> Session {
        let mut session = Session::default();
        session.status = status;
        if status.has_credentials() {
            session.token = Some("token-1".to_string());
            session.user_id = Some("uid-1".to_string());
        }
        session
    }

    fn ledger(total: i64, crossed: bool, activated: bool) -> Ledger {
        Ledger {
            total: Decimal::from(total),
            threshold_crossed: crossed,
            premium_activated: activated,
            ..Ledger::default()
        }
    }

    const THRESHOLD: i64 = 10_000;

    fn run(ledger: &Ledger, session: &Session, theme: ThemeMode) -> PolicyOutcome {
        evaluate(ledger, session, session.status, theme, Decimal::from(THRESHOLD))
    }

    #[test]
    fn test_offer_strictly_above_threshold() {
        let authed = session(SessionStatus::Authenticated);
        assert!(!run(&ledger(10_000, false, false), &authed, ThemeMode::Light).state.premium_offer);

        let outcome = run(&ledger(10_001, true, false), &authed, ThemeMode::Light);
        assert!(outcome.state.premium_offer);
        assert!(outcome.state.activation_allowed);
        assert!(outcome.commands.is_empty());
    }

    #[test]
    fn test_no_offer_once_activated() {
        let authed = session(SessionStatus::AwaitingVerification);
        let outcome = run(&ledger(20_000, true, true), &authed, ThemeMode::Dark);
        assert!(!outcome.state.premium_offer);
        assert!(!outcome.state.activation_allowed);
        assert_eq!(outcome.state.effective_theme, ThemeMode::Dark);
    }

    #[test]
    fn test_activation_allowed_after_drop_below_threshold() {
        let authed = session(SessionStatus::Authenticated);
        let outcome = run(&ledger(500, true, false), &authed, ThemeMode::Light);
        assert!(!outcome.state.premium_offer);
        assert!(outcome.state.activation_allowed);
    }

    #[test]
    fn test_stored_dark_renders_inside_session_only() {
        let authed = session(SessionStatus::Authenticated);
        let outcome = run(&ledger(0, false, false), &authed, ThemeMode::Dark);
        assert_eq!(outcome.state.effective_theme, ThemeMode::Dark);
        assert!(outcome.commands.is_empty());

        let anonymous = session(SessionStatus::Anonymous);
        let outcome = run(&ledger(0, false, false), &anonymous, ThemeMode::Dark);
        assert_eq!(outcome.state.effective_theme, ThemeMode::Light);
    }

    #[test]
    fn test_session_end_forces_light() {
        for status in [SessionStatus::Anonymous, SessionStatus::Expired, SessionStatus::Failed] {
            let outcome = evaluate(
                &ledger(0, false, false),
                &session(status),
                SessionStatus::Authenticated,
                ThemeMode::Dark,
                Decimal::from(THRESHOLD),
            );
            assert_eq!(outcome.commands, vec![PolicyCommand::ForceLight]);
        }
        for status in [SessionStatus::Expired, SessionStatus::Failed] {
            let outcome = run(&ledger(0, false, false), &session(status), ThemeMode::Dark);
            assert_eq!(outcome.commands, vec![PolicyCommand::ForceLight]);
        }
        let outcome = evaluate(
            &ledger(0, false, false),
            &session(SessionStatus::Anonymous),
            SessionStatus::Authenticated,
            ThemeMode::Light,
            Decimal::from(THRESHOLD),
        );
        assert!(outcome.commands.is_empty());
    }

    #[test]
    fn test_not_yet_restored_session_keeps_dark() {
        // Anonymous before the stored session is restored, then restored.
        let outcome = run(&ledger(0, false, false), &session(SessionStatus::Anonymous), ThemeMode::Dark);
        assert!(outcome.commands.is_empty());

        let outcome = evaluate(
            &ledger(0, false, false),
            &session(SessionStatus::Authenticated),
            SessionStatus::Anonymous,
            ThemeMode::Dark,
            Decimal::from(THRESHOLD),
        );
        assert!(outcome.commands.is_empty());
        assert_eq!(outcome.state.effective_theme, ThemeMode::Dark);
    }

    #[tokio::test]
    async fn test_observer_publishes_and_forces_light() {
        let credentials = Arc::new(tracker_storage::in_memory_credential_store());
        let theme = Arc::new(ThemePreference::load(credentials));
        theme.set(ThemeMode::Dark).unwrap();

        let (session_tx, session_rx) = watch::channel(session(SessionStatus::Authenticated));
        let (ledger_tx, ledger_rx) = watch::channel(ledger(0, false, false));
        let observer = PolicyObserver::spawn(
            session_rx,
            ledger_rx,
            theme.clone(),
            Decimal::from(THRESHOLD),
        );
        let mut policy_rx = observer.subscribe();

        ledger_tx.send_replace(ledger(12_000, true, false));
        policy_rx.wait_for(|state| state.premium_offer).await.unwrap();
        assert_eq!(theme.mode(), ThemeMode::Dark);

        session_tx.send_replace(session(SessionStatus::Anonymous));
        let mut theme_rx = theme.subscribe();
        theme_rx
            .wait_for(|mode| *mode == ThemeMode::Light)
            .await
            .unwrap();
        policy_rx.wait_for(|state| !state.premium_offer).await.unwrap();
        assert!(observer.is_running());
    }
}
