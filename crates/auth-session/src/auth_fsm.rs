//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌─────────────────┐
//!                 │    Anonymous    │ (initial)
//!                 └────────┬────────┘
//!     Attempt              │            RestoreVerified / RestoreUnverified / RestoreExpired
//!          ┌───────────────┴──────────────────────────┐
//!          ▼                                          ▼
//! ┌─────────────────┐  Rejected            (Authenticated / AwaitingVerification / Expired)
//! │ Authenticating  │ ─────────► Anonymous
//! └────────┬────────┘
//!          │ Unrecoverable ──► Failed ──(Acknowledge)──► Anonymous
//!          │
//!          │ SucceededVerified          SucceededUnverified
//!          ▼                                    ▼
//! ┌─────────────────┐  VerificationConfirmed ┌──────────────────────┐
//! │  Authenticated  │ ◄───────────────────── │ AwaitingVerification │
//! └────────┬────────┘                        └──────────┬───────────┘
//!          │ SessionExpired                             │ SessionExpired
//!          ▼                                            ▼
//! ┌─────────────────┐
//! │     Expired     │ ──(Attempt)──► Authenticating, ──(Acknowledge)──► Anonymous
//! └─────────────────┘
//!
//! Logout leads every state back to Anonymous.
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Anonymous)

    Anonymous => {
        Attempt => Authenticating,
        RestoreVerified => Authenticated,
        RestoreUnverified => AwaitingVerification,
        RestoreExpired => Expired,
        Logout => Anonymous
    },
    Authenticating => {
        SucceededVerified => Authenticated,
        SucceededUnverified => AwaitingVerification,
        // Bad credentials, throttling, network: the user can simply try again
        Rejected => Anonymous,
        Unrecoverable => Failed,
        Logout => Anonymous
    },
    AwaitingVerification => {
        VerificationConfirmed => Authenticated,
        SessionExpired => Expired,
        Logout => Anonymous
    },
    Authenticated => {
        SessionExpired => Expired,
        Logout => Anonymous
    },
    Expired => {
        Attempt => Authenticating,
        Acknowledge => Anonymous,
        Logout => Anonymous
    },
    Failed => {
        Acknowledge => Anonymous,
        Logout => Anonymous
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session status for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No credentials.
    Anonymous,
    /// A sign-in or sign-up request is in flight.
    Authenticating,
    /// Signed in with a verified email.
    Authenticated,
    /// Signed in, email not verified yet.
    AwaitingVerification,
    /// The provider rejected the stored credential.
    Expired,
    /// Sign-in hit an unrecoverable provider error; needs acknowledgement.
    Failed,
}

impl SessionStatus {
    /// Returns true if the session holds a credential usable for remote calls.
    pub fn has_credentials(&self) -> bool {
        matches!(
            self,
            SessionStatus::Authenticated | SessionStatus::AwaitingVerification
        )
    }

    /// Returns true for the fully verified state (protected views).
    pub fn is_verified(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Anonymous => "anonymous",
            SessionStatus::Authenticating => "authenticating",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::AwaitingVerification => "awaiting_verification",
            SessionStatus::Expired => "expired",
            SessionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SessionMachineState> for SessionStatus {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Anonymous => SessionStatus::Anonymous,
            SessionMachineState::Authenticating => SessionStatus::Authenticating,
            SessionMachineState::Authenticated => SessionStatus::Authenticated,
            SessionMachineState::AwaitingVerification => SessionStatus::AwaitingVerification,
            SessionMachineState::Expired => SessionStatus::Expired,
            SessionMachineState::Failed => SessionStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(inputs: &[SessionMachineInput]) -> SessionMachine {
        let mut machine = SessionMachine::new();
        for input in inputs {
            machine.consume(input).unwrap();
        }
        machine
    }

    #[test]
    fn test_initial_state_is_anonymous() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_login_unverified_then_verified() {
        let mut machine = machine_in(&[
            SessionMachineInput::Attempt,
            SessionMachineInput::SucceededUnverified,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::AwaitingVerification);

        machine
            .consume(&SessionMachineInput::VerificationConfirmed)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_duplicate_attempt_rejected() {
        let mut machine = machine_in(&[SessionMachineInput::Attempt]);
        assert!(machine.consume(&SessionMachineInput::Attempt).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Authenticating);
    }

    #[test]
    fn test_rejected_returns_to_anonymous() {
        let machine = machine_in(&[SessionMachineInput::Attempt, SessionMachineInput::Rejected]);
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_failed_only_from_authenticating() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::Unrecoverable).is_err());

        let mut machine = machine_in(&[
            SessionMachineInput::Attempt,
            SessionMachineInput::Unrecoverable,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::Failed);

        // Failed cannot start a new attempt before acknowledgement
        assert!(machine.consume(&SessionMachineInput::Attempt).is_err());
        machine.consume(&SessionMachineInput::Acknowledge).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Anonymous);
    }

    #[test]
    fn test_expired_session_flow() {
        let mut machine = machine_in(&[
            SessionMachineInput::Attempt,
            SessionMachineInput::SucceededVerified,
            SessionMachineInput::SessionExpired,
        ]);
        assert_eq!(*machine.state(), SessionMachineState::Expired);

        machine.consume(&SessionMachineInput::Attempt).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticating);
    }

    #[test]
    fn test_verified_never_downgrades() {
        let mut machine = machine_in(&[
            SessionMachineInput::Attempt,
            SessionMachineInput::SucceededVerified,
        ]);
        assert!(machine
            .consume(&SessionMachineInput::SucceededUnverified)
            .is_err());
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_logout_from_every_state() {
        let paths: Vec<Vec<SessionMachineInput>> = vec![
            vec![],
            vec![SessionMachineInput::Attempt],
            vec![SessionMachineInput::RestoreVerified],
            vec![SessionMachineInput::RestoreUnverified],
            vec![SessionMachineInput::RestoreExpired],
            vec![
                SessionMachineInput::Attempt,
                SessionMachineInput::Unrecoverable,
            ],
        ];

        for path in paths {
            let mut machine = machine_in(&path);
            machine.consume(&SessionMachineInput::Logout).unwrap();
            assert_eq!(*machine.state(), SessionMachineState::Anonymous);
        }
    }

    #[test]
    fn test_restore_only_from_anonymous() {
        let mut machine = machine_in(&[SessionMachineInput::RestoreVerified]);
        assert!(machine
            .consume(&SessionMachineInput::RestoreUnverified)
            .is_err());
    }

    #[test]
    fn test_status_conversion_and_credentials() {
        let status = SessionStatus::from(&SessionMachineState::AwaitingVerification);
        assert_eq!(status, SessionStatus::AwaitingVerification);
        assert!(status.has_credentials());
        assert!(!status.is_verified());

        assert!(SessionStatus::Authenticated.has_credentials());
        assert!(SessionStatus::Authenticated.is_verified());
        for status in [
            SessionStatus::Anonymous,
            SessionStatus::Authenticating,
            SessionStatus::Expired,
            SessionStatus::Failed,
        ] {
            assert!(!status.has_credentials(), "{status} must not hold a token");
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::AwaitingVerification).unwrap();
        assert_eq!(json, "\"awaiting_verification\"");
    }
}
