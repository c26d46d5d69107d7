//! Session management for the expense tracker.
//!
//! This crate provides:
//! - Explicit FSM-based session state (`auth_fsm`)
//! - `SessionManager`: sign-up, login, email verification, password reset,
//!   profile updates, logout and startup rehydration
//! - Credential persistence through the tracker token store
//! - `IdentityToolkitClient`: REST client for the hosted identity service
//! - `ThemePreference`: light/dark mode stored next to the credentials

mod auth_fsm;
mod error;
mod identity_toolkit;
mod provider;
mod session;
mod theme;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth_fsm::session_machine;
pub use auth_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionStatus};
pub use error::{AuthError, AuthResult};
pub use identity_toolkit::IdentityToolkitClient;
pub use provider::{AuthGrant, AuthProvider, UserProfile, UserRecord};
pub use session::{Session, SessionManager, VerificationEmail, PASSWORD_RESET_NOTICE};
pub use theme::{ThemeMode, ThemePreference};
