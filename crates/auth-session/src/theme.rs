//! Theme preference persisted next to the session credentials.

use crate::AuthResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracker_config_and_utils::ValidationError;
use tracker_storage::CredentialStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            other => Err(ValidationError::new(
                "theme",
                format!("unknown theme mode '{}'", other),
            )),
        }
    }
}

/// Observable theme mode backed by the token store.
///
/// The stored value survives logout; the session manager forces `Light` on
/// logout explicitly.
pub struct ThemePreference {
    credentials: Arc<CredentialStore>,
    tx: watch::Sender<ThemeMode>,
}

impl ThemePreference {
    /// Read the stored mode. Missing or unreadable values mean `Light`.
    pub fn load(credentials: Arc<CredentialStore>) -> Self {
        let mode = match credentials.theme_mode() {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring stored theme mode");
                ThemeMode::Light
            }),
            Ok(None) => ThemeMode::Light,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read theme mode");
                ThemeMode::Light
            }
        };
        let (tx, _) = watch::channel(mode);
        Self { credentials, tx }
    }

    pub fn mode(&self) -> ThemeMode {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThemeMode> {
        self.tx.subscribe()
    }

    /// Persist and publish `mode`. Watchers are only woken on an actual change.
    pub fn set(&self, mode: ThemeMode) -> AuthResult<ThemeMode> {
        self.credentials.set_theme_mode(mode.as_str())?;
        let changed = self.tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        });
        if changed {
            tracing::info!(mode = %mode, "theme changed");
        }
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_storage::in_memory_credential_store;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Dark".parse::<ThemeMode>().unwrap(), ThemeMode::Dark);
        assert_eq!(" light ".parse::<ThemeMode>().unwrap(), ThemeMode::Light);
        assert!("sepia".parse::<ThemeMode>().is_err());
        assert_eq!(ThemeMode::Dark.to_string(), "dark");
        assert_eq!(ThemeMode::Light.toggled(), ThemeMode::Dark);
    }

    #[test]
    fn test_defaults_to_light() {
        let theme = ThemePreference::load(Arc::new(in_memory_credential_store()));
        assert_eq!(theme.mode(), ThemeMode::Light);
    }

    #[test]
    fn test_set_persists_and_publishes() {
        let credentials = Arc::new(in_memory_credential_store());
        let theme = ThemePreference::load(credentials.clone());
        let mut rx = theme.subscribe();

        theme.set(ThemeMode::Dark).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ThemeMode::Dark);
        assert_eq!(credentials.theme_mode().unwrap(), Some("dark".to_string()));

        theme.set(ThemeMode::Dark).unwrap();
        assert!(!rx.has_changed().unwrap());

        let reloaded = ThemePreference::load(credentials);
        assert_eq!(reloaded.mode(), ThemeMode::Dark);
    }

    #[test]
    fn test_unknown_stored_value_falls_back() {
        let credentials = Arc::new(in_memory_credential_store());
        credentials.set_theme_mode("neon").unwrap();
        let theme = ThemePreference::load(credentials);
        assert_eq!(theme.mode(), ThemeMode::Light);
    }
}
