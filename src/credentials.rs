//! Host-provided API key selection.
//!
//! Some hosts let the user pick which API key (and so which billing project)
//! requests run under. The session talks to that capability through
//! [`CredentialHook`]; when the host offers none, [`KeySelector`] degrades to
//! a static instruction.

use async_trait::async_trait;
use std::sync::Arc;

/// Shown when no key selection is available.
pub const NO_KEY_SELECTION_MESSAGE: &str = "Please use the .env configuration for local builds.";

/// Key selection capability offered by the host environment.
#[async_trait]
pub trait CredentialHook: Send + Sync {
    /// Returns true if the user already picked a key.
    async fn has_selected_api_key(&self) -> bool;

    /// Opens the host's interactive key picker.
    async fn open_select_key(&self);
}

/// What happened when key selection was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    /// A key was already selected.
    AlreadySelected,
    /// The host picker was opened.
    Opened,
    /// The host offers no picker; the message explains what to do instead.
    Unavailable(&'static str),
}

/// Optional [`CredentialHook`] plus the fallback behavior when it is absent.
#[derive(Clone, Default)]
pub struct KeySelector {
    hook: Option<Arc<dyn CredentialHook>>,
}

impl KeySelector {
    /// Wraps a host hook.
    pub fn new(hook: Arc<dyn CredentialHook>) -> Self {
        Self { hook: Some(hook) }
    }

    /// A selector for hosts without key selection.
    pub fn unavailable() -> Self {
        Self { hook: None }
    }

    /// Returns true if the host provides key selection.
    pub fn is_available(&self) -> bool {
        self.hook.is_some()
    }

    /// Opens the picker unconditionally.
    pub async fn open(&self) -> KeySelection {
        match &self.hook {
            Some(hook) => {
                hook.open_select_key().await;
                KeySelection::Opened
            }
            None => {
                tracing::info!("{}", NO_KEY_SELECTION_MESSAGE);
                KeySelection::Unavailable(NO_KEY_SELECTION_MESSAGE)
            }
        }
    }

    /// Opens the picker only when no key is selected yet.
    ///
    /// Without a hook this is a no-op: the backend falls back to the key it
    /// was built with.
    pub async fn ensure_selected(&self) -> KeySelection {
        let Some(hook) = &self.hook else {
            return KeySelection::Unavailable(NO_KEY_SELECTION_MESSAGE);
        };
        if hook.has_selected_api_key().await {
            return KeySelection::AlreadySelected;
        }
        tracing::debug!("no API key selected, opening key selection");
        hook.open_select_key().await;
        KeySelection::Opened
    }

    /// Opens the picker on the runtime without waiting for it.
    ///
    /// Returns `None` when the host has no picker or no tokio runtime is
    /// running.
    pub fn nudge(&self) -> Option<tokio::task::JoinHandle<()>> {
        let hook = self.hook.clone()?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, skipping key selection nudge");
            return None;
        };
        tracing::debug!("credential failure, nudging key selection");
        Some(runtime.spawn(async move {
            hook.open_select_key().await;
        }))
    }
}

impl std::fmt::Debug for KeySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySelector")
            .field("available", &self.is_available())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingHook;
    use super::*;

    #[tokio::test]
    async fn test_ensure_selected_opens_picker_once() {
        let hook = Arc::new(CountingHook::default());
        let selector = KeySelector::new(hook.clone());

        assert_eq!(selector.ensure_selected().await, KeySelection::Opened);
        assert_eq!(selector.ensure_selected().await, KeySelection::AlreadySelected);
        assert_eq!(hook.opened(), 1);
    }

    #[tokio::test]
    async fn test_ensure_selected_with_existing_key() {
        let hook = Arc::new(CountingHook::with_key());
        let selector = KeySelector::new(hook.clone());

        assert_eq!(selector.ensure_selected().await, KeySelection::AlreadySelected);
        assert_eq!(hook.opened(), 0);
    }

    #[tokio::test]
    async fn test_missing_hook_is_tolerated() {
        let selector = KeySelector::unavailable();

        assert!(!selector.is_available());
        assert_eq!(
            selector.open().await,
            KeySelection::Unavailable(NO_KEY_SELECTION_MESSAGE)
        );
        assert_eq!(
            selector.ensure_selected().await,
            KeySelection::Unavailable(NO_KEY_SELECTION_MESSAGE)
        );
        assert!(selector.nudge().is_none());
    }

    #[tokio::test]
    async fn test_nudge_opens_picker() {
        let hook = Arc::new(CountingHook::with_key());
        let selector = KeySelector::new(hook.clone());

        selector.nudge().unwrap().await.unwrap();
        assert_eq!(hook.opened(), 1);
    }
}
