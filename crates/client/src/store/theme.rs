//! Persisted color-scheme preference.

use std::sync::Arc;

use recipe_box_core::Theme;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::storage::{KeyValueStore, keys, load_json, save_json};

pub struct ThemeStore {
    storage: Arc<dyn KeyValueStore>,
    theme: Mutex<Theme>,
}

impl ThemeStore {
    /// Load the stored preference, falling back to [`Theme::System`].
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let theme = match load_json::<Theme>(storage.as_ref(), keys::THEME).await {
            Ok(theme) => theme.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable theme preference");
                Theme::default()
            }
        };
        debug!(%theme, "Theme loaded");

        Self {
            storage,
            theme: Mutex::new(theme),
        }
    }

    pub async fn theme(&self) -> Theme {
        *self.theme.lock().await
    }

    /// Switch to `theme` and persist it.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the in-memory theme is updated regardless.
    #[instrument(skip(self))]
    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        let mut current = self.theme.lock().await;
        self.store(&mut current, theme).await
    }

    /// Flip between light and dark, returning the new theme.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the in-memory theme is updated regardless.
    #[instrument(skip(self))]
    pub async fn toggle(&self) -> Result<Theme> {
        let mut current = self.theme.lock().await;
        let next = current.toggled();
        self.store(&mut current, next).await?;
        Ok(next)
    }

    async fn store(&self, current: &mut MutexGuard<'_, Theme>, theme: Theme) -> Result<()> {
        **current = theme;
        save_json(self.storage.as_ref(), keys::THEME, &theme).await?;
        Ok(())
    }
}
