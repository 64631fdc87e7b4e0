//! Theme commands.

use recipe_box_client::AppState;
use recipe_box_core::Theme;

#[allow(clippy::print_stdout)]
pub async fn show(state: &AppState) {
    println!("{}", state.theme().theme().await);
}

/// Persist `theme`.
///
/// # Errors
///
/// Returns an error if the preference cannot be saved.
pub async fn set(state: &AppState, theme: Theme) -> Result<(), Box<dyn std::error::Error>> {
    state.theme().set_theme(theme).await?;
    show(state).await;
    Ok(())
}

/// Flip between light and dark.
///
/// # Errors
///
/// Returns an error if the preference cannot be saved.
pub async fn toggle(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.theme().toggle().await?;
    show(state).await;
    Ok(())
}
