//! Session commands.

use recipe_box_client::AppState;
use recipe_box_client::store::{Credentials, Registration};
use recipe_box_core::Email;
use tracing::info;

use super::CommandError;

/// Log in and persist the session.
///
/// # Errors
///
/// Returns an error for a malformed email, a rejected login or a storage
/// failure.
pub async fn login(
    state: &AppState,
    email: &str,
    password: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = Credentials::new(Email::parse(email)?, password);
    if !state.auth().login(&credentials).await? {
        return Err(rejected(state, "Login").await.into());
    }
    info!(email = %credentials.email, "Logged in");
    Ok(())
}

/// Create an account, then log in.
///
/// # Errors
///
/// Returns an error for a malformed email, a rejected request or a storage
/// failure.
pub async fn register(
    state: &AppState,
    email: &str,
    password: String,
    name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let registration = Registration {
        name,
        credentials: Credentials::new(Email::parse(email)?, password),
    };
    if !state.auth().register(&registration).await? {
        return Err(rejected(state, "Registration").await.into());
    }
    info!(email = %registration.credentials.email, "Account created");
    Ok(())
}

/// Drop the saved session.
///
/// # Errors
///
/// Returns an error if the saved session could not be removed.
pub async fn logout(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().logout().await?;
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn whoami(state: &AppState) {
    match state.auth().user_id().await {
        Some(user_id) => println!("Logged in as {user_id}"),
        None => println!("Not logged in"),
    }
}

async fn rejected(state: &AppState, action: &'static str) -> CommandError {
    CommandError::Rejected {
        action,
        reason: state.auth().error().await.unwrap_or_default(),
    }
}
