//! Session management commands.
//!
//! # Usage
//!
//! ```bash
//! clementine auth login -u alice
//! clementine auth whoami
//! clementine auth logout
//! ```
//!
//! # Environment Variables
//!
//! - `CLEMENTINE_PASSWORD` - Password for `login` and `register`; read from
//!   the environment so it never shows up in shell history or process lists.

use secrecy::SecretString;
use thiserror::Error;

use clementine_client::state::AppState;

/// Errors that can occur during auth commands.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// The backend rejected the credentials.
    #[error("Authentication failed for user: {0}")]
    Rejected(String),
}

fn password_from_env() -> Result<SecretString, AuthError> {
    std::env::var("CLEMENTINE_PASSWORD")
        .map(SecretString::from)
        .map_err(|_| AuthError::MissingEnvVar("CLEMENTINE_PASSWORD"))
}

/// Log in and sync the caches for the new identity.
pub async fn login(state: &AppState, username: &str) -> Result<(), AuthError> {
    let password = password_from_env()?;

    if !state.session.login(username, &password).await {
        return Err(AuthError::Rejected(username.to_owned()));
    }

    state.sync().await;
    Ok(())
}

/// Register a new account, log into it, and sync the caches.
pub async fn register(state: &AppState, username: &str) -> Result<(), AuthError> {
    let password = password_from_env()?;

    if !state.session.register(username, &password).await {
        return Err(AuthError::Rejected(username.to_owned()));
    }

    state.sync().await;
    Ok(())
}

/// Destroy the current session.
pub fn logout(state: &AppState) {
    state.session.logout();
}

/// Print the current session, if any.
pub fn whoami(state: &AppState) {
    match state.session.current() {
        Some(session) => {
            tracing::info!(
                "Logged in as {} ({})",
                session.principal_id,
                session.role
            );
        }
        None => tracing::info!("Not logged in (guest)"),
    }
}
