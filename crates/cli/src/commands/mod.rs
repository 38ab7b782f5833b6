//! Command implementations.

use std::sync::Arc;

use clementine_client::config::ClientConfig;
use clementine_client::notify::TracingNotifier;
use clementine_client::state::AppState;

pub mod auth;
pub mod cart;
pub mod wishlist;

/// Build the fully wired client state from environment configuration.
///
/// Notifications are rendered as tracing events.
pub fn build_state() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let state = AppState::new(config, Arc::new(TracingNotifier))?;
    Ok(state)
}
