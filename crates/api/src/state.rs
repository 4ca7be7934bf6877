//! Shared application state for the Axum server.

use pushrelay_common::config::AppConfig;
use pushrelay_notifier::relay::NotificationRelay;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub relay: NotificationRelay,
}

impl AppState {
    pub fn new(relay: NotificationRelay) -> Self {
        Self { relay }
    }

    /// Build the production relay from configuration.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let http = pushrelay_notifier::build_http_client(config)?;
        Ok(Self::new(NotificationRelay::from_config(config, http)))
    }
}
