//! Push notification relay core.
//!
//! - `store`: push-token lookup
//! - `assertion`: service-account JWT assertions
//! - `token`: assertion → OAuth2 access token exchange, optional cache
//! - `fcm`: concurrent per-token delivery to FCM HTTP v1
//! - `relay`: sequencing of the above for one inserted record

pub mod assertion;
pub mod fcm;
pub mod relay;
pub mod store;
pub mod token;

use std::time::Duration;

use pushrelay_common::config::AppConfig;

/// Shared outbound HTTP client with the configured per-request timeout.
pub fn build_http_client(config: &AppConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    Ok(client)
}
