//! Per-invocation orchestration: lookup → mint → fan-out.

use std::sync::Arc;

use pushrelay_common::config::AppConfig;
use pushrelay_common::error::AppError;
use pushrelay_common::types::{DispatchOutcome, NotificationRecord, ServiceAccountCredential};

use crate::fcm::FcmDispatcher;
use crate::store::{SupabaseTokenStore, TokenStore};
use crate::token::{AccessTokenSource, CachedTokenSource, GoogleTokenMinter};

/// Result of one successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// The user has no registered devices; nothing was minted or sent.
    NoTokens,
    /// One outcome per token, in lookup order.
    Dispatched(Vec<DispatchOutcome>),
}

/// Relays inserted notification records to the user's devices.
#[derive(Clone)]
pub struct NotificationRelay {
    tokens: Arc<dyn TokenStore>,
    access: Arc<dyn AccessTokenSource>,
    dispatcher: FcmDispatcher,
    service_account: Option<ServiceAccountCredential>,
}

impl NotificationRelay {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        access: Arc<dyn AccessTokenSource>,
        dispatcher: FcmDispatcher,
        service_account: Option<ServiceAccountCredential>,
    ) -> Self {
        Self {
            tokens,
            access,
            dispatcher,
            service_account,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Self {
        let minter = GoogleTokenMinter::new(http.clone(), config.oauth_token_url.clone());
        let access: Arc<dyn AccessTokenSource> = if config.access_token_cache {
            Arc::new(CachedTokenSource::new(minter))
        } else {
            Arc::new(minter)
        };

        Self::new(
            Arc::new(SupabaseTokenStore::new(
                http.clone(),
                &config.supabase_url,
                config.supabase_service_role_key.clone(),
            )),
            access,
            FcmDispatcher::new(http, &config.fcm_base_url),
            config.service_account.clone(),
        )
    }

    /// Whether a service account was configured at start-up.
    pub fn has_service_account(&self) -> bool {
        self.service_account.is_some()
    }

    /// Handle one inserted record.
    ///
    /// Minting happens strictly after the lookup and only when there is at
    /// least one token; the single access token is shared by every send.
    pub async fn relay(&self, record: &NotificationRecord) -> Result<RelayOutcome, AppError> {
        let user_id = record
            .target_user()
            .ok_or_else(|| AppError::Validation("Missing record data".to_string()))?;

        let tokens = self.tokens.tokens_for_user(&user_id).await?;
        if tokens.is_empty() {
            tracing::info!(user_id = %user_id, "No push tokens registered for user");
            return Ok(RelayOutcome::NoTokens);
        }

        let service_account = self.service_account.as_ref().ok_or_else(|| {
            AppError::Config("FIREBASE_SERVICE_ACCOUNT not configured".to_string())
        })?;

        let access_token = self.access.access_token(service_account).await?;

        let outcomes = self
            .dispatcher
            .dispatch_all(
                &service_account.project_id,
                &access_token.token,
                record,
                &tokens,
            )
            .await;

        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        tracing::info!(
            user_id = %user_id,
            notification_id = record.notification_id().as_deref().unwrap_or("-"),
            tokens = tokens.len(),
            delivered,
            failed = outcomes.len() - delivered,
            "Notification relayed"
        );

        Ok(RelayOutcome::Dispatched(outcomes))
    }
}
