//! Push-token lookup.

use async_trait::async_trait;
use serde::Deserialize;

use pushrelay_common::error::AppError;

/// Table holding one row per registered device token.
pub const TOKENS_TABLE: &str = "fcm_tokens";

/// Source of the push tokens registered for a user.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<String>, AppError>;
}

#[derive(Debug, Deserialize)]
struct TokenRow {
    token: Option<String>,
}

/// Token store backed by the Supabase PostgREST API.
pub struct SupabaseTokenStore {
    http: reqwest::Client,
    rest_url: String,
    service_role_key: String,
}

impl SupabaseTokenStore {
    pub fn new(
        http: reqwest::Client,
        supabase_url: &str,
        service_role_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            service_role_key: service_role_key.into(),
        }
    }
}

#[async_trait]
impl TokenStore for SupabaseTokenStore {
    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let response = self
            .http
            .get(format!("{}/{}", self.rest_url, TOKENS_TABLE))
            .query(&[("select", "token".to_string()), ("user_id", format!("eq.{}", user_id))])
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await
            .map_err(|e| AppError::Datastore(format!("token query failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Datastore(format!(
                "token query returned {}: {}",
                status, detail
            )));
        }

        let rows: Vec<TokenRow> = response
            .json()
            .await
            .map_err(|e| AppError::Datastore(format!("invalid token rows: {}", e)))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.token)
            .filter(|token| !token.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_tokens_for_user_queries_postgrest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/fcm_tokens"))
            .and(query_param("select", "token"))
            .and(query_param("user_id", "eq.u1"))
            .and(header("apikey", "service-role"))
            .and(header("authorization", "Bearer service-role"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"token": "tokA"},
                {"token": null},
                {"token": "tokB"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = SupabaseTokenStore::new(reqwest::Client::new(), &server.uri(), "service-role");
        let tokens = store.tokens_for_user("u1").await.unwrap();
        assert_eq!(tokens, vec!["tokA".to_string(), "tokB".to_string()]);
    }

    #[tokio::test]
    async fn test_tokens_for_user_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = SupabaseTokenStore::new(reqwest::Client::new(), &server.uri(), "k");
        assert!(store.tokens_for_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_string_tokens_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("user_id", "eq.u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"token": ""},
                {"token": "tokA"},
                {"token": null}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("user_id", "eq.u2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"token": ""}, {"token": null}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = SupabaseTokenStore::new(reqwest::Client::new(), &server.uri(), "k");
        assert_eq!(store.tokens_for_user("u1").await.unwrap(), vec!["tokA"]);
        assert!(store.tokens_for_user("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_is_datastore_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})),
            )
            .mount(&server)
            .await;

        let store = SupabaseTokenStore::new(reqwest::Client::new(), &server.uri(), "k");
        let err = store.tokens_for_user("u1").await.unwrap_err();
        assert!(matches!(err, AppError::Datastore(_)));
        assert!(err.to_string().contains("Invalid API key"));
    }
}
