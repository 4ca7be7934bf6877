//! FCM HTTP v1 fan-out.
//!
//! One `messages:send` request per device token, all in flight at once on the
//! calling task. Results come back in token order; a failing token is reported
//! as a `Failed` outcome and never aborts the others.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use pushrelay_common::types::{DispatchOutcome, NotificationRecord};

/// Android notification channel the client app registers at start-up.
pub const ANDROID_CHANNEL_ID: &str = "high_importance_channel";

/// Intent action the Flutter client listens for on notification tap.
pub const ANDROID_CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";

#[derive(Debug, Clone, Serialize)]
pub struct FcmRequest {
    pub message: FcmMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct FcmMessage {
    pub token: String,
    pub notification: FcmNotification,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    pub android: AndroidConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct FcmNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AndroidConfig {
    pub priority: &'static str,
    pub notification: AndroidNotification,
}

#[derive(Debug, Clone, Serialize)]
pub struct AndroidNotification {
    pub channel_id: &'static str,
    pub click_action: &'static str,
}

impl FcmRequest {
    /// Build the message for one device.
    ///
    /// FCM only accepts string values in `data`, so non-string custom values
    /// are sent as their JSON text. `notification_id` always wins over a
    /// custom key of the same name.
    pub fn for_token(token: &str, record: &NotificationRecord) -> Self {
        let mut data: BTreeMap<String, String> = record
            .data
            .iter()
            .flatten()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect();

        if let Some(id) = record.notification_id() {
            data.insert("notification_id".to_string(), id);
        }

        Self {
            message: FcmMessage {
                token: token.to_string(),
                notification: FcmNotification {
                    title: record.title.clone(),
                    body: record.body.clone(),
                },
                data,
                android: AndroidConfig {
                    priority: "high",
                    notification: AndroidNotification {
                        channel_id: ANDROID_CHANNEL_ID,
                        click_action: ANDROID_CLICK_ACTION,
                    },
                },
            },
        }
    }
}

/// Sends messages to the FCM HTTP v1 API.
#[derive(Clone)]
pub struct FcmDispatcher {
    http: reqwest::Client,
    base_url: String,
}

impl FcmDispatcher {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn send_url(&self, project_id: &str) -> String {
        format!("{}/v1/projects/{}/messages:send", self.base_url, project_id)
    }

    /// Deliver `record` to every token concurrently, sharing `access_token`.
    pub async fn dispatch_all(
        &self,
        project_id: &str,
        access_token: &str,
        record: &NotificationRecord,
        tokens: &[String],
    ) -> Vec<DispatchOutcome> {
        let url = self.send_url(project_id);
        let sends = tokens.iter().map(|token| {
            let request = FcmRequest::for_token(token, record);
            self.dispatch_one(&url, access_token, request)
        });
        join_all(sends).await
    }

    async fn dispatch_one(
        &self,
        url: &str,
        access_token: &str,
        request: FcmRequest,
    ) -> DispatchOutcome {
        let token = request.message.token.clone();
        let response = match self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "FCM request failed");
                return DispatchOutcome::Failed {
                    token,
                    http_status: None,
                    error: format!("request failed: {}", e),
                    response: None,
                };
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if status.is_success() {
            return DispatchOutcome::Delivered {
                token,
                response: body.unwrap_or(Value::String(text)),
            };
        }

        let error = body
            .as_ref()
            .and_then(|b| b.pointer("/error/message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("FCM returned {}", status));

        tracing::warn!(status = status.as_u16(), error = %error, "FCM rejected message");

        DispatchOutcome::Failed {
            token,
            http_status: Some(status.as_u16()),
            error,
            response: body,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn record(value: Value) -> NotificationRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_message_shape() {
        let record = record(json!({
            "user_id": "u1", "title": "Hi", "body": "Test", "id": "n1",
            "data": {"screen": "inbox", "count": 3, "flag": true, "skip": null}
        }));
        let value = serde_json::to_value(FcmRequest::for_token("tokA", &record)).unwrap();

        assert_eq!(
            value,
            json!({
                "message": {
                    "token": "tokA",
                    "notification": {"title": "Hi", "body": "Test"},
                    "data": {
                        "count": "3",
                        "flag": "true",
                        "notification_id": "n1",
                        "screen": "inbox"
                    },
                    "android": {
                        "priority": "high",
                        "notification": {
                            "channel_id": "high_importance_channel",
                            "click_action": "FLUTTER_NOTIFICATION_CLICK"
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_notification_id_overrides_custom_data() {
        let record = record(json!({"id": 7, "data": {"notification_id": "spoofed"}}));
        let request = FcmRequest::for_token("tok", &record);
        assert_eq!(request.message.data["notification_id"], "7");
    }

    #[test]
    fn test_missing_fields_are_omitted() {
        let value = serde_json::to_value(FcmRequest::for_token("tok", &record(json!({})))).unwrap();
        assert_eq!(value["message"]["notification"], json!({}));
        assert!(value["message"].get("data").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_all_preserves_order_and_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo/messages:send"))
            .and(header("authorization", "Bearer ya29.shared"))
            .and(body_partial_json(json!({"message": {"token": "bad"}})))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo/messages:send"))
            .and(header("authorization", "Bearer ya29.shared"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "projects/demo/messages/1"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let dispatcher = FcmDispatcher::new(reqwest::Client::new(), &server.uri());
        let tokens = vec!["tokA".to_string(), "bad".to_string(), "tokB".to_string()];
        let outcomes = dispatcher
            .dispatch_all("demo", "ya29.shared", &record(json!({"id": "n1"})), &tokens)
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_delivered());
        assert_eq!(outcomes[0].token(), "tokA");
        assert_eq!(
            outcomes[1],
            DispatchOutcome::Failed {
                token: "bad".to_string(),
                http_status: Some(404),
                error: "Requested entity was not found.".to_string(),
                response: Some(json!({
                    "error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}
                })),
            }
        );
        assert!(outcomes[2].is_delivered());
        assert_eq!(outcomes[2].token(), "tokB");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_reports_transport_failure() {
        // Nothing listens on port 9 of localhost in the test environment
        let dispatcher = FcmDispatcher::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let outcomes = dispatcher
            .dispatch_all("demo", "t", &NotificationRecord::default(), &["tok".to_string()])
            .await;
        assert!(matches!(
            outcomes[0],
            DispatchOutcome::Failed { http_status: None, .. }
        ));
        assert_eq!(outcomes[0].token(), "tok");
    }
}
