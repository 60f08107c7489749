use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use doorbell_common::config::PushConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::Notification;

/// Delivers a notification to a single device token.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Returns the transport's message id on success.
    async fn send(&self, token: &str, notification: &Notification) -> Result<String, DeliveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The transport says this token will never work again.
    #[error("token is invalid or no longer registered: {0}")]
    InvalidToken(String),
    #[error("push transport rejected the message with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("push transport unreachable: {0}")]
    Unreachable(String),
    #[error("push delivery timed out")]
    Timeout,
}

impl DeliveryError {
    /// Permanent failures mean the token should be dropped; everything else is
    /// left for the next notification to try again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::InvalidToken(_))
    }
}

/// Firebase Cloud Messaging over the HTTP v1 API.
pub struct FcmTransport {
    client: reqwest::Client,
    send_url: String,
    access_token: String,
}

impl FcmTransport {
    pub fn new(config: &PushConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                config.endpoint.trim_end_matches('/'),
                config.project_id
            ),
            access_token: config.access_token.clone(),
        })
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    #[serde(skip_serializing_if = "no_data")]
    data: &'a BTreeMap<String, String>,
    android: AndroidConfig,
}

fn no_data(data: &&BTreeMap<String, String>) -> bool {
    data.is_empty()
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct AndroidConfig {
    priority: &'static str,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

/// Map an FCM error response onto a delivery outcome.
///
/// `UNREGISTERED` and `INVALID_ARGUMENT` mean the token is dead; quota,
/// availability and auth problems are transient.
pub fn classify_error(status: u16, body: &str) -> DeliveryError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let err = envelope.error;
    let unregistered = err
        .details
        .iter()
        .any(|d| d.error_code.as_deref() == Some("UNREGISTERED"));

    if unregistered || err.status == "INVALID_ARGUMENT" || status == 404 {
        DeliveryError::InvalidToken(err.message)
    } else {
        DeliveryError::Rejected {
            status,
            message: err.message,
        }
    }
}

#[async_trait]
impl PushTransport for FcmTransport {
    async fn send(&self, token: &str, notification: &Notification) -> Result<String, DeliveryError> {
        let request = SendRequest {
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &notification.title,
                    body: &notification.body,
                },
                data: &notification.data,
                android: AndroidConfig { priority: "high" },
            },
        };

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let body: SendResponse = response
                .json()
                .await
                .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;
            debug!(message_id = %body.name, "FCM accepted message");
            return Ok(body.name);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_token_is_permanent() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND",
            "details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        let err = classify_error(404, body);
        assert!(err.is_permanent());
    }

    #[test]
    fn invalid_argument_is_permanent() {
        let body = r#"{"error":{"code":400,"message":"The registration token is not a valid FCM registration token","status":"INVALID_ARGUMENT"}}"#;
        assert!(classify_error(400, body).is_permanent());
    }

    #[test]
    fn quota_and_server_errors_are_transient() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_error(429, body);
        assert!(!err.is_permanent());
        assert!(matches!(err, DeliveryError::Rejected { status: 429, .. }));

        assert!(!classify_error(503, "upstream connect error").is_permanent());
    }

    #[test]
    fn request_body_matches_fcm_v1_shape() {
        let n = Notification::doorbell_ring();
        let request = SendRequest {
            message: FcmMessage {
                token: "tok",
                notification: FcmNotification {
                    title: &n.title,
                    body: &n.body,
                },
                data: &n.data,
                android: AndroidConfig { priority: "high" },
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message"]["token"], "tok");
        assert_eq!(json["message"]["notification"]["title"], "Doorbell Ring");
        assert_eq!(json["message"]["data"]["type"], "doorbell_ring");
        assert_eq!(json["message"]["android"]["priority"], "high");
    }
}
