use std::time::Duration;

use async_trait::async_trait;
use doorbell_common::config::SecretConfig;

use crate::error::ServiceError;

const SERVICE: &str = "secret store";

/// Source of the current door password.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn current_password(&self) -> Result<String, ServiceError>;
}

/// Reads the password from a Firebase realtime database over its REST API.
pub struct RealtimeDbSecretStore {
    client: reqwest::Client,
    url: String,
    auth: Option<String>,
}

impl RealtimeDbSecretStore {
    pub fn new(config: &SecretConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;
        Ok(Self {
            client,
            url: format!(
                "{}/{}.json",
                config.database_url.trim_end_matches('/'),
                config.path.trim_matches('/')
            ),
            auth: config.auth.clone(),
        })
    }
}

/// Only a JSON string counts as a password. `null` (unset) or any other type
/// is an error so that the caller denies the attempt.
pub fn parse_password(value: serde_json::Value) -> Result<String, ServiceError> {
    match value {
        serde_json::Value::String(password) => Ok(password),
        serde_json::Value::Null => Err(ServiceError::Malformed {
            service: SERVICE,
            message: "password is not set".into(),
        }),
        other => Err(ServiceError::Malformed {
            service: SERVICE,
            message: format!("expected a string password, got {other}"),
        }),
    }
}

#[async_trait]
impl SecretStore for RealtimeDbSecretStore {
    async fn current_password(&self) -> Result<String, ServiceError> {
        let mut request = self.client.get(&self.url);
        if let Some(auth) = &self.auth {
            request = request.query(&[("auth", auth)]);
        }

        let value: serde_json::Value = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;

        parse_password(value)
    }
}
