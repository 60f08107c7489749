use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use doorbell_common::config::IdentifyConfig;
use doorbell_common::event::IdentificationResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServiceError;

const SERVICE: &str = "identification service";

/// Training walks the whole dataset, so it gets far longer than a single lookup.
const TRAIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Face identification. Built once at startup and shared by every caller.
#[async_trait]
pub trait Identifier: Send + Sync {
    /// Label every face in a JPEG image.
    async fn identify(&self, jpeg: Bytes) -> Result<IdentificationResult, ServiceError>;

    /// Rebuild the known-face model from a `<dataset>/<person>/*.jpg` tree.
    async fn train(&self, dataset: &Path) -> Result<TrainingSummary, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub total_faces: usize,
    pub unique_persons: usize,
}

#[derive(Serialize)]
struct TrainRequest<'a> {
    dataset: &'a str,
}

/// Client for the identification service's HTTP API.
pub struct HttpIdentifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentifier {
    pub fn new(config: &IdentifyConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Identifier for HttpIdentifier {
    async fn identify(&self, jpeg: Bytes) -> Result<IdentificationResult, ServiceError> {
        let bytes = jpeg.len();
        let result: IdentificationResult = self
            .client
            .post(format!("{}/identify", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;

        debug!(bytes, faces = result.labels.len(), "identification complete");
        Ok(result)
    }

    async fn train(&self, dataset: &Path) -> Result<TrainingSummary, ServiceError> {
        let dataset = dataset.to_string_lossy();
        let summary: TrainingSummary = self
            .client
            .post(format!("{}/train", self.base_url))
            .timeout(TRAIN_TIMEOUT)
            .json(&TrainRequest { dataset: &dataset })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;

        info!(
            total_faces = summary.total_faces,
            unique_persons = summary.unique_persons,
            "identification model retrained"
        );
        Ok(summary)
    }
}
