//! Camera ingestion: turns the camera's MJPEG feed into frames on the
//! [`FrameBroker`](doorbell_common::frame::FrameBroker).

pub mod mjpeg;

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
}
