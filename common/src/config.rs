use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub camera: CameraConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    pub identify: IdentifyConfig,
    pub secret: SecretConfig,
    pub push: PushConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub url: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Multipart boundary used by the camera feed, without the leading dashes.
    #[serde(default = "default_boundary")]
    pub boundary: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_motion_topic")]
    pub motion_topic: String,
    #[serde(default = "default_password_topic")]
    pub password_topic: String,
    #[serde(default = "default_ring_topic")]
    pub ring_topic: String,
    #[serde(default = "default_unlock_topic")]
    pub unlock_topic: String,
    #[serde(default = "default_lock_topic")]
    pub lock_topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifyConfig {
    pub url: String,
    #[serde(default = "default_identify_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretConfig {
    pub database_url: String,
    #[serde(default = "default_secret_path")]
    pub path: String,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default = "default_secret_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub project_id: String,
    pub access_token: String,
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            dataset_dir: default_dataset_dir(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            motion_topic: default_motion_topic(),
            password_topic: default_password_topic(),
            ring_topic: default_ring_topic(),
            unlock_topic: default_unlock_topic(),
            lock_topic: default_lock_topic(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_dataset_dir() -> PathBuf {
    PathBuf::from("dataset")
}
fn default_mode() -> String {
    "mjpeg".into()
}
fn default_boundary() -> String {
    "frame".into()
}
fn default_fps() -> f64 {
    10.0
}
fn default_mqtt_host() -> String {
    "localhost".into()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "doorbell-coordinator".into()
}
fn default_keep_alive() -> u64 {
    60
}
fn default_motion_topic() -> String {
    "doorbell/motion".into()
}
fn default_password_topic() -> String {
    "doorbell/password".into()
}
fn default_ring_topic() -> String {
    "doorbell/ring".into()
}
fn default_unlock_topic() -> String {
    "doorbell/unlock".into()
}
fn default_lock_topic() -> String {
    "doorbell/lock".into()
}
fn default_identify_timeout() -> u64 {
    10
}
fn default_secret_path() -> String {
    "password".into()
}
fn default_secret_timeout() -> u64 {
    5
}
fn default_push_endpoint() -> String {
    "https://fcm.googleapis.com".into()
}
fn default_push_timeout() -> u64 {
    10
}
fn default_queue_capacity() -> usize {
    16
}
fn default_log_level() -> String {
    "info".into()
}
