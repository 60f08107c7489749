use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use doorbell_common::event::{Command, UnlockReason};
use doorbell_common::frame::FrameBroker;
use doorbell_notify::registry::short;
use doorbell_notify::{Notification, NotificationDispatcher};
use doorbell_router::{CommandSink, Identifier};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;
use crate::stream;

pub struct AppState {
    pub broker: Arc<FrameBroker>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub identifier: Arc<dyn Identifier>,
    pub commands: Arc<dyn CommandSink>,
    pub dataset_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptureRequest {
    name: Option<String>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream.mjpg", get(stream_mjpg))
        .route("/token", post(register_token))
        .route("/capture", post(capture))
        .route("/unlock", post(unlock))
        .route("/lock", post(lock))
        .route("/train", post(train))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /stream.mjpg
async fn stream_mjpg(State(state): State<Arc<AppState>>) -> Response {
    stream::mjpeg_response(Arc::clone(&state.broker))
}

/// POST /token: body { "token": "..." }
async fn register_token(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let token = serde_json::from_slice::<TokenRequest>(&body)
        .ok()
        .and_then(|req| req.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Token not provided".into()))?;

    let added = state.dispatcher.registry().register(&token);
    info!(
        token = short(&token),
        added,
        subscribers = state.dispatcher.registry().len(),
        "push token registered"
    );

    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        dispatcher.send_to(&token, &Notification::welcome()).await;
    });

    Ok(Json(json!({ "message": "Token registered successfully" })))
}

/// POST /capture: body { "name": "..." }; saves the latest frame into the dataset.
async fn capture(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: CaptureRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid capture request".into()))?;
    let name = sanitize_name(req.name.as_deref().unwrap_or_default());

    let frame = state
        .broker
        .latest()
        .ok_or_else(|| ApiError::Internal("No frame available".into()))?;

    let dir = state.dataset_dir.join(&name);
    let filename = format!(
        "{name}_{}.jpg",
        chrono::Local::now().format("%Y%m%d_%H%M%S_%3f")
    );
    let path = dir.join(&filename);
    save_frame(&dir, &path, &frame.jpeg)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save image: {e}")))?;

    info!(name = %name, filename = %filename, seq = frame.seq, "frame captured for training");
    Ok(Json(json!({ "message": "Image saved", "filename": filename })))
}

async fn save_frame(dir: &Path, path: &Path, jpeg: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, jpeg).await
}

/// Lower-case and keep only ASCII letters and digits.
fn sanitize_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if name.is_empty() {
        "unknown".to_string()
    } else {
        name
    }
}

/// POST /unlock
async fn unlock(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    send_command(&state, Command::Unlock(UnlockReason::Manual)).await?;
    Ok(Json(json!({ "message": "Unlock command sent" })))
}

/// POST /lock
async fn lock(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    send_command(&state, Command::Lock).await?;
    Ok(Json(json!({ "message": "Lock command sent" })))
}

async fn send_command(state: &AppState, command: Command) -> Result<(), ApiError> {
    state
        .commands
        .send(&command)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// POST /train: retrain the identification model on the dataset directory.
async fn train(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    if !tokio::fs::metadata(&state.dataset_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(ApiError::BadRequest("No dataset folder found".into()));
    }

    let summary = state
        .identifier
        .train(&state.dataset_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Training failed: {e}")))?;

    Ok(Json(json!({
        "message": "Training complete",
        "total_faces": summary.total_faces,
        "unique_persons": summary.unique_persons,
    })))
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "frame_seq": state.broker.current_seq(),
        "subscribers": state.dispatcher.registry().len(),
    }))
}
