use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use doorbell_common::config::Config;
use doorbell_common::frame::FrameBroker;
use doorbell_notify::{FcmTransport, NotificationDispatcher, SubscriberRegistry};
use doorbell_producer::mjpeg::{run_mjpeg_producer, run_polling_producer};
use doorbell_router::{
    AccessEventRouter, HttpIdentifier, MqttBus, RealtimeDbSecretStore, RouterTimeouts,
    TopicQueues,
};
use tracing::{error, info};

mod error;
mod routes;
mod stream;

use routes::{create_router, AppState};

fn exit_on_startup_error(what: &str, e: impl std::fmt::Display) -> ! {
    eprintln!("Failed to {what}: {e}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        camera = %config.camera.url,
        mode = %config.camera.mode,
        mqtt = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        "doorbell coordinator starting"
    );

    // Camera feed
    let broker = Arc::new(FrameBroker::new());
    {
        let broker = Arc::clone(&broker);
        let url = config.camera.url.clone();
        match config.camera.mode.as_str() {
            "mjpeg" => {
                let boundary = config.camera.boundary.clone();
                tokio::spawn(async move { run_mjpeg_producer(&url, &boundary, broker).await });
            }
            "polling" => {
                if !(config.camera.fps > 0.0) {
                    exit_on_startup_error("start camera polling", "camera.fps must be positive");
                }
                let interval = Duration::from_secs_f64(1.0 / config.camera.fps)
                    .max(Duration::from_millis(1));
                tokio::spawn(async move { run_polling_producer(&url, broker, interval).await });
            }
            other => exit_on_startup_error(
                "start camera producer",
                format!("unknown camera mode '{other}', expected 'mjpeg' or 'polling'"),
            ),
        }
    }

    // Push notifications
    let transport = FcmTransport::new(&config.push)
        .unwrap_or_else(|e| exit_on_startup_error("create push transport", e));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(SubscriberRegistry::new()),
        Arc::new(transport),
        Duration::from_secs(config.push.timeout_secs),
    ));

    // External services
    let identifier = Arc::new(
        HttpIdentifier::new(&config.identify)
            .unwrap_or_else(|e| exit_on_startup_error("create identification client", e)),
    );
    let secrets = Arc::new(
        RealtimeDbSecretStore::new(&config.secret)
            .unwrap_or_else(|e| exit_on_startup_error("create secret store client", e)),
    );

    // Event bus and routing
    let (bus, eventloop) = MqttBus::connect(&config.mqtt);
    let bus = Arc::new(bus);

    let router = Arc::new(AccessEventRouter::new(
        Arc::clone(&broker),
        identifier.clone(),
        secrets,
        bus.clone(),
        dispatcher.clone(),
        RouterTimeouts {
            identify: Duration::from_secs(config.identify.timeout_secs),
            secret: Duration::from_secs(config.secret.timeout_secs),
        },
    ));
    let (queues, _workers) = TopicQueues::spawn(router, config.router.queue_capacity);
    {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.run(eventloop, queues).await });
    }

    // HTTP
    let state = Arc::new(AppState {
        broker,
        dispatcher,
        identifier,
        commands: bus,
        dataset_dir: config.server.dataset_dir.clone(),
    });
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    info!(addr, "doorbell HTTP server starting");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| exit_on_startup_error(&format!("bind to {addr}"), e));

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "HTTP server failed");
    }
    info!("doorbell coordinator stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
