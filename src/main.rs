use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};

use zynapse::chat::{AppState, ChatTask, chat_routes};
use zynapse::config::{AppConfig, StoreBackendKind};
use zynapse::llm::create_model;
use zynapse::store::{InMemoryBackend, KvBackend, RedisBackend, TaskStateStore, spawn_sweeper};
use zynapse::worker::LocalDispatcher;

/// How often the in-memory backend drops expired records.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("Zynapse v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Store: {:?}, record TTL {}s", config.store_backend, config.store.ttl.as_secs());
    eprintln!("   Chat API: http://0.0.0.0:{}/chat", config.server.port);

    let backend: Arc<dyn KvBackend> = match config.store_backend {
        StoreBackendKind::Redis => {
            let url = config.redis.url();
            let redis = RedisBackend::connect(&url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", config.redis.host))?;
            Arc::new(redis)
        }
        StoreBackendKind::Memory => {
            tracing::warn!("Using in-memory record store; records are lost on restart");
            let memory = Arc::new(InMemoryBackend::new());
            spawn_sweeper(Arc::clone(&memory), SWEEP_INTERVAL);
            memory
        }
    };
    let store = Arc::new(TaskStateStore::new(backend, config.store.clone()));

    let model = create_model(&config.llm).context("Failed to create chat model")?;
    let body = Arc::new(ChatTask::new(model, config.llm.system_prompt.clone()));
    let dispatcher = LocalDispatcher::spawn(&config.dispatch, Arc::clone(&store), body);

    let app = chat_routes(AppState { store, dispatcher }).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server.port))?;
    tracing::info!(port = config.server.port, "Chat API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
