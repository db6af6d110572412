//! Main Entrypoint for the Examiner API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the topic catalog and opening the JSON data stores.
//! 3. Initializing the model client, examiner agent, and orchestrator.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use examiner_api::{
    config::Config,
    router::create_router,
    state::{AppState, SessionTable},
};
use examiner_core::{
    ExamOrchestrator, ExaminerAgent, JsonResultLog, OrchestratorSettings, StudentRegistry,
    llm_client::{LLMClient, OpenAICompatibleClient},
    topic::{default_catalog, load_catalog},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Topics and Stores ---
    let catalog = match &config.topic_catalog_path {
        Some(path) => load_catalog(path)?,
        None => default_catalog(),
    };
    anyhow::ensure!(
        config.topics_per_exam <= catalog.len(),
        "TOPICS_PER_EXAM is {} but the catalog only has {} topics",
        config.topics_per_exam,
        catalog.len()
    );
    info!(topics = catalog.len(), data_dir = %config.data_dir.display(), "Topic catalog loaded.");

    let results = Arc::new(JsonResultLog::in_dir(&config.data_dir));
    let registry = Arc::new(StudentRegistry::in_dir(&config.data_dir));

    // --- 4. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.api_key)
        .with_api_base(config.provider.api_base());
    let llm_client: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
        config.temperature,
    ));
    let agent = Arc::new(ExaminerAgent::new(llm_client, config.llm_timeout));
    let orchestrator = ExamOrchestrator::new(agent, results).with_settings(OrchestratorSettings {
        max_tool_rounds: config.max_tool_rounds,
        ..OrchestratorSettings::default()
    });

    let app_state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        registry,
        catalog: Arc::new(catalog),
        topics_per_exam: config.topics_per_exam,
        sessions: Arc::new(SessionTable::default()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
