//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        CompositeExtractor, DbAdapter, LocalDocumentStorage, LogSender, OpenAiCompletionAdapter,
        TelegramSender,
    },
    config::Config,
    error::ApiError,
    web::{api_router, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use axum::Router;
use coursemate_core::{
    AdmissionController, AggregatorLimits, ContentAggregator, GenerationSettings, MessageSender,
    Notifier, QuizGenerator, QuizJobService, QuizPipeline, WorkerPool,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let completion_adapter = Arc::new(OpenAiCompletionAdapter::new(
        Client::with_config(openai_config),
        config.ai_model.clone(),
    ));

    let storage = Arc::new(LocalDocumentStorage::new(config.storage_root.clone()));
    let extractor = Arc::new(CompositeExtractor::with_defaults());

    let sender: Arc<dyn MessageSender> = match &config.telegram_token {
        Some(token) => Arc::new(TelegramSender::new(token.clone())),
        None => {
            warn!("TELEGRAM_TOKEN is not set; notifications will only be logged");
            Arc::new(LogSender)
        }
    };

    // --- 4. Assemble the Quiz Pipeline & Worker Pool ---
    let aggregator = ContentAggregator::new(
        db_adapter.clone(),
        storage,
        extractor,
        AggregatorLimits::default(),
    );
    let generator = QuizGenerator::new(completion_adapter, GenerationSettings::default());
    let notifier = Notifier::new(db_adapter.clone(), db_adapter.clone(), sender);
    let pipeline = Arc::new(QuizPipeline::new(
        db_adapter.clone(),
        aggregator,
        generator,
        notifier,
    ));
    let pool = Arc::new(WorkerPool::start(config.quiz_workers, pipeline));

    let admission =
        AdmissionController::new(db_adapter.clone(), pool.clone(), config.default_question_count);
    let service = Arc::new(QuizJobService::new(admission, db_adapter));

    // --- 5. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState { service });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let app = Router::new()
        .merge(api_router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 7. Drain queued quiz jobs ---
    info!("HTTP server stopped, draining quiz jobs...");
    pool.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
