//! Main Entrypoint for the NeuroGym API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the store (PostgreSQL with migrations, or in-memory).
//! 3. Initializing shared services (the LLM client, tutoring service and flow controller).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use neurogym_api::{
    config::{Config, Provider, StorageBackend},
    db::Db,
    router::create_router,
    state::{AppState, SessionRegistry},
};
use neurogym_core::{
    TutorController,
    identity::IdentityService,
    llm_client::{LLMClient, OfflineLLMClient, OpenAICompatibleClient},
    prompts::PromptLibrary,
    store::{MemoryStore, TutorStore},
    tutoring::{LLMTutoringService, OfflineTutoringService, TutoringService},
};
use sqlx::PgPool;
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const COHERE_API_BASE: &str = "https://api.cohere.ai/compatibility/v1";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompt overrides from a directory.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    if !prompts_path.is_dir() {
        warn!(path = %prompts_path.display(), "Prompts directory not found. Using built-in prompts.");
        return Ok(prompts);
    }
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

/// Builds the OpenAI-compatible client configuration for a hosted provider.
fn provider_config(api_key: Option<&String>, api_base: &str) -> anyhow::Result<OpenAIConfig> {
    let api_key = api_key.context("API key for the selected provider is missing")?;
    Ok(OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base))
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

    // --- 3. Initialize Storage ---
    let store: Arc<dyn TutorStore> = match config.storage {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool = PgPool::connect(database_url)
                .await
                .context("Failed to connect to database")?;
            let db = Db::new(pool);
            db.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            Arc::new(db)
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory store. Nothing will survive a restart.");
            Arc::new(MemoryStore::new())
        }
    };

    // --- 4. Initialize Shared Services ---
    let prompts = PromptLibrary::new(load_prompts(&config.prompts_path)?);

    let hosted = match &config.provider {
        Provider::OpenAI => {
            info!("Using OpenAI provider.");
            Some(provider_config(config.openai_api_key.as_ref(), OPENAI_API_BASE)?)
        }
        Provider::Gemini => {
            info!("Using Gemini provider.");
            Some(provider_config(config.gemini_api_key.as_ref(), GEMINI_API_BASE)?)
        }
        Provider::Cohere => {
            info!("Using Cohere provider.");
            Some(provider_config(config.cohere_api_key.as_ref(), COHERE_API_BASE)?)
        }
        Provider::Offline => {
            warn!("Using the offline provider. Replies are canned.");
            None
        }
    };

    let (tutoring, llm_client): (Arc<dyn TutoringService>, Arc<dyn LLMClient>) = match hosted {
        Some(openai_config) => (
            Arc::new(LLMTutoringService::new(
                openai_config.clone(),
                config.chat_model.clone(),
                prompts.clone(),
            )),
            Arc::new(OpenAICompatibleClient::new(
                openai_config,
                config.chat_model.clone(),
            )),
        ),
        None => (Arc::new(OfflineTutoringService), Arc::new(OfflineLLMClient)),
    };

    let controller = TutorController::new(
        llm_client,
        tutoring,
        store.clone(),
        prompts,
        config.flow.clone(),
    );

    let app_state = Arc::new(AppState {
        identity: Arc::new(IdentityService::new(store.clone())),
        controller: Arc::new(controller),
        sessions: Arc::new(SessionRegistry::with_idle_timeout(
            config.session_idle_timeout,
        )),
        store,
        config: Arc::new(config.clone()),
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
        storage = ?config.storage,
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
