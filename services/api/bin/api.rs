//! Main Entrypoint for the Cue Voice API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Preparing the session log directory and the recognition phrase hints.
//! 3. Initializing the speech, intent and calendar collaborators.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use cue_api::{
    config::{Config, IntentParser},
    router::create_router,
    state::{AppState, SessionRegistry, SessionSettings},
    ws::provider::build_recognizer,
};
use cue_core::{
    calendar::{ActionExecutor, CueClient, ReminderExecutor},
    intent::{IntentResolver, LlmIntentResolver, PatternIntentResolver},
    model::{LanguageConfig, PhraseHints},
    speech::WatsonSynthesizer,
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads the known user names and turns them into recognition hints.
fn load_phrase_hints(path: &Path) -> anyhow::Result<PhraseHints> {
    let names: Vec<String> = match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array of names", path.display()))?,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "No user names loaded; recognition runs without hints.");
            Vec::new()
        }
    };
    Ok(PhraseHints::from_names(names))
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

    // --- 3. Session logs and hints ---
    tokio::fs::create_dir_all(&config.log_dir)
        .await
        .with_context(|| format!("Failed to create log dir {}", config.log_dir.display()))?;
    let hints = load_phrase_hints(&config.user_names_path)?;
    info!(phrases = hints.phrases().len(), "Phrase hints loaded.");

    // --- 4. Initialize Collaborators ---
    let recognizer = build_recognizer(&config)?;
    let synthesizer = Arc::new(WatsonSynthesizer::new(
        config.tts_url.clone(),
        config.tts_api_key.clone(),
    ));

    let intent_resolver: Arc<dyn IntentResolver> = match config.intent_parser {
        IntentParser::Pattern => Arc::new(PatternIntentResolver),
        IntentParser::Llm => {
            let api_key = config
                .openai_api_key
                .as_ref()
                .context("OPENAI_API_KEY is required for the llm intent parser")?;
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://api.openai.com/v1/");
            Arc::new(LlmIntentResolver::new(
                openai_config,
                config.chat_model.clone(),
            ))
        }
    };

    let cue = CueClient::new(config.cue_api_url.clone());
    let executor: Arc<dyn ActionExecutor> = Arc::new(ReminderExecutor::new(cue.clone(), cue));

    let app_state = Arc::new(AppState {
        recognizer,
        synthesizer,
        intent_resolver,
        executor,
        hints: Arc::new(hints),
        language: Arc::new(LanguageConfig {
            language_code: config.language_code.clone(),
            ..LanguageConfig::default()
        }),
        registry: Arc::new(SessionRegistry::default()),
        settings: Arc::new(SessionSettings::from(&config)),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        recognition = ?config.recognition_provider,
        intent = ?config.intent_parser,
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
