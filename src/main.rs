//! Support pipeline - event-driven customer support decisioning
//!
//! Classifies conversation commands, fans out to evaluator agents, and turns
//! their assertions into customer updates and decision feedback.

mod agents;
mod api;
mod broker;
mod config;
mod db;
mod evaluator;
mod events;
mod llm;
mod responder;
mod runtime;
mod state_machine;

use agents::AgentStage;
use api::{create_router, AppState};
use broker::{PooledPublisher, ProducerPool};
use config::{MatcherKind, PipelineConfig};
use db::Database;
use evaluator::{CommandEvaluator, IntentDetector, Lexicon, SubstringMatcher, TokenMatcher};
use events::AgentKind;
use llm::{AnthropicService, CompletionService, LoggingService};
use responder::Responder;
use runtime::{DatabaseStore, EffectExecutor, StateStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "support_pipeline=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = PipelineConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;
    let store: Arc<dyn StateStore> = Arc::new(DatabaseStore::new(db));

    let pool = Arc::new(ProducerPool::rest(&config.broker_url, Duration::from_secs(10))?);
    // One logical producer per stage; the pool shares connections between them
    let publisher = |stage: &str| {
        PooledPublisher::new(Arc::clone(&pool), format!("{}.{stage}", config.client_id))
    };
    let executor = |stage: &str| {
        EffectExecutor::new(Arc::clone(&store), publisher(stage), config.topics.clone())
    };

    let detector: Arc<dyn IntentDetector> = match config.matcher {
        MatcherKind::Substring => Arc::new(SubstringMatcher::default()),
        MatcherKind::Token => Arc::new(TokenMatcher::new(&Lexicon::default())?),
    };
    tracing::info!(matcher = detector.name(), "Keyword detector ready");

    let mut state = AppState::new(Arc::clone(&store))
        .with_stage(Arc::new(CommandEvaluator::new(detector, executor("command-evaluator"))))
        .with_stage(Arc::new(Responder::new(config.policy, executor("responder"))));

    match config.anthropic.clone() {
        Some(llm_config) => {
            let service = AnthropicService::new(llm_config)?;
            let completion: Arc<dyn CompletionService> =
                Arc::new(LoggingService::new(Arc::new(service)));
            tracing::info!(model = %completion.model_id(), "Completion service initialized");
            for kind in AgentKind::ALL {
                state = state.with_stage(Arc::new(AgentStage::new(
                    kind,
                    Arc::clone(&completion),
                    publisher(kind.as_str()),
                    config.topics.clone(),
                )));
            }
        }
        None => {
            tracing::warn!("ANTHROPIC_API_KEY not set; evaluator agents are disabled");
        }
    }

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, broker = %config.broker_url, "Support pipeline listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain in-flight publishes before exit
    pool.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
