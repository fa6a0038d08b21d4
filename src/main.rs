use std::sync::Arc;

use visaflow::catalog::store::{CatalogStore, CheckBank};
use visaflow::config::{EngineConfig, ServerConfig};
use visaflow::knowledge::KnowledgeBase;
use visaflow::pipeline::PipelineEngine;
use visaflow::server::{AppState, api_routes};
use visaflow::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env();

    let catalog = Arc::new(CatalogStore::load(&config.flows_dir)?);
    let checks = Arc::new(CheckBank::load(&config.checks_path)?);
    let knowledge = Arc::new(KnowledgeBase::load(&config.knowledge_path)?);

    let engine = Arc::new(PipelineEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&checks),
        Arc::clone(&knowledge),
        EngineConfig::default(),
    ));
    let sessions = Arc::new(SessionStore::new());

    let app = api_routes(AppState {
        engine,
        sessions,
        catalog,
        checks,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "VisaFlow API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
