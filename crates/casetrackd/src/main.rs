//! Casetrack daemon - rejection-case tracking backend.
//!
//! Tracks rejection cases and their event timelines, forwards submissions
//! to the automation platform, and serves dashboard analytics.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use casetrackd::config::Config;
use casetrackd::gateway::WebhookGateway;
use casetrackd::server::{self, AppState};
use casetrackd::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("casetrackd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    let store = Store::open_at(&config.store.path)?;
    info!("Store ready at {}", config.store.path);

    let gateway = Arc::new(WebhookGateway::new(&config.gateway)?);
    let state = Arc::new(AppState::new(store, gateway, config));

    server::run(state).await
}
