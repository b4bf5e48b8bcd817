//! HTTP server for casetrackd.

use anyhow::Result;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analytics::AnalyticsEngine;
use crate::config::Config;
use crate::gateway::AutomationGateway;
use crate::intake::IntakeEngine;
use crate::metrics::ApiMetrics;
use crate::routes;
use crate::store::Store;

/// Application state shared across handlers.
pub struct AppState {
    pub store: Store,
    pub intake: IntakeEngine,
    pub analytics: AnalyticsEngine,
    pub config: Config,
    pub metrics: ApiMetrics,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Store, gateway: Arc<dyn AutomationGateway>, config: Config) -> Self {
        let metrics = ApiMetrics::new();
        let intake = IntakeEngine::new(
            store.clone(),
            gateway,
            config.gateway.run_url_template.clone(),
            metrics.clone(),
        );
        let analytics = AnalyticsEngine::new(store.clone());
        Self {
            store,
            intake,
            analytics,
            config,
            metrics,
            start_time: Instant::now(),
        }
    }
}

/// Build the full application router. Kept separate from [`run`] so tests
/// can drive it without a listener.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .merge(routes::case_routes())
        .merge(routes::event_routes())
        .merge(routes::analytics_routes())
        .merge(routes::auth_routes())
        .merge(routes::admin_routes())
        .merge(routes::health_routes())
        .merge(routes::metrics_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), track_http))
        .fallback(routes::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Run the HTTP server until the process is stopped.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.server.bind_addr.clone();
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

/// Count each routed request by method, matched route and response status.
async fn track_http(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    state
        .metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), &route, response.status().as_str()])
        .inc();
    response
}
