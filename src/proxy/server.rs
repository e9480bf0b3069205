//! Relay server: routing and startup

use axum::{
    extract::{Request, State},
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handler::{GenerateHandler, RouteTarget};
use crate::config::AppConfig;
use crate::upstream::{build_generation_client, GenerationClient};

/// Shared state for the relay
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    pub generator: Arc<GenerationClient>,
}

impl ProxyState {
    pub fn new(config: AppConfig, generator: GenerationClient) -> Self {
        Self {
            config: Arc::new(config),
            generator: Arc::new(generator),
        }
    }
}

/// Build the router: `/health` plus one generation endpoint per configured route
pub fn build_router(state: ProxyState) -> Router {
    let mut router = Router::new().route("/health", get(health_handler));

    for route in &state.config.routes {
        let target = Arc::new(RouteTarget::from_config(route, &state.config.upstream.model));
        tracing::debug!(path = %target.path, model = %target.model, mode = ?target.mode, "Registering route");

        router = router.route(
            &route.path,
            any(move |State(state): State<ProxyState>, req: Request| {
                let target = target.clone();
                async move { GenerateHandler::new(state, target).handle(req).await }
            }),
        );
    }

    router
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the relay server
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let generator = build_generation_client(&config)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    tracing::info!("Relaying to {}", config.upstream.base_url());
    for route in &config.routes {
        tracing::info!(
            path = %route.path,
            model = %route.model_or(&config.upstream.model),
            mode = ?route.mode,
            "Route"
        );
    }

    let app = build_router(ProxyState::new(config, generator));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("prompt-relay listening on {}", addr);

    Ok(axum::serve(listener, app).await?)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}
