pub mod handlers;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderValue,
    middleware::from_fn,
    response::Json,
    routing::{delete, get},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::config;
use crate::gateway::Gateway;
use crate::middleware::jwt_context_middleware;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
}

pub fn router(gateway: Gateway) -> Router {
    let config = config();
    let state = AppState { gateway };

    let data = Router::new()
        .route(
            "/api/:database/:collection",
            get(handlers::read)
                .post(handlers::add)
                .put(handlers::update)
                .delete(handlers::delete),
        )
        .route("/api/:database/:collection/:query", delete(handlers::delete_by_path))
        .route_layer(from_fn(jwt_context_middleware));

    let mut app = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(data)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes));

    if let Some(cors) = cors_layer() {
        app = app.layer(cors);
    }
    if config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app
}

fn cors_layer() -> Option<CorsLayer> {
    let security = &config().security;
    if !security.enable_cors {
        return None;
    }
    if security.cors_origins.is_empty() {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "name": "doc-gateway",
        "version": version,
        "description": "Policy-enforcing HTTP gateway for schema-less document collections",
        "endpoints": {
            "read": "GET /api/:database/:collection?query=&sort=&skip=&limit=&inlineCount=",
            "add": "POST /api/:database/:collection",
            "update": "PUT /api/:database/:collection",
            "delete": "DELETE /api/:database/:collection[/:query]",
            "health": "GET /health",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let registry = state.gateway.registry().snapshot();

    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "policies": registry.len(),
    }))
}
