use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use vigil_server::config::Config;
use vigil_server::routes::api_router;
use vigil_server::AppState;

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "vigil"
    })))
}

async fn help_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let version = vigil_server::get_service_version();
    Json(json!({
        "service": "vigil",
        "version": version,
        "description": "Community review of threat, vulnerability, FUD and BIP submissions",
        "voting": {
            "threshold": state.moderation.threshold().get(),
            "terminalVotePolicy": state.moderation.terminal_vote_policy().to_string(),
            "rule": "net score >= threshold publishes, <= -threshold archives; each crossing fires once"
        },
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint",
                "authentication": "None"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "API documentation and service information",
                "authentication": "None"
            },
            {
                "path": "/votes",
                "method": "POST",
                "description": "Cast or change a vote: {targetType, targetId, voteValue: 1|-1}",
                "authentication": "Bearer session token"
            },
            {
                "path": "/votes",
                "method": "DELETE",
                "description": "Retract a vote: {targetType, targetId}",
                "authentication": "Bearer session token"
            },
            {
                "path": "/submissions",
                "method": "POST",
                "description": "Create a submission",
                "authentication": "Bearer session token"
            },
            {
                "path": "/submissions",
                "method": "GET",
                "description": "List submissions (?targetType=&status=&limit=)",
                "authentication": "None"
            },
            {
                "path": "/submissions/{kind}/{id}",
                "method": "GET",
                "description": "A submission with its tally",
                "authentication": "None"
            },
            {
                "path": "/submissions/{kind}/{id}/submit",
                "method": "POST",
                "description": "Move the author's draft into review",
                "authentication": "Bearer session token"
            },
            {
                "path": "/submissions/{kind}/{id}/votes",
                "method": "GET",
                "description": "Current votes on a submission",
                "authentication": "None"
            },
            {
                "path": "/submissions/{kind}/{id}/audit",
                "method": "GET",
                "description": "Status change history, newest first (?limit=)",
                "authentication": "None"
            }
        ],
        "configuration": {
            "required_env_vars": ["SESSION_JWT_SECRET"],
            "optional_env_vars": [
                "PORT (default: 3000)",
                "STATE_DIR (default: current directory)",
                "VOTE_THRESHOLD (default: 3)",
                "TERMINAL_VOTE_POLICY (default: record)",
                "STORAGE_BACKEND (default: sqlite)"
            ]
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Vigil review service");

    let config = Config::from_env().context("Failed to load configuration from environment variables")?;
    info!(
        "Vote threshold {}, terminal vote policy {}, storage {}",
        config.vote_threshold, config.terminal_vote_policy, config.storage_backend
    );

    let app_state = Arc::new(AppState::from_config(&config)?);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .merge(api_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
