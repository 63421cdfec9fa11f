//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::app::AppState;
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::store::{LobbyInfo, StoreError};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let cors = match &state.config.client_origin {
        Some(origins) => {
            let allowed_origins: Vec<header::HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .allow_credentials(true)
        }
        None => CorsLayer::permissive(),
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/lobbies", post(create_lobby_handler))
        .route("/lobbies/:lobby_id/join", post(join_lobby_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    bound_connections: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.router.active_matches(),
        bound_connections: state.router.bound_connections(),
    })
}

// ============================================================================
// Lobby endpoints
// ============================================================================

async fn create_lobby_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<(StatusCode, Json<LobbyInfo>), AppError> {
    let lobby = state.lobbies.create_lobby(auth.user_id).await?;
    info!(user_id = auth.user_id, lobby_id = %lobby.id, "Lobby created");
    Ok((StatusCode::CREATED, Json(lobby)))
}

async fn join_lobby_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(lobby_id): Path<String>,
) -> Result<Json<LobbyInfo>, AppError> {
    let lobby = state.lobbies.join_lobby(&lobby_id, auth.user_id).await?;
    info!(user_id = auth.user_id, lobby_id = %lobby.id, "Lobby joined");
    Ok(Json(lobby))
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LobbyNotFound | StoreError::GameNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            StoreError::LobbyFull => AppError::Conflict(e.to_string()),
            StoreError::NotInLobby | StoreError::SamePlayer => {
                AppError::BadRequest(e.to_string())
            }
            StoreError::Supabase(_) => {
                error!(error = %e, "Storage backend failed");
                AppError::Internal("storage unavailable".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let status = |e: StoreError| AppError::from(e).into_response().status();

        assert_eq!(status(StoreError::LobbyNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(StoreError::LobbyFull), StatusCode::CONFLICT);
        assert_eq!(status(StoreError::NotInLobby), StatusCode::BAD_REQUEST);
        assert_eq!(status(StoreError::SamePlayer), StatusCode::BAD_REQUEST);
        assert_eq!(status(StoreError::GameNotFound(4)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(StoreError::Supabase(crate::store::SupabaseError::NoRowReturned)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
