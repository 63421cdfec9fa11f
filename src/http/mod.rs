//! HTTP edge: health, lobbies and the WebSocket upgrade

pub mod middleware;
pub mod routes;

pub use routes::build_router;
