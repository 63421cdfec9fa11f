//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::session::SessionRouter;
use crate::store::{
    GameStore, InMemoryGameStore, InMemoryLobbies, LobbyDirectory, SupabaseClient,
    SupabaseGameStore,
};
use crate::ws::hub::ConnectionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobbies: Arc<dyn LobbyDirectory>,
    pub router: Arc<SessionRouter>,
    pub hub: Arc<ConnectionHub>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Lobbies are always process-local
        let lobbies: Arc<dyn LobbyDirectory> = Arc::new(InMemoryLobbies::new());

        // Persisted games go to Supabase when configured
        let games: Arc<dyn GameStore> = match &config.supabase {
            Some(supabase) => {
                info!(url = %supabase.url, "Using Supabase game store");
                let client = SupabaseClient::new(&supabase.url, &supabase.service_role_key);
                Arc::new(SupabaseGameStore::new(client))
            }
            None => {
                info!("Using in-memory game store");
                Arc::new(InMemoryGameStore::new())
            }
        };

        let router = Arc::new(SessionRouter::new(
            config.game.clone(),
            lobbies.clone(),
            games,
        ));

        Self {
            config,
            lobbies,
            router,
            hub: Arc::new(ConnectionHub::new()),
        }
    }
}
