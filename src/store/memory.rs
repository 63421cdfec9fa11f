//! In-memory collaborators for local runs and tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    GameId, GameStore, LobbyDirectory, LobbyInfo, SaveRecord, SavedGame, StoreError, UserId,
};

/// Store call, as recorded in the operation log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Create,
    Load,
    Save,
}

/// Game store kept in process memory.
///
/// An optional delay is awaited inside `load_game` and `save_game`, which
/// widens the window in which unsynchronized read-modify-write cycles would
/// interleave. The per-game operation log makes such interleaving visible.
pub struct InMemoryGameStore {
    inner: Mutex<GamesInner>,
    delay: Duration,
}

struct GamesInner {
    next_id: GameId,
    games: HashMap<GameId, SavedGame>,
    log: Vec<(GameId, StoreOp)>,
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Mutex::new(GamesInner {
                next_id: 1,
                games: HashMap::new(),
                log: Vec::new(),
            }),
            delay,
        }
    }

    /// Insert a prepared game row as-is
    pub fn insert(&self, game: SavedGame) {
        let mut inner = self.inner.lock();
        inner.next_id = inner.next_id.max(game.id + 1);
        inner.games.insert(game.id, game);
    }

    pub fn game(&self, game_id: GameId) -> Option<SavedGame> {
        self.inner.lock().games.get(&game_id).cloned()
    }

    /// Operations performed against one game, in order
    pub fn operations(&self, game_id: GameId) -> Vec<StoreOp> {
        self.inner
            .lock()
            .log
            .iter()
            .filter(|(id, _)| *id == game_id)
            .map(|(_, op)| *op)
            .collect()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for InMemoryGameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn create_game(&self, player1: UserId, player2: UserId) -> Result<GameId, StoreError> {
        if player1 == player2 {
            return Err(StoreError::SamePlayer);
        }

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.games.insert(
            id,
            SavedGame {
                id,
                player1_id: player1,
                player2_id: player2,
                snapshot: None,
                meta: None,
            },
        );
        inner.log.push((id, StoreOp::Create));
        debug!(game_id = id, player1, player2, "Game created");
        Ok(id)
    }

    async fn load_game(&self, game_id: GameId) -> Result<SavedGame, StoreError> {
        let game = {
            let mut inner = self.inner.lock();
            inner.log.push((game_id, StoreOp::Load));
            inner.games.get(&game_id).cloned()
        };
        self.pause().await;
        game.ok_or(StoreError::GameNotFound(game_id))
    }

    async fn save_game(&self, game_id: GameId, record: SaveRecord) -> Result<(), StoreError> {
        self.pause().await;

        let mut inner = self.inner.lock();
        inner.log.push((game_id, StoreOp::Save));
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or(StoreError::GameNotFound(game_id))?;
        game.snapshot = Some(record.snapshot);
        game.meta = Some(record.meta);
        Ok(())
    }
}

/// Lobby directory kept in process memory
pub struct InMemoryLobbies {
    lobbies: Mutex<HashMap<String, LobbyInfo>>,
}

impl InMemoryLobbies {
    pub fn new() -> Self {
        Self {
            lobbies: Mutex::new(HashMap::new()),
        }
    }

    /// Register a lobby as given, replacing any lobby with the same id
    pub fn insert(&self, lobby: LobbyInfo) {
        self.lobbies.lock().insert(lobby.id.clone(), lobby);
    }
}

impl Default for InMemoryLobbies {
    fn default() -> Self {
        Self::new()
    }
}

fn seat_guest(lobby: &mut LobbyInfo, user_id: UserId) -> Result<(), StoreError> {
    if lobby.is_member(user_id) {
        return Ok(());
    }
    if lobby.expected_opponent_id.is_some_and(|expected| expected != user_id) {
        return Err(StoreError::NotInLobby);
    }
    if lobby.guest_id.is_some() {
        return Err(StoreError::LobbyFull);
    }
    lobby.guest_id = Some(user_id);
    Ok(())
}

#[async_trait]
impl LobbyDirectory for InMemoryLobbies {
    async fn create_lobby(&self, host_id: UserId) -> Result<LobbyInfo, StoreError> {
        let lobby = LobbyInfo {
            id: Uuid::new_v4().to_string(),
            host_id,
            guest_id: None,
            game_id: None,
            expected_opponent_id: None,
        };
        self.lobbies.lock().insert(lobby.id.clone(), lobby.clone());
        debug!(lobby_id = %lobby.id, host_id, "Lobby created");
        Ok(lobby)
    }

    async fn join_lobby(&self, lobby_id: &str, user_id: UserId) -> Result<LobbyInfo, StoreError> {
        let mut lobbies = self.lobbies.lock();
        let lobby = lobbies.get_mut(lobby_id).ok_or(StoreError::LobbyNotFound)?;
        seat_guest(lobby, user_id)?;
        Ok(lobby.clone())
    }

    async fn is_member(&self, lobby_id: &str, user_id: UserId) -> Result<bool, StoreError> {
        let lobbies = self.lobbies.lock();
        let lobby = lobbies.get(lobby_id).ok_or(StoreError::LobbyNotFound)?;
        Ok(lobby.is_member(user_id))
    }

    async fn player_ids_of(&self, lobby_id: &str) -> Result<Option<[UserId; 2]>, StoreError> {
        let lobbies = self.lobbies.lock();
        let lobby = lobbies.get(lobby_id).ok_or(StoreError::LobbyNotFound)?;
        Ok(lobby.player_ids())
    }

    async fn saved_game_of(&self, lobby_id: &str) -> Result<Option<GameId>, StoreError> {
        let lobbies = self.lobbies.lock();
        let lobby = lobbies.get(lobby_id).ok_or(StoreError::LobbyNotFound)?;
        Ok(lobby.game_id)
    }

    async fn open_resume_lobby(
        &self,
        game_id: GameId,
        user_id: UserId,
        opponent_id: UserId,
    ) -> Result<String, StoreError> {
        let mut lobbies = self.lobbies.lock();

        // The second participant to load ends up in the lobby the first opened
        if let Some(lobby) = lobbies
            .values_mut()
            .find(|l| l.game_id == Some(game_id) && (l.is_member(user_id) || l.expected_opponent_id == Some(user_id)))
        {
            seat_guest(lobby, user_id)?;
            return Ok(lobby.id.clone());
        }

        let lobby = LobbyInfo {
            id: Uuid::new_v4().to_string(),
            host_id: user_id,
            guest_id: None,
            game_id: Some(game_id),
            expected_opponent_id: Some(opponent_id),
        };
        let id = lobby.id.clone();
        lobbies.insert(id.clone(), lobby);
        debug!(lobby_id = %id, game_id, user_id, "Resume lobby opened");
        Ok(id)
    }
}
