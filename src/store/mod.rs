//! Persistence and lobby collaborators
//!
//! The router only talks to these traits. `memory` backs tests and local
//! runs; `supabase` talks to the hosted database over PostgREST.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::{InMemoryGameStore, InMemoryLobbies};
pub use supabase::{SupabaseClient, SupabaseError, SupabaseGameStore};

/// Authenticated user id (JWT `sub`)
pub type UserId = i64;
/// Persisted game id
pub type GameId = i64;

/// Schema tag written with every save
pub const SNAPSHOT_SCHEMA: &str = "drone-skirmish/snapshot-v1";

/// Collaborator failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("Lobby not found")]
    LobbyNotFound,

    #[error("Lobby is full")]
    LobbyFull,

    #[error("You are not in this lobby")]
    NotInLobby,

    #[error("A game needs two different players")]
    SamePlayer,

    #[error(transparent)]
    Supabase(#[from] SupabaseError),
}

/// Persisted game row
#[derive(Debug, Clone, PartialEq)]
pub struct SavedGame {
    pub id: GameId,
    pub player1_id: UserId,
    pub player2_id: UserId,
    /// Last saved snapshot, if any save happened yet
    pub snapshot: Option<serde_json::Value>,
    pub meta: Option<SaveMeta>,
}

impl SavedGame {
    /// Slot a participant resumes into: player1 -> 0, player2 -> 1
    pub fn slot_of(&self, user_id: UserId) -> Option<usize> {
        if user_id == self.player1_id {
            Some(0)
        } else if user_id == self.player2_id {
            Some(1)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.slot_of(user_id).is_some()
    }
}

/// Who saved, when, and in what format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMeta {
    pub saved_by_user_id: UserId,
    pub saved_by_player_index: usize,
    pub saved_at: DateTime<Utc>,
    pub schema: String,
    /// Users seated in slot 0 and slot 1
    pub player_ids: [UserId; 2],
}

/// What a save writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub snapshot: serde_json::Value,
    pub meta: SaveMeta,
}

/// Lobby as seen by the HTTP edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    pub id: String,
    pub host_id: UserId,
    pub guest_id: Option<UserId>,
    /// Persisted game this lobby resumes
    pub game_id: Option<GameId>,
    /// Only this user may take the guest seat of a resume lobby
    pub expected_opponent_id: Option<UserId>,
}

impl LobbyInfo {
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.host_id == user_id || self.guest_id == Some(user_id)
    }

    pub fn player_ids(&self) -> Option<[UserId; 2]> {
        self.guest_id.map(|guest| [self.host_id, guest])
    }
}

/// Persistence of games across sessions
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Create a game row for two distinct users
    async fn create_game(&self, player1: UserId, player2: UserId) -> Result<GameId, StoreError>;

    async fn load_game(&self, game_id: GameId) -> Result<SavedGame, StoreError>;

    /// Overwrite the game's snapshot and save metadata
    async fn save_game(&self, game_id: GameId, record: SaveRecord) -> Result<(), StoreError>;
}

/// Lobby membership and resume lobbies
#[async_trait]
pub trait LobbyDirectory: Send + Sync {
    async fn create_lobby(&self, host_id: UserId) -> Result<LobbyInfo, StoreError>;

    async fn join_lobby(&self, lobby_id: &str, user_id: UserId) -> Result<LobbyInfo, StoreError>;

    async fn is_member(&self, lobby_id: &str, user_id: UserId) -> Result<bool, StoreError>;

    /// Host and guest ids once both are present
    async fn player_ids_of(&self, lobby_id: &str) -> Result<Option<[UserId; 2]>, StoreError>;

    /// Persisted game a resume lobby belongs to
    async fn saved_game_of(&self, lobby_id: &str) -> Result<Option<GameId>, StoreError>;

    /// Open (or reuse) a lobby that resumes `game_id`, hosted by `user_id`
    async fn open_resume_lobby(
        &self,
        game_id: GameId,
        user_id: UserId,
        opponent_id: UserId,
    ) -> Result<String, StoreError>;
}
