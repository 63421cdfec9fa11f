//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::{MatchSnapshot, Side};
use crate::store::{GameId, UserId};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Take a seat in the match of a lobby
    Join { lobby_id: String },

    /// Pick a side; the raw name is validated by the router
    SelectSide { side: String },

    /// Move one of the sender's drones
    Move { drone_index: usize, x: f64, y: f64 },

    /// Fire at an enemy drone, or (naval) at a point
    Attack {
        attacker_index: usize,
        target_player: usize,
        #[serde(default)]
        target_drone: Option<usize>,
        #[serde(default)]
        aim_x: Option<f64>,
        #[serde(default)]
        aim_y: Option<f64>,
    },

    EndTurn,

    /// Persist the match and close it for both players
    SaveAndExit,

    /// Resume a persisted game
    LoadGame { game_id: GameId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Seat confirmation
    Welcome {
        player_id: UserId,
        player_index: usize,
        is_load_game: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_id: Option<GameId>,
    },

    SideChosen { player_index: usize, side: Side },

    /// Both sides picked, match is about to start
    BothReady,

    /// Full state at match start (or resume)
    GameStart { state: MatchSnapshot },

    TurnStart {
        active_player: usize,
        actions_remaining: u32,
    },

    /// Drone position update; also announces fuel deaths
    MoveDrone {
        player_index: usize,
        drone_index: usize,
        x: f64,
        y: f64,
        remaining_fuel: u32,
        destroyed_by_fuel: bool,
    },

    AttackResult {
        attacker_player: usize,
        attacker_drone: usize,
        target_player: usize,
        /// None when a blind strike found nothing
        target_drone: Option<usize>,
        damage: u32,
        remaining_health: Option<u32>,
        hit: bool,
        attacker_x: f64,
        attacker_y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        defeated_player: Option<usize>,
    },

    PlayerLeft { player_index: usize },

    GameSaved {
        game_id: GameId,
        saved_by_player_index: usize,
    },

    GameLoaded {
        state: MatchSnapshot,
        lobby_id: String,
        game_id: GameId,
    },

    /// Error message
    Error { message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Reply to frames that do not parse as a [`ClientMsg`]
pub const INVALID_FORMAT: &str = "Invalid message format";
