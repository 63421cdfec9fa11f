//! Snapshot export and strict import of a match

use serde::{Deserialize, Serialize};

use super::geometry::{default_anchor, Point};
use super::r#match::{MatchState, PlayerState, MAX_PLAYERS};
use super::units::{Drone, Side, Unit};
use super::GameConfig;

/// Why a snapshot could not be restored
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid snapshot: {0}")]
    Invalid(String),
}

fn invalid(reason: impl Into<String>) -> SnapshotError {
    SnapshotError::Invalid(reason.into())
}

/// Full persisted state of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub game_started: bool,
    pub current_turn: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions_per_turn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aerial_vision_range: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naval_vision_range: Option<u32>,
    pub players: Vec<PlayerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub player_index: usize,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_y: Option<f64>,
    pub drones: Vec<DroneSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneSnapshot {
    pub x: f64,
    pub y: f64,
    pub health: u32,
    pub alive: bool,
    pub drone_type: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_range: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fuel: Option<u32>,
    /// Naval missile stock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missiles: Option<u32>,
    /// Rounds left for non-naval weapons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ammo: Option<u32>,
}

impl MatchSnapshot {
    pub fn from_value(value: serde_json::Value) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Plain structs with string keys always serialize
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn export_drone(drone: &Drone) -> DroneSnapshot {
    let position = drone.position();
    let missiles = drone.missiles();
    DroneSnapshot {
        x: position.x,
        y: position.y,
        health: drone.current_hp(),
        alive: drone.is_alive(),
        drone_type: drone.side(),
        vision_range: Some(drone.vision_range()),
        fuel: Some(drone.fuel()),
        max_fuel: Some(drone.max_fuel()),
        missiles,
        ammo: missiles.is_none().then(|| drone.weapon().ammo()),
    }
}

pub(super) fn export(state: &MatchState) -> MatchSnapshot {
    let players = state
        .players
        .iter()
        .flatten()
        .map(|player| PlayerSnapshot {
            player_index: player.slot,
            side: player.side,
            carrier_x: Some(player.anchor.x),
            carrier_y: Some(player.anchor.y),
            drones: player.drones.iter().map(export_drone).collect(),
        })
        .collect();

    MatchSnapshot {
        game_started: state.game_started,
        current_turn: state.current_turn,
        actions_per_turn: Some(state.config.actions_per_turn),
        actions_remaining: Some(state.actions_remaining),
        aerial_vision_range: Some(state.config.aerial_vision_range),
        naval_vision_range: Some(state.config.naval_vision_range),
        players,
    }
}

fn import_drone(
    slot: usize,
    index: usize,
    saved: &DroneSnapshot,
    roster_side: Side,
    config: &GameConfig,
) -> Result<Drone, SnapshotError> {
    let side = saved.drone_type;
    let profile = side.profile();
    let at = || format!("player {} drone {}", slot, index);

    if side != roster_side {
        return Err(invalid(format!("{}: type {} does not match player side", at(), side)));
    }
    if !saved.x.is_finite() || !saved.y.is_finite() {
        return Err(invalid(format!("{}: position is not finite", at())));
    }
    if saved.health > profile.max_hp {
        return Err(invalid(format!(
            "{}: health {} exceeds maximum {}",
            at(),
            saved.health,
            profile.max_hp
        )));
    }
    if saved.alive && saved.health == 0 {
        return Err(invalid(format!("{}: alive with zero health", at())));
    }
    if !saved.alive && saved.health > 0 {
        return Err(invalid(format!("{}: destroyed with positive health", at())));
    }

    let max_fuel = saved.max_fuel.unwrap_or(profile.max_fuel);
    if max_fuel == 0 {
        return Err(invalid(format!("{}: max fuel must be positive", at())));
    }
    let fuel = saved.fuel.unwrap_or(max_fuel);
    if fuel > max_fuel {
        return Err(invalid(format!("{}: fuel {} exceeds max fuel {}", at(), fuel, max_fuel)));
    }
    if saved.alive && fuel == 0 {
        return Err(invalid(format!("{}: alive with an empty tank", at())));
    }

    let ammo = match side {
        Side::Naval => saved.missiles.or(saved.ammo),
        Side::Aerial => saved.ammo,
    }
    .unwrap_or(profile.ammo);
    if ammo > profile.ammo {
        return Err(invalid(format!(
            "{}: {} rounds exceed stock {}",
            at(),
            ammo,
            profile.ammo
        )));
    }

    let vision_range = saved.vision_range.unwrap_or(config.vision_range(side));

    Ok(Drone::restore(
        side,
        slot,
        index,
        Point::new(saved.x, saved.y),
        saved.health,
        saved.alive,
        vision_range,
        fuel,
        max_fuel,
        ammo,
        config,
    ))
}

/// Validate a snapshot and rebuild match state from it.
/// Tuning fields missing from the snapshot come from `base`.
pub(super) fn import(snapshot: MatchSnapshot, base: &GameConfig) -> Result<MatchState, SnapshotError> {
    let mut config = base.clone();
    if let Some(actions) = snapshot.actions_per_turn {
        config.actions_per_turn = actions;
    }
    if let Some(range) = snapshot.aerial_vision_range {
        config.aerial_vision_range = range;
    }
    if let Some(range) = snapshot.naval_vision_range {
        config.naval_vision_range = range;
    }
    config.validate().map_err(|e| invalid(e.to_string()))?;

    if snapshot.players.len() > MAX_PLAYERS {
        return Err(invalid(format!(
            "{} players, at most {} allowed",
            snapshot.players.len(),
            MAX_PLAYERS
        )));
    }

    let mut players: [Option<PlayerState>; MAX_PLAYERS] = [None, None];
    for saved in &snapshot.players {
        let slot = saved.player_index;
        if slot >= MAX_PLAYERS {
            return Err(invalid(format!("player index {} out of range", slot)));
        }
        if players[slot].is_some() {
            return Err(invalid(format!("duplicate player index {}", slot)));
        }

        let anchor = match (saved.carrier_x, saved.carrier_y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Point::new(x, y),
            _ => default_anchor(slot),
        };

        // Players without a side still hold the default aerial loadout
        let roster_side = saved.side.unwrap_or(Side::Aerial);
        let roster_size = roster_side.profile().roster_size;
        if saved.drones.len() != roster_size {
            return Err(invalid(format!(
                "player {}: {} drones, a {} roster has {}",
                slot,
                saved.drones.len(),
                roster_side,
                roster_size
            )));
        }

        let drones = saved
            .drones
            .iter()
            .enumerate()
            .map(|(index, drone)| import_drone(slot, index, drone, roster_side, &config))
            .collect::<Result<Vec<_>, _>>()?;

        players[slot] = Some(PlayerState {
            conn_id: None,
            slot,
            side: saved.side,
            drones,
            anchor,
        });
    }

    let turn_names_seat = if snapshot.players.is_empty() {
        snapshot.current_turn == 0
    } else {
        players
            .get(snapshot.current_turn)
            .is_some_and(Option::is_some)
    };
    if !turn_names_seat {
        return Err(invalid(format!(
            "current turn {} does not name a seated player",
            snapshot.current_turn
        )));
    }

    let both_ready = players
        .iter()
        .all(|p| p.as_ref().is_some_and(|p| p.side.is_some()));
    match (snapshot.game_started, both_ready) {
        (true, false) => return Err(invalid("a started game needs two players with sides")),
        // Such a match could never start again
        (false, true) => return Err(invalid("both sides chosen but the game is not started")),
        _ => {}
    }

    let actions_remaining = snapshot.actions_remaining.unwrap_or(config.actions_per_turn);
    if actions_remaining > config.actions_per_turn {
        return Err(invalid(format!(
            "actions remaining {} exceed actions per turn {}",
            actions_remaining, config.actions_per_turn
        )));
    }

    let mut state = MatchState::new(config, rand::random());
    state.players = players;
    state.game_started = snapshot.game_started;
    state.current_turn = snapshot.current_turn;
    state.actions_remaining = actions_remaining;
    Ok(state)
}
