//! Match state and the authoritative turn state machine

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::combat::{
    aim_offset_factor, naval_on_naval_damage, CombatSystem, HitResult, Weapon,
    NAVAL_STRIKE_OFFSET_Y, STRIKE_RADIUS,
};
use super::geometry::{carrier_anchor, roster_positions, Point, OCCUPANCY_RADIUS};
use super::snapshot::{self, MatchSnapshot, SnapshotError};
use super::units::{Drone, Side, Unit};
use super::GameConfig;

/// Seats per match
pub const MAX_PLAYERS: usize = 2;

/// Rejections from match operations. None of these mutate the match.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Match is full")]
    Full,

    #[error("Already seated in this match")]
    AlreadySeated,

    #[error("Player is not in this match")]
    NotSeated,

    #[error("Invalid player index: {0}")]
    InvalidSlot(usize),

    #[error("Side already chosen")]
    SideAlreadyChosen,

    #[error("Game has already started")]
    AlreadyStarted,

    #[error("Game has not started")]
    NotStarted,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("No actions remaining")]
    NoActionsRemaining,

    #[error("Not enough actions: need {needed}, have {remaining}")]
    NotEnoughActions { needed: u32, remaining: u32 },

    #[error("Invalid drone index: {0}")]
    InvalidDrone(usize),

    #[error("Drone is destroyed")]
    DroneDestroyed,

    #[error("Target drone is destroyed")]
    TargetDestroyed,

    #[error("A target drone is required")]
    TargetRequired,

    #[error("Invalid destination")]
    InvalidDestination,

    #[error("Destination is occupied by another drone")]
    Occupied,

    #[error("Cannot attack your own drones")]
    SelfTarget,

    #[error("No missiles left")]
    NoMissiles,

    #[error("Out of ammo")]
    OutOfAmmo,

    #[error("Target out of range")]
    OutOfRange,

    #[error("Slot already claimed")]
    SlotClaimed,

    #[error("Waiting for opponent to reconnect")]
    AwaitingOpponent,

    #[error("Match is being saved")]
    SaveInProgress,
}

/// One seated player (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Connection currently driving this seat; None while a restored seat
    /// waits for its player to come back
    pub conn_id: Option<Uuid>,
    pub slot: usize,
    pub side: Option<Side>,
    pub drones: Vec<Drone>,
    /// Carrier anchor the roster spawns around
    pub anchor: Point,
}

impl PlayerState {
    /// Seat a player with the default aerial loadout
    fn seat(conn_id: Uuid, slot: usize, anchor: Point, config: &GameConfig) -> Self {
        Self {
            conn_id: Some(conn_id),
            slot,
            side: None,
            drones: build_roster(Side::Aerial, slot, anchor, config),
            anchor,
        }
    }

    /// Every drone is gone
    pub fn is_defeated(&self) -> bool {
        self.drones.iter().all(|d| !d.is_alive())
    }

    fn drone(&self, index: usize) -> Result<&Drone, MatchError> {
        self.drones.get(index).ok_or(MatchError::InvalidDrone(index))
    }
}

fn build_roster(side: Side, slot: usize, anchor: Point, config: &GameConfig) -> Vec<Drone> {
    roster_positions(anchor, side.profile().roster_size)
        .into_iter()
        .enumerate()
        .map(|(index, position)| Drone::new(side, slot, index, position, config))
        .collect()
}

/// Result of a side selection
#[derive(Debug, Clone, PartialEq)]
pub struct SideOutcome {
    pub slot: usize,
    pub side: Side,
    /// The selection completed the setup and the match started
    pub started: bool,
}

/// Drone destroyed by idle fuel drain at the end of a turn
#[derive(Debug, Clone, PartialEq)]
pub struct FuelLoss {
    pub slot: usize,
    pub drone_index: usize,
    pub position: Point,
}

/// Turn hand-over
#[derive(Debug, Clone, PartialEq)]
pub struct TurnChange {
    pub ended_slot: usize,
    pub active_slot: usize,
    pub actions_remaining: u32,
    pub fuel_losses: Vec<FuelLoss>,
}

/// Result of a successful move
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub slot: usize,
    pub drone_index: usize,
    pub position: Point,
    pub remaining_fuel: u32,
    pub destroyed_by_fuel: bool,
    pub actions_remaining: u32,
    pub turn_change: Option<TurnChange>,
}

/// Attack request, already resolved to slots
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOrder {
    pub attacker_slot: usize,
    pub attacker_index: usize,
    pub target_slot: usize,
    /// None for a blind naval strike at `aim`
    pub target_index: Option<usize>,
    pub aim: Option<Point>,
}

/// Result of an accepted attack (hit or miss)
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub attacker_slot: usize,
    pub attacker_index: usize,
    /// Attacker position after firing (naval drones reposition)
    pub attacker_position: Point,
    pub target_slot: usize,
    /// Drone that was struck at, if any
    pub target_index: Option<usize>,
    pub hit: bool,
    pub damage: u32,
    pub remaining_health: Option<u32>,
    pub accuracy: f64,
    /// Set when this hit destroyed the last drone of the target slot
    pub defeated_slot: Option<usize>,
    pub actions_remaining: u32,
    pub turn_change: Option<TurnChange>,
}

/// Result of a player leaving
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub slot: usize,
    /// The match was running and has been reset
    pub reset: bool,
    /// Other connections whose seats were destroyed by the reset
    pub evicted: Vec<Uuid>,
}

/// Mutable match state; only ever touched under the match lock
pub(crate) struct MatchState {
    pub(crate) players: [Option<PlayerState>; MAX_PLAYERS],
    pub(crate) game_started: bool,
    pub(crate) current_turn: usize,
    pub(crate) actions_remaining: u32,
    pub(crate) config: GameConfig,
    /// Frozen for a save; no intent is accepted until it is cleared
    saving: bool,
    rng: ChaCha8Rng,
}

impl MatchState {
    pub(crate) fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            players: [None, None],
            game_started: false,
            current_turn: 0,
            actions_remaining: config.actions_per_turn,
            config,
            saving: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn slot_of(&self, conn_id: Uuid) -> Option<usize> {
        self.players
            .iter()
            .flatten()
            .find(|p| p.conn_id == Some(conn_id))
            .map(|p| p.slot)
    }

    fn seated(&self) -> usize {
        self.players.iter().flatten().count()
    }

    fn player(&self, slot: usize) -> Result<&PlayerState, MatchError> {
        self.players
            .get(slot)
            .ok_or(MatchError::InvalidSlot(slot))?
            .as_ref()
            .ok_or(MatchError::InvalidSlot(slot))
    }

    fn player_mut(&mut self, slot: usize) -> Result<&mut PlayerState, MatchError> {
        self.players
            .get_mut(slot)
            .ok_or(MatchError::InvalidSlot(slot))?
            .as_mut()
            .ok_or(MatchError::InvalidSlot(slot))
    }

    /// Intents need a match that is not being saved and whose seats all
    /// have a connection (restored seats start without one)
    fn require_open(&self) -> Result<(), MatchError> {
        if self.saving {
            return Err(MatchError::SaveInProgress);
        }
        if self.players.iter().flatten().any(|p| p.conn_id.is_none()) {
            return Err(MatchError::AwaitingOpponent);
        }
        Ok(())
    }

    fn require_turn(&self, slot: usize) -> Result<(), MatchError> {
        if !self.game_started {
            return Err(MatchError::NotStarted);
        }
        if self.current_turn != slot {
            return Err(MatchError::NotYourTurn);
        }
        Ok(())
    }

    fn ready_to_start(&self) -> bool {
        self.players
            .iter()
            .all(|p| p.as_ref().is_some_and(|p| p.side.is_some()))
    }

    fn start(&mut self) {
        self.game_started = true;
        self.current_turn = 0;
        self.actions_remaining = self.config.actions_per_turn;
    }

    fn reset(&mut self) {
        self.players = [None, None];
        self.game_started = false;
        self.saving = false;
        self.current_turn = 0;
        self.actions_remaining = self.config.actions_per_turn;
    }

    /// Is any living drone other than `moving` within the occupancy radius
    fn is_occupied(&self, destination: Point, moving: (usize, usize)) -> bool {
        self.players.iter().flatten().any(|player| {
            player.drones.iter().enumerate().any(|(index, drone)| {
                (player.slot, index) != moving
                    && drone.is_alive()
                    && drone.position().distance_to(&destination) < OCCUPANCY_RADIUS
            })
        })
    }

    /// Deduct actions and hand the turn over when the budget runs out
    fn spend_actions(&mut self, cost: u32) -> Option<TurnChange> {
        self.actions_remaining = self.actions_remaining.saturating_sub(cost);
        if self.actions_remaining == 0 {
            Some(self.advance_turn())
        } else {
            None
        }
    }

    /// Drain idle fuel from the ending slot, then flip the turn
    fn advance_turn(&mut self) -> TurnChange {
        let ended = self.current_turn;
        let mut fuel_losses = Vec::new();

        if let Some(player) = self.players[ended].as_mut() {
            for (index, drone) in player.drones.iter_mut().enumerate() {
                if drone.burn_fuel() {
                    fuel_losses.push(FuelLoss {
                        slot: ended,
                        drone_index: index,
                        position: drone.position(),
                    });
                }
            }
        }

        self.current_turn = (ended + 1) % MAX_PLAYERS;
        self.actions_remaining = self.config.actions_per_turn;

        TurnChange {
            ended_slot: ended,
            active_slot: self.current_turn,
            actions_remaining: self.actions_remaining,
            fuel_losses,
        }
    }
}

/// Work out whether a shot lands and how hard
pub(crate) fn resolve_shot<R: Rng + ?Sized>(
    rng: &mut R,
    attacker_side: Side,
    weapon: &Weapon,
    launch: Point,
    aim: Point,
    target: &Drone,
    naval_damage_fraction: f64,
) -> HitResult {
    let traveled = launch.hex_distance_to(&aim);
    let mut accuracy = weapon.effective_accuracy(traveled);

    if matches!(weapon, Weapon::Missile(_)) && target.side() == Side::Naval {
        accuracy *= aim_offset_factor(aim.distance_to(&target.position()));
    }

    let hit = CombatSystem::roll_hit(rng, accuracy);
    let damage = match (hit, attacker_side, target.side()) {
        (false, _, _) => 0,
        (true, Side::Naval, Side::Naval) => {
            naval_on_naval_damage(target.max_hp(), naval_damage_fraction)
        }
        (true, _, _) => weapon.damage(),
    };

    HitResult {
        hit,
        damage,
        accuracy,
    }
}

/// Living drone of `player` nearest to `aim` inside the strike radius
fn nearest_in_blast(player: &PlayerState, aim: Point) -> Option<usize> {
    player
        .drones
        .iter()
        .enumerate()
        .filter(|(_, drone)| drone.is_alive())
        .map(|(index, drone)| (index, drone.position().distance_to(&aim)))
        .filter(|(_, distance)| *distance <= STRIKE_RADIUS)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}

/// One live two-player match.
///
/// All state sits behind a single lock, so every operation is one critical
/// section: checks and the writes they guard never interleave with another
/// caller on the same match.
pub struct Match {
    id: String,
    state: Mutex<MatchState>,
}

impl Match {
    /// Create an empty match
    pub fn new(id: impl Into<String>, config: GameConfig) -> Result<Self, MatchError> {
        Self::with_seed(id, config, rand::random())
    }

    /// Create an empty match with a fixed RNG seed
    pub fn with_seed(id: impl Into<String>, config: GameConfig, seed: u64) -> Result<Self, MatchError> {
        config.validate()?;
        Ok(Self {
            id: id.into(),
            state: Mutex::new(MatchState::new(config, seed)),
        })
    }

    pub(crate) fn from_state(id: String, state: MatchState) -> Self {
        Self {
            id,
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Seat a connection in the lowest free slot
    pub fn join(&self, conn_id: Uuid) -> Result<usize, MatchError> {
        let mut state = self.state.lock();

        if state.slot_of(conn_id).is_some() {
            return Err(MatchError::AlreadySeated);
        }

        let slot = state
            .players
            .iter()
            .position(Option::is_none)
            .ok_or(MatchError::Full)?;

        let anchor = carrier_anchor(slot, &mut state.rng);
        let player = PlayerState::seat(conn_id, slot, anchor, &state.config);
        state.players[slot] = Some(player);

        info!(
            match_id = %self.id,
            conn_id = %conn_id,
            slot,
            anchor_y = anchor.y,
            "Player seated"
        );

        Ok(slot)
    }

    /// Pick a side for a seated slot and rebuild its roster.
    /// Starts the match once both seats have a side.
    pub fn choose_side(&self, slot: usize, side: Side) -> Result<SideOutcome, MatchError> {
        let mut state = self.state.lock();

        if state.game_started {
            return Err(MatchError::AlreadyStarted);
        }
        state.require_open()?;

        let config = state.config.clone();
        let player = state.player_mut(slot).map_err(|_| MatchError::NotSeated)?;
        if player.side.is_some() {
            return Err(MatchError::SideAlreadyChosen);
        }

        player.side = Some(side);
        player.drones = build_roster(side, slot, player.anchor, &config);

        let started = state.ready_to_start();
        if started {
            state.start();
            info!(match_id = %self.id, "Both sides chosen, match started");
        }

        Ok(SideOutcome {
            slot,
            side,
            started,
        })
    }

    /// Move one of the caller's drones
    pub fn move_drone(
        &self,
        conn_id: Uuid,
        drone_index: usize,
        x: f64,
        y: f64,
    ) -> Result<MoveOutcome, MatchError> {
        let mut state = self.state.lock();

        let slot = state.slot_of(conn_id).ok_or(MatchError::NotSeated)?;
        state.require_open()?;
        if state.game_started {
            if state.current_turn != slot {
                return Err(MatchError::NotYourTurn);
            }
            if state.actions_remaining == 0 {
                return Err(MatchError::NoActionsRemaining);
            }
        }

        let destination = Point::new(x, y);
        if !destination.is_finite() {
            return Err(MatchError::InvalidDestination);
        }

        let drone = state.player(slot)?.drone(drone_index)?;
        if !drone.is_alive() {
            return Err(MatchError::DroneDestroyed);
        }
        if state.is_occupied(destination, (slot, drone_index)) {
            return Err(MatchError::Occupied);
        }

        let drone = &mut state.player_mut(slot)?.drones[drone_index];
        drone.set_position(destination);
        let destroyed_by_fuel = drone.burn_fuel();
        let remaining_fuel = drone.fuel();

        let turn_change = if state.game_started {
            state.spend_actions(1)
        } else {
            None
        };

        debug!(
            match_id = %self.id,
            slot,
            drone_index,
            x,
            y,
            remaining_fuel,
            destroyed_by_fuel,
            "Drone moved"
        );

        Ok(MoveOutcome {
            slot,
            drone_index,
            position: destination,
            remaining_fuel,
            destroyed_by_fuel,
            actions_remaining: state.actions_remaining,
            turn_change,
        })
    }

    /// Fire one drone at an enemy drone or, for naval drones, at a point
    pub fn attack(&self, order: AttackOrder) -> Result<AttackOutcome, MatchError> {
        let mut state = self.state.lock();

        state.require_open()?;
        state.require_turn(order.attacker_slot)?;
        if order.target_slot == order.attacker_slot {
            return Err(MatchError::SelfTarget);
        }
        let target_player = state.player(order.target_slot)?;
        if let Some(index) = order.target_index {
            if !target_player.drone(index)?.is_alive() {
                return Err(MatchError::TargetDestroyed);
            }
        }

        let attacker = state.player(order.attacker_slot)?.drone(order.attacker_index)?;
        if !attacker.is_alive() {
            return Err(MatchError::DroneDestroyed);
        }

        let attacker_side = attacker.side();
        if !attacker.has_ammo() {
            return Err(match attacker_side {
                Side::Naval => MatchError::NoMissiles,
                Side::Aerial => MatchError::OutOfAmmo,
            });
        }

        let cost = attacker_side.attack_cost();
        if state.actions_remaining < cost {
            return Err(MatchError::NotEnoughActions {
                needed: cost,
                remaining: state.actions_remaining,
            });
        }

        let target_position = order
            .target_index
            .map(|index| target_player.drones[index].position());
        let aim = match (order.aim, target_position) {
            (Some(aim), _) if aim.is_finite() => aim,
            (Some(_), _) => return Err(MatchError::InvalidDestination),
            (None, Some(position)) => position,
            (None, None) => return Err(MatchError::TargetRequired),
        };

        let weapon = *attacker.weapon();
        let mut launch = attacker.position();
        match attacker_side {
            Side::Aerial => {
                let target_position = target_position.ok_or(MatchError::TargetRequired)?;
                if launch.hex_distance_to(&target_position) > weapon.range() {
                    return Err(MatchError::OutOfRange);
                }
            }
            Side::Naval => {
                launch = aim.offset(0.0, NAVAL_STRIKE_OFFSET_Y);
            }
        }

        // Checks done; everything below mutates.
        let attacker = &mut state.player_mut(order.attacker_slot)?.drones[order.attacker_index];
        attacker.set_position(launch);
        attacker.consume_ammo();

        let struck = match order.target_index {
            Some(index) => Some(index),
            None => nearest_in_blast(state.player(order.target_slot)?, aim),
        };

        let fraction = state.config.naval_damage_fraction;
        let mut result = HitResult {
            hit: false,
            damage: 0,
            accuracy: 0.0,
        };
        let mut remaining_health = None;
        let mut defeated_slot = None;

        if let Some(index) = struck {
            let target = state.player(order.target_slot)?.drones[index].clone();
            result = resolve_shot(
                &mut state.rng,
                attacker_side,
                &weapon,
                launch,
                aim,
                &target,
                fraction,
            );

            let target_player = state.player_mut(order.target_slot)?;
            let target = &mut target_player.drones[index];
            if result.hit {
                target.take_damage(result.damage);
            }
            remaining_health = Some(target.current_hp());

            if result.hit && target_player.is_defeated() {
                defeated_slot = Some(order.target_slot);
                info!(
                    match_id = %self.id,
                    defeated_slot = order.target_slot,
                    "All drones of a player destroyed"
                );
            }
        }

        let turn_change = state.spend_actions(cost);

        debug!(
            match_id = %self.id,
            attacker_slot = order.attacker_slot,
            attacker_index = order.attacker_index,
            target_slot = order.target_slot,
            target_index = ?struck,
            hit = result.hit,
            damage = result.damage,
            accuracy = result.accuracy,
            "Attack resolved"
        );

        Ok(AttackOutcome {
            attacker_slot: order.attacker_slot,
            attacker_index: order.attacker_index,
            attacker_position: launch,
            target_slot: order.target_slot,
            target_index: struck,
            hit: result.hit,
            damage: result.damage,
            remaining_health,
            accuracy: result.accuracy,
            defeated_slot,
            actions_remaining: state.actions_remaining,
            turn_change,
        })
    }

    /// End the caller's turn
    pub fn end_turn(&self, conn_id: Uuid) -> Result<TurnChange, MatchError> {
        let mut state = self.state.lock();

        let slot = state.slot_of(conn_id).ok_or(MatchError::NotSeated)?;
        state.require_open()?;
        state.require_turn(slot)?;

        let change = state.advance_turn();
        debug!(
            match_id = %self.id,
            ended_slot = change.ended_slot,
            active_slot = change.active_slot,
            fuel_losses = change.fuel_losses.len(),
            "Turn ended"
        );
        Ok(change)
    }

    /// Remove a connection's seat. A running match cannot continue with one
    /// player, so it resets and the other seat is evicted too.
    pub fn leave(&self, conn_id: Uuid) -> Option<LeaveOutcome> {
        let mut state = self.state.lock();

        let slot = state.slot_of(conn_id)?;
        state.players[slot] = None;

        let reset = state.game_started;
        let evicted = if reset {
            let others = state
                .players
                .iter()
                .flatten()
                .filter_map(|p| p.conn_id)
                .collect();
            state.reset();
            others
        } else {
            Vec::new()
        };

        info!(match_id = %self.id, conn_id = %conn_id, slot, reset, "Player left match");

        Some(LeaveOutcome {
            slot,
            reset,
            evicted,
        })
    }

    /// Hand a restored seat to a (re)connecting player
    pub fn assign_connection(&self, slot: usize, conn_id: Uuid) -> Result<(), MatchError> {
        let mut state = self.state.lock();

        if let Some(current) = state.slot_of(conn_id) {
            return if current == slot {
                Ok(())
            } else {
                Err(MatchError::AlreadySeated)
            };
        }

        let player = state.player_mut(slot).map_err(|_| MatchError::NotSeated)?;
        if player.conn_id.is_some() {
            return Err(MatchError::SlotClaimed);
        }
        player.conn_id = Some(conn_id);
        Ok(())
    }

    /// Drop every seat and all turn state
    pub fn reset(&self) {
        self.state.lock().reset();
    }

    pub fn slot_of(&self, conn_id: Uuid) -> Option<usize> {
        self.state.lock().slot_of(conn_id)
    }

    /// Connection bound to each slot
    pub fn connections(&self) -> [Option<Uuid>; MAX_PLAYERS] {
        let state = self.state.lock();
        [0, 1].map(|slot| state.players[slot].as_ref().and_then(|p| p.conn_id))
    }

    pub fn seated(&self) -> usize {
        self.state.lock().seated()
    }

    pub fn is_full(&self) -> bool {
        self.seated() == MAX_PLAYERS
    }

    pub fn is_empty(&self) -> bool {
        self.seated() == 0
    }

    /// Both seats are taken and have a live connection
    pub fn all_connected(&self) -> bool {
        self.connections().iter().all(Option::is_some)
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().game_started
    }

    pub fn current_turn(&self) -> usize {
        self.state.lock().current_turn
    }

    pub fn actions_remaining(&self) -> u32 {
        self.state.lock().actions_remaining
    }

    pub fn actions_per_turn(&self) -> u32 {
        self.state.lock().config.actions_per_turn
    }

    pub fn side_of(&self, slot: usize) -> Option<Side> {
        self.state.lock().player(slot).ok().and_then(|p| p.side)
    }

    pub fn is_defeated(&self, slot: usize) -> bool {
        self.state
            .lock()
            .player(slot)
            .map(PlayerState::is_defeated)
            .unwrap_or(false)
    }

    /// Copy of a seated player's state
    pub fn player(&self, slot: usize) -> Option<PlayerState> {
        self.state.lock().player(slot).ok().cloned()
    }

    /// Export the full match state
    pub fn to_snapshot(&self) -> MatchSnapshot {
        snapshot::export(&self.state.lock())
    }

    /// Freeze the match for saving and export it under the same lock
    pub fn begin_save(&self) -> Result<MatchSnapshot, MatchError> {
        let mut state = self.state.lock();
        if state.saving {
            return Err(MatchError::SaveInProgress);
        }
        state.saving = true;
        Ok(snapshot::export(&state))
    }

    /// Reopen a match whose save failed
    pub fn abort_save(&self) {
        self.state.lock().saving = false;
    }

    /// Rebuild a match from a saved snapshot. Restored seats have no
    /// connection until their players rejoin.
    pub fn from_snapshot(
        id: impl Into<String>,
        config: &GameConfig,
        snapshot: MatchSnapshot,
    ) -> Result<Self, SnapshotError> {
        let state = snapshot::import(snapshot, config)?;
        Ok(Self::from_state(id.into(), state))
    }

    #[cfg(test)]
    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&mut MatchState) -> T) -> T {
        f(&mut self.state.lock())
    }
}

/// Registry of all live matches, keyed by match id
pub struct MatchRegistry {
    matches: DashMap<String, Arc<Match>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Match>> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    /// Insert unless a match with that id already exists; returns the
    /// registered match either way
    pub fn insert_if_absent(&self, game_match: Arc<Match>) -> Arc<Match> {
        self.matches
            .entry(game_match.id().to_string())
            .or_insert(game_match)
            .value()
            .clone()
    }

    /// Find the match for `id` or create one with `create`
    pub fn get_or_try_create<E>(
        &self,
        id: &str,
        create: impl FnOnce() -> Result<Match, E>,
    ) -> Result<Arc<Match>, E> {
        if let Some(existing) = self.get(id) {
            return Ok(existing);
        }
        let entry = self.matches.entry(id.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(e) => Ok(e.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let created = Arc::new(create()?);
                e.insert(created.clone());
                Ok(created)
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Match>> {
        self.matches.remove(id).map(|(_, m)| m)
    }

    /// Remove the match once no seat has a live connection
    pub fn remove_if_unattended(&self, id: &str) -> bool {
        self.matches
            .remove_if(id, |_, m| m.connections().iter().all(Option::is_none))
            .is_some()
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
