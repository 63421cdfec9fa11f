//! Session router: owns live matches and the connection bookkeeping around
//! them, and turns client intents into match operations plus the outbound
//! messages they produce.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::links::GameLinks;
use crate::game::geometry::Point;
use crate::game::r#match::{AttackOrder, TurnChange};
use crate::game::units::UnknownSide;
use crate::game::{
    GameConfig, Match, MatchError, MatchRegistry, MatchSnapshot, Side, SnapshotError,
};
use crate::store::{
    GameId, GameStore, LobbyDirectory, SaveMeta, SaveRecord, StoreError, UserId, SNAPSHOT_SCHEMA,
};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Connection id assigned by the transport
pub type ConnId = Uuid;

/// Router failures; each one is reported to the calling connection only
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Already in a game")]
    AlreadyInGame,

    #[error("You are not in a game room")]
    NotInGame,

    #[error("You are not in this lobby")]
    NotInLobby,

    #[error("Both players must be connected to save")]
    NotReadyToSave,

    #[error("You are not a player of this game")]
    NotParticipant,

    #[error("Game {0} has no saved state")]
    NothingSaved(GameId),

    #[error(transparent)]
    InvalidSide(#[from] UnknownSide),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One outbound message and the connections it goes to
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub targets: Vec<ConnId>,
    pub msg: ServerMsg,
}

impl Dispatch {
    pub fn to(conn_id: ConnId, msg: ServerMsg) -> Self {
        Self {
            targets: vec![conn_id],
            msg,
        }
    }

    /// Every connection currently seated in `game_match`
    fn broadcast(game_match: &Match, msg: ServerMsg) -> Self {
        Self {
            targets: game_match.connections().into_iter().flatten().collect(),
            msg,
        }
    }
}

type RouterResult = Result<Vec<Dispatch>, RouterError>;

fn turn_dispatches(game_match: &Match, change: &TurnChange) -> Vec<Dispatch> {
    let mut out: Vec<Dispatch> = change
        .fuel_losses
        .iter()
        .map(|loss| {
            Dispatch::broadcast(
                game_match,
                ServerMsg::MoveDrone {
                    player_index: loss.slot,
                    drone_index: loss.drone_index,
                    x: loss.position.x,
                    y: loss.position.y,
                    remaining_fuel: 0,
                    destroyed_by_fuel: true,
                },
            )
        })
        .collect();
    out.push(Dispatch::broadcast(
        game_match,
        ServerMsg::TurnStart {
            active_player: change.active_slot,
            actions_remaining: change.actions_remaining,
        },
    ));
    out
}

fn start_dispatches(game_match: &Match) -> Vec<Dispatch> {
    vec![
        Dispatch::broadcast(
            game_match,
            ServerMsg::GameStart {
                state: game_match.to_snapshot(),
            },
        ),
        Dispatch::broadcast(
            game_match,
            ServerMsg::TurnStart {
                active_player: game_match.current_turn(),
                actions_remaining: game_match.actions_remaining(),
            },
        ),
    ]
}

/// Routes every connection to its match.
///
/// Tables:
/// - connection -> match id and connection -> user
/// - match id <-> persisted game id ([`GameLinks`])
/// - persisted game id -> async lock serializing load/save against the store
pub struct SessionRouter {
    config: GameConfig,
    matches: MatchRegistry,
    conn_matches: DashMap<ConnId, String>,
    conn_users: DashMap<ConnId, UserId>,
    links: GameLinks,
    game_locks: DashMap<GameId, Arc<AsyncMutex<()>>>,
    /// Per match: serializes creation of its persisted game
    creation_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    lobbies: Arc<dyn LobbyDirectory>,
    games: Arc<dyn GameStore>,
}

impl SessionRouter {
    pub fn new(
        config: GameConfig,
        lobbies: Arc<dyn LobbyDirectory>,
        games: Arc<dyn GameStore>,
    ) -> Self {
        Self {
            config,
            matches: MatchRegistry::new(),
            conn_matches: DashMap::new(),
            conn_users: DashMap::new(),
            links: GameLinks::new(),
            game_locks: DashMap::new(),
            creation_locks: DashMap::new(),
            lobbies,
            games,
        }
    }

    pub fn bind_user(&self, conn_id: ConnId, user_id: UserId) {
        self.conn_users.insert(conn_id, user_id);
    }

    pub fn resolve_user(&self, conn_id: ConnId) -> Option<UserId> {
        self.conn_users.get(&conn_id).map(|u| *u.value())
    }

    pub fn active_matches(&self) -> usize {
        self.matches.active_matches()
    }

    pub fn bound_connections(&self) -> usize {
        self.conn_users.len()
    }

    /// Live match of a lobby, if any
    pub fn match_for(&self, lobby_id: &str) -> Option<Arc<Match>> {
        self.matches.get(lobby_id)
    }

    /// Route one parsed client message
    pub async fn handle(&self, conn_id: ConnId, msg: ClientMsg) -> RouterResult {
        match msg {
            ClientMsg::Join { lobby_id } => self.join(conn_id, &lobby_id).await,
            ClientMsg::SelectSide { side } => self.select_side(conn_id, &side).await,
            ClientMsg::Move { drone_index, x, y } => self.move_drone(conn_id, drone_index, x, y),
            ClientMsg::Attack {
                attacker_index,
                target_player,
                target_drone,
                aim_x,
                aim_y,
            } => {
                let aim = match (aim_x, aim_y) {
                    (Some(x), Some(y)) => Some(Point::new(x, y)),
                    _ => None,
                };
                self.attack(conn_id, attacker_index, target_player, target_drone, aim)
            }
            ClientMsg::EndTurn => self.end_turn(conn_id),
            ClientMsg::SaveAndExit => self.save_and_exit(conn_id).await,
            ClientMsg::LoadGame { game_id } => self.load_game(conn_id, game_id).await,
            ClientMsg::Ping { t } => Ok(vec![Dispatch::to(
                conn_id,
                ServerMsg::Pong {
                    t,
                    server_time: unix_millis(),
                },
            )]),
        }
    }

    fn user(&self, conn_id: ConnId) -> Result<UserId, RouterError> {
        self.resolve_user(conn_id).ok_or(RouterError::Unauthenticated)
    }

    /// Match and slot a connection is seated in
    fn seat_of(&self, conn_id: ConnId) -> Result<(Arc<Match>, usize), RouterError> {
        let match_id = self
            .conn_matches
            .get(&conn_id)
            .map(|m| m.value().clone())
            .ok_or(RouterError::NotInGame)?;
        let game_match = self.matches.get(&match_id).ok_or(RouterError::NotInGame)?;
        let slot = game_match.slot_of(conn_id).ok_or(RouterError::NotInGame)?;
        Ok((game_match, slot))
    }

    /// Users seated in slot 0 and slot 1, if both are bound
    fn seated_users(&self, game_match: &Match) -> Option<[UserId; 2]> {
        let [first, second] = game_match.connections();
        Some([
            self.resolve_user(first?)?,
            self.resolve_user(second?)?,
        ])
    }

    /// Whether `game_match` is still the registered match for its id
    fn is_live(&self, game_match: &Match) -> bool {
        self.matches
            .get(game_match.id())
            .is_some_and(|live| std::ptr::eq(live.as_ref(), game_match))
    }

    fn game_lock(&self, game_id: GameId) -> Arc<AsyncMutex<()>> {
        self.game_locks.entry(game_id).or_default().value().clone()
    }

    /// Persisted game of a match, created on first use
    async fn ensure_game(
        &self,
        game_match: &Match,
        players: [UserId; 2],
    ) -> Result<GameId, RouterError> {
        if let Some(game_id) = self.links.game_of(game_match.id()) {
            return Ok(game_id);
        }

        let lock = self
            .creation_locks
            .entry(game_match.id().to_string())
            .or_default()
            .value()
            .clone();
        let _guard = lock.lock().await;

        if let Some(game_id) = self.links.game_of(game_match.id()) {
            return Ok(game_id);
        }
        if !self.is_live(game_match) {
            return Err(RouterError::NotInGame);
        }

        let game_id = self.games.create_game(players[0], players[1]).await?;
        self.links.link(game_match.id(), game_id);
        info!(match_id = %game_match.id(), game_id, "Persisted game linked");
        Ok(game_id)
    }

    /// Seat a connection in the match of a lobby
    pub async fn join(&self, conn_id: ConnId, lobby_id: &str) -> RouterResult {
        if self.conn_matches.contains_key(&conn_id) {
            return Err(RouterError::AlreadyInGame);
        }
        let user_id = self.user(conn_id)?;

        if !self.lobbies.is_member(lobby_id, user_id).await? {
            return Err(RouterError::NotInLobby);
        }

        match self.lobbies.saved_game_of(lobby_id).await? {
            None => self.join_fresh(conn_id, user_id, lobby_id),
            Some(game_id) => self.join_resumed(conn_id, user_id, lobby_id, game_id).await,
        }
    }

    fn join_fresh(&self, conn_id: ConnId, user_id: UserId, lobby_id: &str) -> RouterResult {
        let game_match = self
            .matches
            .get_or_try_create(lobby_id, || Match::new(lobby_id, self.config.clone()))?;
        let slot = game_match.join(conn_id)?;
        self.conn_matches.insert(conn_id, lobby_id.to_string());

        info!(conn_id = %conn_id, user_id, match_id = %lobby_id, slot, "Joined match");

        Ok(vec![Dispatch::to(
            conn_id,
            ServerMsg::Welcome {
                player_id: user_id,
                player_index: slot,
                is_load_game: false,
                game_id: self.links.game_of(lobby_id),
            },
        )])
    }

    async fn join_resumed(
        &self,
        conn_id: ConnId,
        user_id: UserId,
        lobby_id: &str,
        game_id: GameId,
    ) -> RouterResult {
        let lock = self.game_lock(game_id);
        let guard = lock.lock().await;

        let saved = self.games.load_game(game_id).await?;
        let slot = saved.slot_of(user_id).ok_or(RouterError::NotParticipant)?;

        let game_match = match self.matches.get(lobby_id) {
            Some(existing) => existing,
            None => {
                let raw = saved.snapshot.ok_or(RouterError::NothingSaved(game_id))?;
                let snapshot = MatchSnapshot::from_value(raw)?;
                let restored = Match::from_snapshot(lobby_id, &self.config, snapshot)?;
                let registered = self.matches.insert_if_absent(Arc::new(restored));
                self.links.link(lobby_id, game_id);
                info!(match_id = %lobby_id, game_id, "Match restored from save");
                registered
            }
        };

        if let Err(e) = game_match.assign_connection(slot, conn_id) {
            if self.matches.remove_if_unattended(lobby_id) {
                self.links.unlink_match(lobby_id);
            }
            return Err(e.into());
        }
        self.conn_matches.insert(conn_id, lobby_id.to_string());
        drop(guard);

        info!(conn_id = %conn_id, user_id, match_id = %lobby_id, game_id, slot, "Rejoined saved match");

        let mut out = vec![Dispatch::to(
            conn_id,
            ServerMsg::Welcome {
                player_id: user_id,
                player_index: slot,
                is_load_game: true,
                game_id: Some(game_id),
            },
        )];
        if game_match.all_connected() && game_match.is_started() {
            out.extend(start_dispatches(&game_match));
        }
        Ok(out)
    }

    pub async fn select_side(&self, conn_id: ConnId, side: &str) -> RouterResult {
        let side: Side = side.parse()?;
        let (game_match, slot) = self.seat_of(conn_id)?;
        let outcome = game_match.choose_side(slot, side)?;

        let mut out = vec![Dispatch::broadcast(
            &game_match,
            ServerMsg::SideChosen {
                player_index: slot,
                side,
            },
        )];

        if outcome.started {
            out.push(Dispatch::broadcast(&game_match, ServerMsg::BothReady));
            out.extend(start_dispatches(&game_match));

            // A failure here only delays persistence; saving retries it
            match self.seated_users(&game_match) {
                Some(players) => {
                    if let Err(e) = self.ensure_game(&game_match, players).await {
                        warn!(match_id = %game_match.id(), error = %e, "Failed to create persisted game");
                    }
                }
                None => warn!(match_id = %game_match.id(), "Match started without two bound users"),
            }
        }

        Ok(out)
    }

    pub fn move_drone(&self, conn_id: ConnId, drone_index: usize, x: f64, y: f64) -> RouterResult {
        let (game_match, _) = self.seat_of(conn_id)?;
        if !game_match.is_started() {
            return Err(MatchError::NotStarted.into());
        }

        let outcome = game_match.move_drone(conn_id, drone_index, x, y)?;
        let mut out = vec![Dispatch::broadcast(
            &game_match,
            ServerMsg::MoveDrone {
                player_index: outcome.slot,
                drone_index: outcome.drone_index,
                x: outcome.position.x,
                y: outcome.position.y,
                remaining_fuel: outcome.remaining_fuel,
                destroyed_by_fuel: outcome.destroyed_by_fuel,
            },
        )];
        if let Some(change) = &outcome.turn_change {
            out.extend(turn_dispatches(&game_match, change));
        }
        Ok(out)
    }

    pub fn attack(
        &self,
        conn_id: ConnId,
        attacker_index: usize,
        target_player: usize,
        target_drone: Option<usize>,
        aim: Option<Point>,
    ) -> RouterResult {
        let (game_match, slot) = self.seat_of(conn_id)?;
        let outcome = game_match.attack(AttackOrder {
            attacker_slot: slot,
            attacker_index,
            target_slot: target_player,
            target_index: target_drone,
            aim,
        })?;

        let mut out = vec![Dispatch::broadcast(
            &game_match,
            ServerMsg::AttackResult {
                attacker_player: outcome.attacker_slot,
                attacker_drone: outcome.attacker_index,
                target_player: outcome.target_slot,
                target_drone: outcome.target_index,
                damage: outcome.damage,
                remaining_health: outcome.remaining_health,
                hit: outcome.hit,
                attacker_x: outcome.attacker_position.x,
                attacker_y: outcome.attacker_position.y,
                defeated_player: outcome.defeated_slot,
            },
        )];
        if let Some(change) = &outcome.turn_change {
            out.extend(turn_dispatches(&game_match, change));
        }
        Ok(out)
    }

    pub fn end_turn(&self, conn_id: ConnId) -> RouterResult {
        let (game_match, _) = self.seat_of(conn_id)?;
        let change = game_match.end_turn(conn_id)?;
        Ok(turn_dispatches(&game_match, &change))
    }

    /// Persist the match and close it for everyone in it.
    ///
    /// The match is frozen under the game lock before it is exported, so no
    /// intent can land between the snapshot and the teardown. A save that
    /// lost the race to another save of the same match replies nothing.
    pub async fn save_and_exit(&self, conn_id: ConnId) -> RouterResult {
        let (game_match, slot) = self.seat_of(conn_id)?;
        let user_id = self.user(conn_id)?;
        if !game_match.is_full() {
            return Err(RouterError::NotReadyToSave);
        }
        let players = self
            .seated_users(&game_match)
            .ok_or(RouterError::NotReadyToSave)?;

        let members = self
            .lobbies
            .player_ids_of(game_match.id())
            .await?
            .ok_or(RouterError::NotReadyToSave)?;
        if !players.iter().all(|p| members.contains(p)) {
            return Err(RouterError::NotParticipant);
        }

        let game_id = match self.ensure_game(&game_match, players).await {
            Ok(game_id) => game_id,
            Err(RouterError::NotInGame) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let lock = self.game_lock(game_id);
        let _guard = lock.lock().await;

        if !self.is_live(&game_match) {
            debug!(match_id = %game_match.id(), game_id, "Match already closed, skipping save");
            return Ok(Vec::new());
        }

        let snapshot = game_match.begin_save()?.to_value();
        let record = SaveRecord {
            snapshot,
            meta: SaveMeta {
                saved_by_user_id: user_id,
                saved_by_player_index: slot,
                saved_at: Utc::now(),
                schema: SNAPSHOT_SCHEMA.to_string(),
                player_ids: players,
            },
        };
        if let Err(e) = self.write_save(game_id, user_id, record).await {
            game_match.abort_save();
            warn!(match_id = %game_match.id(), game_id, error = %e, "Save failed, match reopened");
            return Err(e);
        }

        let targets = self.teardown(&game_match);
        info!(match_id = %game_match.id(), game_id, user_id, slot, "Match saved and closed");

        Ok(vec![Dispatch {
            targets,
            msg: ServerMsg::GameSaved {
                game_id,
                saved_by_player_index: slot,
            },
        }])
    }

    /// Load, participant check, save. Caller holds the game lock.
    async fn write_save(
        &self,
        game_id: GameId,
        user_id: UserId,
        record: SaveRecord,
    ) -> Result<(), RouterError> {
        let saved = self.games.load_game(game_id).await?;
        if !saved.is_participant(user_id) {
            return Err(RouterError::NotParticipant);
        }
        self.games.save_game(game_id, record).await?;
        Ok(())
    }

    /// Unregister a match and every connection routed to it
    fn teardown(&self, game_match: &Match) -> Vec<ConnId> {
        let targets: Vec<ConnId> = game_match.connections().into_iter().flatten().collect();
        for conn_id in &targets {
            self.conn_matches.remove(conn_id);
        }
        self.matches.remove(game_match.id());
        self.links.unlink_match(game_match.id());
        self.creation_locks.remove(game_match.id());
        game_match.reset();
        targets
    }

    /// Open a lobby that resumes a persisted game
    pub async fn load_game(&self, conn_id: ConnId, game_id: GameId) -> RouterResult {
        if self.conn_matches.contains_key(&conn_id) {
            return Err(RouterError::AlreadyInGame);
        }
        let user_id = self.user(conn_id)?;

        let saved = self.games.load_game(game_id).await?;
        let slot = saved.slot_of(user_id).ok_or(RouterError::NotParticipant)?;
        let raw = saved
            .snapshot
            .clone()
            .ok_or(RouterError::NothingSaved(game_id))?;
        let state = MatchSnapshot::from_value(raw)?;

        let opponent = if slot == 0 {
            saved.player2_id
        } else {
            saved.player1_id
        };
        let lobby_id = self
            .lobbies
            .open_resume_lobby(game_id, user_id, opponent)
            .await?;

        info!(conn_id = %conn_id, user_id, game_id, lobby_id = %lobby_id, "Saved game loaded");

        Ok(vec![Dispatch::to(
            conn_id,
            ServerMsg::GameLoaded {
                state,
                lobby_id,
                game_id,
            },
        )])
    }

    /// Forget a connection. Returns the notifications for whoever remains.
    pub fn disconnect(&self, conn_id: ConnId) -> Vec<Dispatch> {
        self.conn_users.remove(&conn_id);

        let Some((_, match_id)) = self.conn_matches.remove(&conn_id) else {
            return Vec::new();
        };
        let Some(game_match) = self.matches.get(&match_id) else {
            return Vec::new();
        };
        let Some(outcome) = game_match.leave(conn_id) else {
            return Vec::new();
        };

        for evicted in &outcome.evicted {
            self.conn_matches.remove(evicted);
        }

        let mut targets: Vec<ConnId> = game_match.connections().into_iter().flatten().collect();
        targets.extend(outcome.evicted.iter().copied());

        if self.matches.remove_if_unattended(&match_id) {
            self.links.unlink_match(&match_id);
            self.creation_locks.remove(&match_id);
            debug!(match_id = %match_id, "Pruned empty match");
        }

        info!(conn_id = %conn_id, match_id = %match_id, slot = outcome.slot, reset = outcome.reset, "Connection left match");

        if targets.is_empty() {
            return Vec::new();
        }
        vec![Dispatch {
            targets,
            msg: ServerMsg::PlayerLeft {
                player_index: outcome.slot,
            },
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::units::Unit;
    use crate::store::memory::StoreOp;
    use crate::store::{InMemoryGameStore, InMemoryLobbies, LobbyInfo, SavedGame};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        router: SessionRouter,
        lobbies: Arc<InMemoryLobbies>,
        games: Arc<InMemoryGameStore>,
    }

    fn harness_with_delay(delay: Duration) -> Harness {
        let lobbies = Arc::new(InMemoryLobbies::new());
        let games = Arc::new(InMemoryGameStore::with_delay(delay));
        let router = SessionRouter::new(GameConfig::default(), lobbies.clone(), games.clone());
        Harness {
            router,
            lobbies,
            games,
        }
    }

    fn harness() -> Harness {
        harness_with_delay(Duration::ZERO)
    }

    fn lobby(id: &str, host: UserId, guest: UserId, game_id: Option<GameId>) -> LobbyInfo {
        LobbyInfo {
            id: id.to_string(),
            host_id: host,
            guest_id: Some(guest),
            game_id,
            expected_opponent_id: None,
        }
    }

    fn connect(h: &Harness, user_id: UserId) -> ConnId {
        let conn = Uuid::new_v4();
        h.router.bind_user(conn, user_id);
        conn
    }

    fn messages(out: &[Dispatch]) -> Vec<&ServerMsg> {
        out.iter().map(|d| &d.msg).collect()
    }

    /// Users 1 and 2 seated in "lobby-1", sides chosen, match started
    async fn started(h: &Harness) -> (ConnId, ConnId) {
        h.lobbies.insert(lobby("lobby-1", 1, 2, None));
        let c0 = connect(h, 1);
        let c1 = connect(h, 2);
        h.router.join(c0, "lobby-1").await.unwrap();
        h.router.join(c1, "lobby-1").await.unwrap();
        h.router.select_side(c0, "Naval").await.unwrap();
        h.router.select_side(c1, "Aerial").await.unwrap();
        (c0, c1)
    }

    #[tokio::test]
    async fn fresh_join_seats_in_order() {
        let h = harness();
        h.lobbies.insert(lobby("lobby-1", 1, 2, None));
        let c0 = connect(&h, 1);
        let c1 = connect(&h, 2);

        let out = h.router.join(c0, "lobby-1").await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].targets, vec![c0]);
        assert_eq!(
            out[0].msg,
            ServerMsg::Welcome {
                player_id: 1,
                player_index: 0,
                is_load_game: false,
                game_id: None,
            }
        );

        let out = h.router.join(c1, "lobby-1").await.unwrap();
        assert!(matches!(out[0].msg, ServerMsg::Welcome { player_index: 1, .. }));
        assert_eq!(h.router.active_matches(), 1);

        assert!(matches!(
            h.router.join(c0, "lobby-1").await,
            Err(RouterError::AlreadyInGame)
        ));
    }

    #[tokio::test]
    async fn join_requires_identity_and_membership() {
        let h = harness();
        h.lobbies.insert(lobby("lobby-1", 1, 2, None));

        let anonymous = Uuid::new_v4();
        assert!(matches!(
            h.router.join(anonymous, "lobby-1").await,
            Err(RouterError::Unauthenticated)
        ));

        let stranger = connect(&h, 9);
        assert!(matches!(
            h.router.join(stranger, "lobby-1").await,
            Err(RouterError::NotInLobby)
        ));
        assert!(matches!(
            h.router.join(stranger, "nowhere").await,
            Err(RouterError::Store(StoreError::LobbyNotFound))
        ));
        assert_eq!(h.router.active_matches(), 0);
    }

    #[tokio::test]
    async fn choosing_both_sides_starts_and_persists() {
        let h = harness();
        h.lobbies.insert(lobby("lobby-1", 1, 2, None));
        let c0 = connect(&h, 1);
        let c1 = connect(&h, 2);
        h.router.join(c0, "lobby-1").await.unwrap();
        h.router.join(c1, "lobby-1").await.unwrap();

        let err = h.router.select_side(c0, "Pirate").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid side: Pirate");

        let out = h.router.select_side(c0, "Naval").await.unwrap();
        assert_eq!(
            messages(&out),
            vec![&ServerMsg::SideChosen {
                player_index: 0,
                side: Side::Naval
            }]
        );
        assert_eq!(out[0].targets.len(), 2);

        let out = h.router.select_side(c1, "Aereo").await.unwrap();
        let kinds: Vec<_> = messages(&out)
            .into_iter()
            .map(|m| match m {
                ServerMsg::SideChosen { .. } => "sideChosen",
                ServerMsg::BothReady => "bothReady",
                ServerMsg::GameStart { .. } => "gameStart",
                ServerMsg::TurnStart { .. } => "turnStart",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["sideChosen", "bothReady", "gameStart", "turnStart"]);
        assert_eq!(
            out[3].msg,
            ServerMsg::TurnStart {
                active_player: 0,
                actions_remaining: 10
            }
        );

        let game = h.games.game(1).expect("persisted game created on start");
        assert_eq!((game.player1_id, game.player2_id), (1, 2));
    }

    #[tokio::test]
    async fn moves_are_rejected_before_start_and_out_of_turn() {
        let h = harness();
        h.lobbies.insert(lobby("lobby-1", 1, 2, None));
        let c0 = connect(&h, 1);
        h.router.join(c0, "lobby-1").await.unwrap();

        assert!(matches!(
            h.router.move_drone(c0, 0, 500.0, 500.0),
            Err(RouterError::Match(MatchError::NotStarted))
        ));
        assert!(matches!(
            h.router.move_drone(Uuid::new_v4(), 0, 500.0, 500.0),
            Err(RouterError::NotInGame)
        ));
    }

    #[tokio::test]
    async fn turn_exhaustion_broadcasts_turn_start() {
        let h = harness();
        let (c0, c1) = started(&h).await;

        let err = h.router.move_drone(c1, 0, 1500.0, 1500.0).unwrap_err();
        assert_eq!(err.to_string(), "Not your turn");

        for i in 0..9 {
            let out = h.router.move_drone(c0, 0, 800.0 + 20.0 * i as f64, 1200.0).unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].targets.len(), 2);
        }
        let out = h.router.move_drone(c0, 0, 1000.0, 1200.0).unwrap();
        assert!(matches!(
            out.last().map(|d| &d.msg),
            Some(ServerMsg::TurnStart {
                active_player: 1,
                actions_remaining: 10
            })
        ));

        let out = h.router.end_turn(c1).unwrap();
        assert!(matches!(
            out.last().map(|d| &d.msg),
            Some(ServerMsg::TurnStart { active_player: 0, .. })
        ));
    }

    #[tokio::test]
    async fn attack_result_reaches_both_players() {
        let h = harness();
        let (c0, _) = started(&h).await;

        let out = h.router.attack(c0, 0, 1, Some(0), None).unwrap();
        match &out[0].msg {
            ServerMsg::AttackResult {
                attacker_player,
                target_player,
                target_drone,
                ..
            } => {
                assert_eq!((*attacker_player, *target_player, *target_drone), (0, 1, Some(0)));
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(out[0].targets.len(), 2);

        let err = h.router.attack(c0, 0, 0, Some(1), None).unwrap_err();
        assert_eq!(err.to_string(), "Cannot attack your own drones");
    }

    #[tokio::test]
    async fn save_and_exit_persists_and_unroutes_everyone() {
        let h = harness();
        let (c0, c1) = started(&h).await;
        h.router.move_drone(c0, 3, 900.0, 900.0).unwrap();

        let out = h.router.save_and_exit(c1).await.unwrap();
        assert_eq!(
            out[0].msg,
            ServerMsg::GameSaved {
                game_id: 1,
                saved_by_player_index: 1
            }
        );
        assert_eq!(out[0].targets.len(), 2);
        assert_eq!(h.router.active_matches(), 0);
        assert!(matches!(h.router.end_turn(c0), Err(RouterError::NotInGame)));

        let game = h.games.game(1).unwrap();
        let meta = game.meta.unwrap();
        assert_eq!(meta.saved_by_user_id, 2);
        assert_eq!(meta.saved_by_player_index, 1);
        assert_eq!(meta.player_ids, [1, 2]);
        assert_eq!(meta.schema, SNAPSHOT_SCHEMA);
        let snapshot = MatchSnapshot::from_value(game.snapshot.unwrap()).unwrap();
        assert_eq!(snapshot.players[0].drones[3].x, 900.0);
        assert_eq!(snapshot.actions_remaining, Some(9));
    }

    #[tokio::test]
    async fn concurrent_saves_run_one_after_the_other() {
        let h = harness_with_delay(Duration::from_millis(20));
        let (c0, c1) = started(&h).await;

        let (first, second) = tokio::join!(h.router.save_and_exit(c0), h.router.save_and_exit(c1));
        let first = first.unwrap();
        let second = second.unwrap();

        // the save that waited finds the match closed and stays silent
        assert!(matches!(first[0].msg, ServerMsg::GameSaved { saved_by_player_index: 0, .. }));
        assert!(second.is_empty());
        assert_eq!(
            h.games.operations(1),
            vec![StoreOp::Create, StoreOp::Load, StoreOp::Save]
        );
        assert_eq!(h.games.game(1).unwrap().meta.unwrap().saved_by_user_id, 1);
    }

    #[tokio::test]
    async fn moves_during_a_save_are_refused() {
        let h = harness_with_delay(Duration::from_millis(50));
        let (c0, c1) = started(&h).await;
        let before = h.router.match_for("lobby-1").unwrap().player(0).unwrap().drones[0].position();

        let (saved, moved) = tokio::join!(h.router.save_and_exit(c1), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.router.move_drone(c0, 0, 1111.0, 1111.0)
        });

        assert!(matches!(
            moved,
            Err(RouterError::Match(MatchError::SaveInProgress))
        ));
        assert!(matches!(saved.unwrap()[0].msg, ServerMsg::GameSaved { .. }));

        let snapshot = MatchSnapshot::from_value(h.games.game(1).unwrap().snapshot.unwrap()).unwrap();
        assert_eq!(snapshot.players[0].drones[0].x, before.x);
        assert_eq!(snapshot.players[0].drones[0].y, before.y);
        assert_eq!(snapshot.actions_remaining, Some(10));
    }

    #[tokio::test]
    async fn failed_save_reopens_the_match() {
        let h = harness();
        let (c0, c1) = started(&h).await;
        h.games.insert(SavedGame {
            id: 1,
            player1_id: 8,
            player2_id: 9,
            snapshot: None,
            meta: None,
        });

        assert!(matches!(
            h.router.save_and_exit(c1).await,
            Err(RouterError::NotParticipant)
        ));
        assert_eq!(h.router.active_matches(), 1);
        assert!(h.router.move_drone(c0, 0, 900.0, 900.0).is_ok());
    }

    #[tokio::test]
    async fn save_requires_seated_users_to_be_lobby_members() {
        let h = harness();
        let (c0, _) = started(&h).await;

        // the directory no longer lists user 2 as the guest
        h.lobbies.insert(lobby("lobby-1", 1, 5, None));
        assert!(matches!(
            h.router.save_and_exit(c0).await,
            Err(RouterError::NotParticipant)
        ));

        h.lobbies.insert(LobbyInfo {
            guest_id: None,
            ..lobby("lobby-1", 1, 2, None)
        });
        assert!(matches!(
            h.router.save_and_exit(c0).await,
            Err(RouterError::NotReadyToSave)
        ));
        assert_eq!(h.router.active_matches(), 1);
    }

    #[tokio::test]
    async fn saved_game_resumes_in_a_new_lobby() {
        let h = harness();
        let (c0, c1) = started(&h).await;
        h.router.move_drone(c0, 2, 1000.0, 1000.0).unwrap();
        h.router.save_and_exit(c0).await.unwrap();

        let out = h.router.load_game(c1, 1).await.unwrap();
        let (lobby_id, state) = match &out[0].msg {
            ServerMsg::GameLoaded {
                lobby_id,
                state,
                game_id,
            } => {
                assert_eq!(*game_id, 1);
                (lobby_id.clone(), state.clone())
            }
            other => panic!("unexpected message {other:?}"),
        };
        assert!(state.game_started);

        let out = h.router.load_game(c0, 1).await.unwrap();
        assert!(matches!(&out[0].msg, ServerMsg::GameLoaded { lobby_id: l, .. } if *l == lobby_id));

        // user 2 comes back first but still gets slot 1
        let out = h.router.join(c1, &lobby_id).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].msg,
            ServerMsg::Welcome {
                player_id: 2,
                player_index: 1,
                is_load_game: true,
                game_id: Some(1),
            }
        );

        let out = h.router.join(c0, &lobby_id).await.unwrap();
        assert!(matches!(out[0].msg, ServerMsg::Welcome { player_index: 0, .. }));
        assert!(matches!(out[1].msg, ServerMsg::GameStart { .. }));
        assert!(matches!(
            out[2].msg,
            ServerMsg::TurnStart {
                active_player: 0,
                actions_remaining: 9
            }
        ));
        assert_eq!(out[1].targets.len(), 2);

        let resumed = h.router.match_for(&lobby_id).unwrap();
        assert_eq!(
            resumed.player(0).unwrap().drones[2].position(),
            Point::new(1000.0, 1000.0)
        );
        assert!(h.router.move_drone(c0, 2, 1040.0, 1000.0).is_ok());
    }

    #[tokio::test]
    async fn resumed_match_waits_for_the_opponent() {
        let h = harness();
        let (c0, c1) = started(&h).await;
        h.router.save_and_exit(c0).await.unwrap();

        let out = h.router.load_game(c0, 1).await.unwrap();
        let lobby_id = match &out[0].msg {
            ServerMsg::GameLoaded { lobby_id, .. } => lobby_id.clone(),
            other => panic!("unexpected message {other:?}"),
        };
        h.router.load_game(c1, 1).await.unwrap();

        let out = h.router.join(c0, &lobby_id).await.unwrap();
        assert_eq!(out.len(), 1);

        let waiting = |r: RouterResult| {
            matches!(r, Err(RouterError::Match(MatchError::AwaitingOpponent)))
        };
        assert!(waiting(h.router.move_drone(c0, 0, 900.0, 900.0)));
        assert!(waiting(h.router.attack(c0, 0, 1, Some(0), None)));
        assert!(waiting(h.router.end_turn(c0)));
        assert!(matches!(
            h.router.select_side(c0, "Aerial").await,
            Err(RouterError::Match(MatchError::AlreadyStarted))
        ));

        let out = h.router.join(c1, &lobby_id).await.unwrap();
        assert!(matches!(out[1].msg, ServerMsg::GameStart { .. }));
        assert!(h.router.move_drone(c0, 0, 900.0, 900.0).is_ok());
    }

    #[tokio::test]
    async fn only_participants_may_load_or_resume() {
        let h = harness();
        h.games.insert(SavedGame {
            id: 7,
            player1_id: 1,
            player2_id: 2,
            snapshot: Some(json!({ "gameStarted": false, "currentTurn": 0, "players": [] })),
            meta: None,
        });

        let stranger = connect(&h, 3);
        assert!(matches!(
            h.router.load_game(stranger, 7).await,
            Err(RouterError::NotParticipant)
        ));

        h.lobbies.insert(lobby("resume", 1, 3, Some(7)));
        assert!(matches!(
            h.router.join(stranger, "resume").await,
            Err(RouterError::NotParticipant)
        ));

        // user 1 resumes a snapshot without seats
        let c0 = connect(&h, 1);
        assert!(matches!(
            h.router.join(c0, "resume").await,
            Err(RouterError::Match(MatchError::NotSeated))
        ));
        assert_eq!(h.router.active_matches(), 0);
    }

    #[tokio::test]
    async fn malformed_save_registers_no_match() {
        let h = harness();
        h.games.insert(SavedGame {
            id: 3,
            player1_id: 1,
            player2_id: 2,
            snapshot: Some(json!({
                "gameStarted": false,
                "currentTurn": 0,
                "players": [{
                    "playerIndex": 0,
                    "drones": [{ "x": 1.0, "y": 1.0, "alive": true, "droneType": "Aerial" }],
                }],
            })),
            meta: None,
        });
        h.lobbies.insert(lobby("resume", 1, 2, Some(3)));

        let c0 = connect(&h, 1);
        assert!(matches!(
            h.router.join(c0, "resume").await,
            Err(RouterError::Snapshot(SnapshotError::Malformed(_)))
        ));
        assert_eq!(h.router.active_matches(), 0);
        assert!(h.router.match_for("resume").is_none());
        assert!(matches!(h.router.end_turn(c0), Err(RouterError::NotInGame)));
    }

    #[tokio::test]
    async fn disconnect_resets_running_match_and_notifies() {
        let h = harness();
        let (c0, c1) = started(&h).await;
        assert_eq!(h.router.bound_connections(), 2);

        let out = h.router.disconnect(c1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].targets, vec![c0]);
        assert_eq!(out[0].msg, ServerMsg::PlayerLeft { player_index: 1 });

        assert_eq!(h.router.bound_connections(), 1);
        assert_eq!(h.router.active_matches(), 0);
        assert!(matches!(h.router.end_turn(c0), Err(RouterError::NotInGame)));

        // the survivor can start over in the same lobby
        let out = h.router.join(c0, "lobby-1").await.unwrap();
        assert!(matches!(out[0].msg, ServerMsg::Welcome { player_index: 0, .. }));
        assert!(h.router.disconnect(Uuid::new_v4()).is_empty());
    }

    #[tokio::test]
    async fn disconnect_before_start_keeps_the_other_seat() {
        let h = harness();
        h.lobbies.insert(lobby("lobby-1", 1, 2, None));
        let c0 = connect(&h, 1);
        let c1 = connect(&h, 2);
        h.router.join(c0, "lobby-1").await.unwrap();
        h.router.join(c1, "lobby-1").await.unwrap();

        let out = h.router.disconnect(c0);
        assert_eq!(out[0].targets, vec![c1]);
        assert_eq!(h.router.active_matches(), 1);
        assert_eq!(h.router.match_for("lobby-1").unwrap().slot_of(c1), Some(1));

        h.router.disconnect(c1);
        assert_eq!(h.router.active_matches(), 0);
    }

    #[tokio::test]
    async fn ping_is_answered_directly() {
        let h = harness();
        let conn = connect(&h, 1);
        let out = h.router.handle(conn, ClientMsg::Ping { t: 42 }).await.unwrap();
        assert_eq!(out[0].targets, vec![conn]);
        assert!(matches!(out[0].msg, ServerMsg::Pong { t: 42, .. }));
    }
}
