//! Live match <-> persisted game association

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::store::GameId;

/// Bidirectional match id <-> game id map.
///
/// Both directions live behind one lock and are only changed together, so a
/// lookup in either direction always agrees with the other.
#[derive(Default)]
pub struct GameLinks {
    inner: Mutex<Links>,
}

#[derive(Default)]
struct Links {
    game_by_match: HashMap<String, GameId>,
    match_by_game: HashMap<GameId, String>,
}

impl GameLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a match to a game, replacing any previous link of either side
    pub fn link(&self, match_id: &str, game_id: GameId) {
        let mut links = self.inner.lock();
        if let Some(old_game) = links.game_by_match.remove(match_id) {
            links.match_by_game.remove(&old_game);
        }
        if let Some(old_match) = links.match_by_game.remove(&game_id) {
            links.game_by_match.remove(&old_match);
        }
        links.game_by_match.insert(match_id.to_string(), game_id);
        links.match_by_game.insert(game_id, match_id.to_string());
    }

    pub fn game_of(&self, match_id: &str) -> Option<GameId> {
        self.inner.lock().game_by_match.get(match_id).copied()
    }

    /// Drop the link of a match; returns the game it pointed at
    pub fn unlink_match(&self, match_id: &str) -> Option<GameId> {
        let mut links = self.inner.lock();
        let game_id = links.game_by_match.remove(match_id)?;
        links.match_by_game.remove(&game_id);
        Some(game_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().game_by_match.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_directions_stay_in_step() {
        let links = GameLinks::new();
        links.link("lobby-a", 1);
        assert_eq!(links.game_of("lobby-a"), Some(1));

        // relinking a match drops its old game
        links.link("lobby-a", 2);
        assert_eq!(links.game_of("lobby-a"), Some(2));
        assert_eq!(links.len(), 1);

        // relinking a game drops its old match
        links.link("lobby-b", 2);
        assert_eq!(links.game_of("lobby-a"), None);
        assert_eq!(links.game_of("lobby-b"), Some(2));
        assert_eq!(links.len(), 1);

        // game 1 was released by the first relink
        links.link("lobby-c", 1);
        assert_eq!(links.len(), 2);

        assert_eq!(links.unlink_match("lobby-b"), Some(2));
        assert_eq!(links.unlink_match("lobby-c"), Some(1));
        assert!(links.is_empty());
        assert_eq!(links.unlink_match("lobby-b"), None);
    }
}
