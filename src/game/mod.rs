//! Match engine modules

pub mod combat;
pub mod geometry;
pub mod r#match;
pub mod snapshot;
pub mod units;

pub use r#match::{Match, MatchError, MatchRegistry};
pub use snapshot::{MatchSnapshot, SnapshotError};
pub use units::Side;

/// Turn budget a match starts with when nothing else is configured
pub const DEFAULT_ACTIONS_PER_TURN: u32 = 10;

/// Tuning knobs shared by every match on this server
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Move/attack actions per turn before the turn auto-advances
    pub actions_per_turn: u32,
    /// Vision range of aerial drones (hexes)
    pub aerial_vision_range: u32,
    /// Vision range of naval drones (hexes)
    pub naval_vision_range: u32,
    /// Range of naval missiles (hexes)
    pub missile_max_distance: f64,
    /// Fraction of a naval target's max hp taken by a naval missile hit
    pub naval_damage_fraction: f64,
    /// Nominal accuracy of aerial missiles
    pub aerial_accuracy: f64,
    /// Nominal accuracy of naval missiles
    pub naval_accuracy: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            actions_per_turn: DEFAULT_ACTIONS_PER_TURN,
            aerial_vision_range: 4,
            naval_vision_range: 3,
            missile_max_distance: 15.0,
            naval_damage_fraction: 0.5,
            aerial_accuracy: 0.75,
            naval_accuracy: 0.8,
        }
    }
}

impl GameConfig {
    pub fn vision_range(&self, side: Side) -> u32 {
        match side {
            Side::Aerial => self.aerial_vision_range,
            Side::Naval => self.naval_vision_range,
        }
    }

    /// Reject tuning that would break match invariants
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.actions_per_turn == 0 {
            return Err(MatchError::InvalidConfig(
                "actionsPerTurn must be greater than 0".to_string(),
            ));
        }
        if !(self.missile_max_distance > 0.0) {
            return Err(MatchError::InvalidConfig(
                "missile max distance must be greater than 0".to_string(),
            ));
        }
        if !(self.naval_damage_fraction > 0.0 && self.naval_damage_fraction <= 1.0) {
            return Err(MatchError::InvalidConfig(
                "naval damage fraction must be in (0, 1]".to_string(),
            ));
        }
        for accuracy in [self.aerial_accuracy, self.naval_accuracy] {
            if !(0.0..=1.0).contains(&accuracy) {
                return Err(MatchError::InvalidConfig(
                    "accuracy must be in [0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }
}
