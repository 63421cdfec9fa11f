//! Drones and their per-side profiles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::combat::{CombatSystem, Weapon};
use super::geometry::Point;
use super::GameConfig;

/// Side a player fights for; also the type tag of a drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Naval,
    #[serde(alias = "Aereo")]
    Aerial,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Naval => "Naval",
            Side::Aerial => "Aerial",
        }
    }

    pub fn profile(&self) -> &'static DroneProfile {
        match self {
            Side::Naval => &NAVAL_PROFILE,
            Side::Aerial => &AERIAL_PROFILE,
        }
    }

    /// Actions spent by one attack from a drone of this side
    pub fn attack_cost(&self) -> u32 {
        match self {
            Side::Naval => 2,
            Side::Aerial => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for side names that are neither naval nor aerial
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid side: {0}")]
pub struct UnknownSide(pub String);

impl FromStr for Side {
    type Err = UnknownSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Naval" => Ok(Side::Naval),
            "Aerial" | "Aereo" => Ok(Side::Aerial),
            other => Err(UnknownSide(other.to_string())),
        }
    }
}

/// Fixed characteristics of a drone type
#[derive(Debug, Clone, Copy)]
pub struct DroneProfile {
    pub roster_size: usize,
    pub max_hp: u32,
    pub max_fuel: u32,
    pub damage: u32,
    pub ammo: u32,
}

/// Aerial drones: many, light, short-range missiles
pub const AERIAL_PROFILE: DroneProfile = DroneProfile {
    roster_size: 12,
    max_hp: 100,
    max_fuel: 20,
    damage: 30,
    ammo: 10,
};

/// Naval drones: few, sturdy, long-range missiles with a small stock
pub const NAVAL_PROFILE: DroneProfile = DroneProfile {
    roster_size: 6,
    max_hp: 150,
    max_fuel: 30,
    damage: 45,
    ammo: 2,
};

/// Aerial missile range in hex widths
pub const AERIAL_MISSILE_RANGE: f64 = 4.0;

/// Build the weapon a drone of `side` carries under `config`
pub fn weapon_for(side: Side, config: &GameConfig) -> Weapon {
    let profile = side.profile();
    match side {
        Side::Aerial => Weapon::missile(
            profile.ammo,
            profile.damage,
            1,
            config.aerial_accuracy,
            AERIAL_MISSILE_RANGE,
        ),
        Side::Naval => Weapon::missile(
            profile.ammo,
            profile.damage,
            1,
            config.naval_accuracy,
            config.missile_max_distance,
        ),
    }
}

/// Alive/destroyed status. Destroyed is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Alive,
    Destroyed,
}

/// Anything on the field with health and a position
pub trait Unit {
    fn position(&self) -> Point;
    fn max_hp(&self) -> u32;
    fn current_hp(&self) -> u32;
    fn status(&self) -> UnitStatus;

    /// Apply damage. Returns true if this call destroyed the unit.
    fn take_damage(&mut self, amount: u32) -> bool;

    fn is_alive(&self) -> bool {
        self.status() == UnitStatus::Alive
    }
}

/// A drone owned by one slot; the id names the slot and roster index
#[derive(Debug, Clone)]
pub struct Drone {
    id: String,
    side: Side,
    max_hp: u32,
    hp: u32,
    position: Point,
    status: UnitStatus,
    vision_range: u32,
    weapon: Weapon,
    fuel: u32,
    max_fuel: u32,
}

impl Drone {
    /// Fresh drone at full health, fuel and ammo
    pub fn new(side: Side, owner: usize, index: usize, position: Point, config: &GameConfig) -> Self {
        let profile = side.profile();
        Self {
            id: format!("p{}-d{}", owner, index),
            side,
            max_hp: profile.max_hp,
            hp: profile.max_hp,
            position,
            status: UnitStatus::Alive,
            vision_range: config.vision_range(side),
            weapon: weapon_for(side, config),
            fuel: profile.max_fuel,
            max_fuel: profile.max_fuel,
        }
    }

    /// Rebuild a drone from validated saved values
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        side: Side,
        owner: usize,
        index: usize,
        position: Point,
        hp: u32,
        alive: bool,
        vision_range: u32,
        fuel: u32,
        max_fuel: u32,
        ammo: u32,
        config: &GameConfig,
    ) -> Self {
        let mut drone = Self::new(side, owner, index, position, config);
        drone.hp = hp.min(drone.max_hp);
        drone.status = if alive { UnitStatus::Alive } else { UnitStatus::Destroyed };
        drone.vision_range = vision_range;
        drone.max_fuel = max_fuel;
        drone.fuel = fuel.min(max_fuel);
        drone.weapon.set_ammo(ammo);
        drone
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn vision_range(&self) -> u32 {
        self.vision_range
    }

    pub fn weapon(&self) -> &Weapon {
        &self.weapon
    }

    pub fn fuel(&self) -> u32 {
        self.fuel
    }

    pub fn max_fuel(&self) -> u32 {
        self.max_fuel
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Remaining missiles for naval drones
    pub fn missiles(&self) -> Option<u32> {
        match self.side {
            Side::Naval => Some(self.weapon.ammo()),
            Side::Aerial => None,
        }
    }

    pub fn has_ammo(&self) -> bool {
        self.weapon.has_ammo()
    }

    /// Spend one round/missile. Returns false if empty.
    pub fn consume_ammo(&mut self) -> bool {
        self.weapon.consume_ammo()
    }

    #[cfg(test)]
    pub fn set_fuel(&mut self, fuel: u32) {
        self.fuel = fuel.min(self.max_fuel);
    }

    #[cfg(test)]
    pub fn set_ammo(&mut self, ammo: u32) {
        self.weapon.set_ammo(ammo);
    }

    /// Burn one unit of fuel. Returns true if this emptied the tank and
    /// destroyed the drone.
    pub fn burn_fuel(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.fuel = self.fuel.saturating_sub(1);
        if self.fuel == 0 {
            self.destroy();
            return true;
        }
        false
    }

    fn destroy(&mut self) {
        self.status = UnitStatus::Destroyed;
    }
}

impl Unit for Drone {
    fn position(&self) -> Point {
        self.position
    }

    fn max_hp(&self) -> u32 {
        self.max_hp
    }

    fn current_hp(&self) -> u32 {
        self.hp
    }

    fn status(&self) -> UnitStatus {
        self.status
    }

    fn take_damage(&mut self, amount: u32) -> bool {
        if amount == 0 || !self.is_alive() {
            return false;
        }
        let (hp, dead) = CombatSystem::apply_damage(self.hp, amount);
        self.hp = hp;
        if dead {
            self.destroy();
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_names_parse_with_legacy_alias() {
        assert_eq!("Naval".parse::<Side>(), Ok(Side::Naval));
        assert_eq!("Aerial".parse::<Side>(), Ok(Side::Aerial));
        assert_eq!("Aereo".parse::<Side>(), Ok(Side::Aerial));
        assert!("Submarine".parse::<Side>().is_err());

        let side: Side = serde_json::from_str("\"Aereo\"").unwrap();
        assert_eq!(side, Side::Aerial);
        assert_eq!(serde_json::to_string(&Side::Aerial).unwrap(), "\"Aerial\"");
    }

    #[test]
    fn drones_take_profile_and_config_values() {
        let config = GameConfig::default();
        let aerial = Drone::new(Side::Aerial, 0, 0, Point::new(1.0, 2.0), &config);
        assert_eq!(aerial.vision_range(), 4);
        assert_eq!(aerial.max_hp(), 100);
        assert_eq!(aerial.missiles(), None);

        let naval = Drone::new(Side::Naval, 1, 3, Point::new(1.0, 2.0), &config);
        assert_eq!(naval.vision_range(), 3);
        assert_eq!(naval.missiles(), Some(2));
        assert_eq!(naval.weapon().range(), 15.0);
        assert_eq!(naval.id(), "p1-d3");
    }

    #[test]
    fn destruction_is_one_way() {
        let config = GameConfig::default();
        let mut drone = Drone::new(Side::Aerial, 0, 0, Point::new(0.0, 0.0), &config);

        assert!(!drone.take_damage(40));
        assert_eq!(drone.current_hp(), 60);
        assert!(drone.take_damage(1000));
        assert_eq!(drone.current_hp(), 0);
        assert!(!drone.is_alive());

        // further damage is ignored
        assert!(!drone.take_damage(10));
        assert_eq!(drone.status(), UnitStatus::Destroyed);
    }

    #[test]
    fn empty_tank_destroys_drone() {
        let config = GameConfig::default();
        let mut drone = Drone::new(Side::Naval, 0, 0, Point::new(0.0, 0.0), &config);
        drone.set_fuel(2);

        assert!(!drone.burn_fuel());
        assert!(drone.burn_fuel());
        assert_eq!(drone.fuel(), 0);
        assert!(!drone.is_alive());
        assert!(!drone.burn_fuel());
    }

    #[test]
    fn naval_missile_stock_is_finite() {
        let config = GameConfig::default();
        let mut drone = Drone::new(Side::Naval, 0, 0, Point::new(0.0, 0.0), &config);

        assert!(drone.consume_ammo());
        assert!(drone.consume_ammo());
        assert_eq!(drone.missiles(), Some(0));
        assert!(!drone.has_ammo());
        assert!(!drone.consume_ammo());
    }
}
