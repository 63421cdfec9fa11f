//! Combat system - weapons, hit chance, damage

use rand::Rng;

/// Radius around the aim point inside which a naval strike can land (pixels).
/// Naval targets further than this from the aim point cannot be hit.
pub const STRIKE_RADIUS: f64 = 120.0;

/// Vertical offset (pixels) a naval attacker takes behind its aim point
/// before launching.
pub const NAVAL_STRIKE_OFFSET_Y: f64 = 90.0;

/// Shared weapon characteristics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    /// Rounds left
    pub ammo: u32,
    /// Damage per hit
    pub damage: u32,
    /// Shots allowed per turn
    pub shots_per_turn: u32,
    /// Nominal hit chance (0.0 - 1.0)
    pub accuracy: f64,
    /// Range in hex widths
    pub range: f64,
}

/// Weapon carried by a drone
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weapon {
    /// Always hits for flat damage once range and cost checks pass
    Ballistic(WeaponStats),
    /// Accuracy falls off linearly with distance travelled
    Missile(WeaponStats),
}

impl Weapon {
    pub fn ballistic(ammo: u32, damage: u32, shots_per_turn: u32, accuracy: f64, range: f64) -> Self {
        Self::Ballistic(WeaponStats::new(ammo, damage, shots_per_turn, accuracy, range))
    }

    pub fn missile(ammo: u32, damage: u32, shots_per_turn: u32, accuracy: f64, range: f64) -> Self {
        Self::Missile(WeaponStats::new(ammo, damage, shots_per_turn, accuracy, range))
    }

    pub fn stats(&self) -> &WeaponStats {
        match self {
            Self::Ballistic(stats) | Self::Missile(stats) => stats,
        }
    }

    fn stats_mut(&mut self) -> &mut WeaponStats {
        match self {
            Self::Ballistic(stats) | Self::Missile(stats) => stats,
        }
    }

    pub fn damage(&self) -> u32 {
        self.stats().damage
    }

    pub fn range(&self) -> f64 {
        self.stats().range
    }

    pub fn ammo(&self) -> u32 {
        self.stats().ammo
    }

    pub fn has_ammo(&self) -> bool {
        self.stats().ammo > 0
    }

    pub fn set_ammo(&mut self, ammo: u32) {
        self.stats_mut().ammo = ammo;
    }

    /// Spend one round. Returns false if the weapon was empty.
    pub fn consume_ammo(&mut self) -> bool {
        let stats = self.stats_mut();
        if stats.ammo == 0 {
            return false;
        }
        stats.ammo -= 1;
        true
    }

    /// Whether a shot covering `traveled` hexes can reach its target
    pub fn can_reach(&self, traveled: f64) -> bool {
        traveled >= 0.0 && traveled <= self.range()
    }

    /// Hit chance after `traveled` hexes of flight
    pub fn effective_accuracy(&self, traveled: f64) -> f64 {
        match self {
            Self::Ballistic(_) => 1.0,
            Self::Missile(stats) => missile_accuracy(stats.accuracy, stats.range, traveled),
        }
    }
}

impl WeaponStats {
    pub fn new(ammo: u32, damage: u32, shots_per_turn: u32, accuracy: f64, range: f64) -> Self {
        Self {
            ammo,
            damage,
            shots_per_turn: shots_per_turn.max(1),
            accuracy: accuracy.clamp(0.0, 1.0),
            range: if range > 0.0 { range } else { 1.0 },
        }
    }
}

/// Linear falloff from `nominal` at distance 0 to 0 at `range`
pub fn missile_accuracy(nominal: f64, range: f64, traveled: f64) -> f64 {
    if traveled <= 0.0 {
        return nominal;
    }
    if traveled > range {
        return 0.0;
    }
    let normalized = traveled.min(range) / range;
    (nominal * (1.0 - normalized)).max(0.0)
}

/// Scale applied to accuracy against naval targets by how far the real
/// position is from the aim point
pub fn aim_offset_factor(offset_pixels: f64) -> f64 {
    (1.0 - offset_pixels / STRIKE_RADIUS).max(0.0)
}

/// Damage dealt by a naval missile to another naval drone
pub fn naval_on_naval_damage(target_max_hp: u32, fraction: f64) -> u32 {
    let raw = (target_max_hp as f64 * fraction).floor() as u32;
    raw.max(1)
}

/// Combat helpers
pub struct CombatSystem;

impl CombatSystem {
    /// Roll a hit against an accuracy in [0, 1]
    pub fn roll_hit<R: Rng + ?Sized>(rng: &mut R, accuracy: f64) -> bool {
        if accuracy <= 0.0 {
            return false;
        }
        if accuracy >= 1.0 {
            return true;
        }
        rng.gen::<f64>() < accuracy
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: u32, damage: u32) -> (u32, bool) {
        let new_health = current_health.saturating_sub(damage);
        (new_health, new_health == 0)
    }
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub hit: bool,
    pub damage: u32,
    pub accuracy: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn missile_accuracy_decreases_with_distance() {
        let weapon = Weapon::missile(2, 50, 1, 0.8, 15.0);

        assert!((weapon.effective_accuracy(0.0) - 0.8).abs() < 1e-4);
        assert!((weapon.effective_accuracy(7.5) - 0.4).abs() < 1e-4);
        assert!(weapon.effective_accuracy(15.0).abs() < 1e-4);
        assert_eq!(weapon.effective_accuracy(20.0), 0.0);
        assert!(!weapon.can_reach(15.5));
    }

    #[test]
    fn ballistic_accuracy_is_flat() {
        let weapon = Weapon::ballistic(3, 25, 1, 0.6, 3.0);
        assert_eq!(weapon.effective_accuracy(2.9), 1.0);
        assert!(weapon.can_reach(3.0));
        assert!(!weapon.can_reach(3.1));
    }

    #[test]
    fn ammo_runs_dry() {
        let mut weapon = Weapon::missile(1, 10, 1, 1.0, 4.0);
        assert!(weapon.consume_ammo());
        assert!(!weapon.has_ammo());
        assert!(!weapon.consume_ammo());
        assert_eq!(weapon.ammo(), 0);
    }

    #[test]
    fn aim_offset_scales_to_zero_at_strike_radius() {
        assert_eq!(aim_offset_factor(0.0), 1.0);
        assert!((aim_offset_factor(60.0) - 0.5).abs() < 1e-9);
        assert_eq!(aim_offset_factor(STRIKE_RADIUS), 0.0);
        assert_eq!(aim_offset_factor(500.0), 0.0);
    }

    #[test]
    fn naval_damage_is_floored_at_one() {
        assert_eq!(naval_on_naval_damage(150, 0.5), 75);
        assert_eq!(naval_on_naval_damage(1, 0.5), 1);
    }

    #[test]
    fn roll_respects_certain_outcomes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(CombatSystem::roll_hit(&mut rng, 1.0));
            assert!(!CombatSystem::roll_hit(&mut rng, 0.0));
        }
    }

    #[test]
    fn damage_saturates_at_zero() {
        assert_eq!(CombatSystem::apply_damage(30, 45), (0, true));
        assert_eq!(CombatSystem::apply_damage(100, 30), (70, false));
    }
}
