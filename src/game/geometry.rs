//! Field geometry - pixel positions, distance conversion, spawn placement

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Field width in pixels
pub const FIELD_WIDTH: f64 = 2400.0;
/// Field height in pixels
pub const FIELD_HEIGHT: f64 = 2400.0;

/// Hex size used by the client renderer (pixels, center to corner)
pub const HEX_SIZE: f64 = 30.0;

/// Minimum free radius around a living drone for a move destination
pub const OCCUPANCY_RADIUS: f64 = 15.0;

/// Carrier anchor x for each slot (opposite field edges)
const ANCHOR_X: [f64; 2] = [300.0, FIELD_WIDTH - 300.0];
/// Margin kept between an anchor and the top/bottom field edge
const ANCHOR_MARGIN_Y: f64 = 300.0;

/// Spacing between concentric spawn rings
pub const RING_SPACING: f64 = 40.0;
/// Drones held by the first ring; ring k holds k times as many
const FIRST_RING_CAPACITY: usize = 6;

/// A continuous position on the field, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Distance expressed in hex widths.
    ///
    /// This is a linear conversion of the pixel distance, not a walk over
    /// axial hex coordinates. Weapon ranges are measured in these units.
    pub fn hex_distance_to(&self, other: &Point) -> f64 {
        pixels_to_hexes(self.distance_to(other))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Width of one hex (flat distance between opposite edges) in pixels
pub fn hex_width() -> f64 {
    3f64.sqrt() * HEX_SIZE
}

/// Convert a pixel distance to hex widths
pub fn pixels_to_hexes(pixels: f64) -> f64 {
    pixels / hex_width()
}

/// Pick the carrier anchor for a slot: fixed x on the slot's field edge,
/// randomized y along the edge.
pub fn carrier_anchor<R: Rng + ?Sized>(slot: usize, rng: &mut R) -> Point {
    let x = ANCHOR_X[slot.min(1)];
    let y = rng.gen_range(ANCHOR_MARGIN_Y..=FIELD_HEIGHT - ANCHOR_MARGIN_Y);
    Point::new(x, y)
}

/// Anchor used when a saved snapshot does not carry one
pub fn default_anchor(slot: usize) -> Point {
    Point::new(ANCHOR_X[slot.min(1)], FIELD_HEIGHT / 2.0)
}

/// Offsets for `count` drones packed in concentric rings around an anchor.
///
/// Ring k (starting at 1) sits at radius `k * RING_SPACING` and holds
/// `6 * k` evenly spaced drones. Neighbours on the same ring are always
/// further apart than `OCCUPANCY_RADIUS`.
pub fn ring_offsets(count: usize) -> Vec<(f64, f64)> {
    let mut offsets = Vec::with_capacity(count);
    let mut ring = 1;

    while offsets.len() < count {
        let capacity = FIRST_RING_CAPACITY * ring;
        let radius = RING_SPACING * ring as f64;
        let placed = (count - offsets.len()).min(capacity);

        for i in 0..placed {
            let angle = std::f64::consts::TAU * i as f64 / capacity as f64;
            offsets.push((angle.cos() * radius, angle.sin() * radius));
        }
        ring += 1;
    }

    offsets
}

/// Spawn positions for a roster around an anchor
pub fn roster_positions(anchor: Point, count: usize) -> Vec<Point> {
    ring_offsets(count)
        .into_iter()
        .map(|(dx, dy)| anchor.offset(dx, dy))
        .collect()
}
