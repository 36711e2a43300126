//! Numeric tuning knobs for the simulation, gathered in one place.

use crate::ws::protocol::Point;

/// Tuning parameters for physics, steering and damage.
///
/// These are gameplay-feel knobs, not correctness contracts. The defaults
/// are calibrated for the client's 800x600 screen-coordinate arena
/// (y grows downward, so gravity is positive).
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Downward gravity in px/s^2
    pub gravity_y: f32,
    /// Y coordinate of the static ground surface
    pub ground_y: f32,
    /// Arena width; side walls sit at x = 0 and x = arena_width
    pub arena_width: f32,

    /// Steering force per pixel of head-to-pointer distance
    pub steer_gain: f32,
    /// Cap on the steering force magnitude, so a far pointer pulls
    /// hard but never teleports the ragdoll
    pub steer_max_force: f32,

    /// Radius of each ragdoll part collider
    pub part_radius: f32,
    /// Stiffness of the soft constraints between parts
    pub constraint_stiffness: f32,
    /// Damping of the soft constraints between parts
    pub constraint_damping: f32,
    /// Linear damping applied to every part body
    pub body_damping: f32,

    /// Relative impact speed (px/s) below which a contact is treated
    /// as incidental and deals no damage
    pub min_impact_speed: f32,
    /// Damage per px/s of relative impact speed
    pub damage_scale: f32,
    /// Hard cap on damage from a single contact
    pub max_hit_damage: i32,
    /// Whether the chest counts as a vital (damageable) part
    pub vital_chest: bool,
    /// Whether the pelvis counts as a vital part
    pub vital_pelvis: bool,

    /// Starting health for every player
    pub max_health: i32,
    /// X coordinate of the first spawn slot
    pub spawn_x_base: f32,
    /// X distance between spawn slots
    pub spawn_x_step: f32,
    /// Y coordinate of every spawn slot
    pub spawn_y: f32,
    /// Steering target before the first pointerMove arrives
    pub default_pointer: Point,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            gravity_y: 900.0,
            ground_y: 500.0,
            arena_width: 800.0,

            steer_gain: 12.0,
            steer_max_force: 8000.0,

            part_radius: 6.0,
            constraint_stiffness: 300.0,
            constraint_damping: 8.0,
            body_damping: 1.5,

            min_impact_speed: 60.0,
            damage_scale: 0.04,
            max_hit_damage: 20,
            vital_chest: true,
            vital_pelvis: false,

            max_health: 100,
            spawn_x_base: 400.0,
            spawn_x_step: 100.0,
            spawn_y: 300.0,
            default_pointer: Point { x: 400.0, y: 300.0 },
        }
    }
}

impl Tuning {
    /// Spawn origin for a given join slot (0 = first joiner)
    pub fn spawn_origin(&self, slot: usize) -> Point {
        Point {
            x: self.spawn_x_base + self.spawn_x_step * slot as f32,
            y: self.spawn_y,
        }
    }
}
