use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scene {
    Main,
    Help,
}

/// The sheep. `offset` is height above ground in world px.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Avatar {
    pub(crate) offset: f32,
    pub(crate) velocity: f32,
}

impl Avatar {
    pub(crate) fn grounded(&self) -> bool {
        self.offset == 0.0
    }

    pub(crate) fn airborne(&self) -> bool {
        self.offset > 0.0 || self.velocity > 0.0
    }
}

/// The crab. `x` is the left edge of its sprite in world px and goes negative
/// past the left border before respawning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Obstacle {
    pub(crate) x: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct CollisionState {
    pub(crate) exploded: bool,
    /// Engine-clock instant at which the explosion clears on its own.
    pub(crate) reset_at: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TickEvent {
    Scored,
    Collided,
    Recovered,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct GapRange {
    pub(crate) min: f32,
    pub(crate) range: f32,
}

/// Hitboxes and boundaries, all in world px.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Geometry {
    pub(crate) avatar_x: f32,
    pub(crate) avatar_width: f32,
    pub(crate) obstacle_inset: f32,
    pub(crate) obstacle_width: f32,
    /// The avatar only overlaps the obstacle vertically below this height.
    pub(crate) clear_height: f32,
    pub(crate) despawn_x: f32,
    /// How far past the right border the obstacle lands after an explosion.
    pub(crate) reset_margin: f32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            avatar_x: 60.0,
            avatar_width: 30.0,
            obstacle_inset: 10.0,
            obstacle_width: 30.0,
            clear_height: 30.0,
            despawn_x: -80.0,
            reset_margin: 300.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Tuning {
    pub(crate) gravity: f32,       // px/tick²
    pub(crate) jump_strength: f32, // px/tick
    pub(crate) obstacle_speed: f32,
    pub(crate) tick_period_ms: u64,
    pub(crate) explosion_reset_ms: u64,
    pub(crate) respawn_gap: GapRange,
    pub(crate) geometry: Geometry,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            gravity: 0.6,
            jump_strength: 13.0,
            obstacle_speed: 5.0,
            tick_period_ms: 16,
            explosion_reset_ms: 1500,
            respawn_gap: GapRange {
                min: 100.0,
                range: 500.0,
            },
            geometry: Geometry::default(),
        }
    }
}

impl Tuning {
    pub(crate) fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub(crate) fn explosion_reset_delay(&self) -> Duration {
        Duration::from_millis(self.explosion_reset_ms)
    }

    /// Replaces unusable values with defaults and names the fields it touched.
    pub(crate) fn sanitize(&mut self) -> Vec<&'static str> {
        let d = Tuning::default();
        let mut fixed = Vec::new();
        if !(self.gravity.is_finite() && self.gravity > 0.0) {
            self.gravity = d.gravity;
            fixed.push("gravity");
        }
        if !(self.jump_strength.is_finite() && self.jump_strength > 0.0) {
            self.jump_strength = d.jump_strength;
            fixed.push("jump_strength");
        }
        if !(self.obstacle_speed.is_finite() && self.obstacle_speed > 0.0) {
            self.obstacle_speed = d.obstacle_speed;
            fixed.push("obstacle_speed");
        }
        if self.tick_period_ms == 0 {
            self.tick_period_ms = d.tick_period_ms;
            fixed.push("tick_period_ms");
        }
        let gap = self.respawn_gap;
        // the upper bound of the draw must stay finite too
        let upper = gap.min + gap.range;
        if !(upper.is_finite() && gap.min >= 0.0 && gap.range >= 0.0) {
            self.respawn_gap = d.respawn_gap;
            fixed.push("respawn_gap");
        }
        if !self.geometry.is_usable() {
            self.geometry = d.geometry;
            fixed.push("geometry");
        }
        fixed
    }
}

impl Geometry {
    fn is_usable(&self) -> bool {
        let all = [
            self.avatar_x,
            self.avatar_width,
            self.obstacle_inset,
            self.obstacle_width,
            self.clear_height,
            self.despawn_x,
            self.reset_margin,
        ];
        all.iter().all(|v| v.is_finite())
            && self.avatar_width > 0.0
            && self.obstacle_width > 0.0
            && self.clear_height >= 0.0
            && self.reset_margin >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tuning_json_keeps_defaults() {
        let t: Tuning = serde_json::from_str(r#"{"gravity": 1.2}"#).unwrap();
        assert_eq!(t.gravity, 1.2);
        assert_eq!(t.jump_strength, 13.0);
        assert_eq!(t.geometry, Geometry::default());
    }

    #[test]
    fn sanitize_repairs_bad_values() {
        let mut t = Tuning {
            gravity: -1.0,
            tick_period_ms: 0,
            respawn_gap: GapRange {
                min: 10.0,
                range: f32::NAN,
            },
            ..Tuning::default()
        };
        let fixed = t.sanitize();
        assert_eq!(fixed, vec!["gravity", "tick_period_ms", "respawn_gap"]);
        assert_eq!(t, Tuning::default());
    }

    #[test]
    fn huge_respawn_gap_is_rejected() {
        let mut t = Tuning {
            respawn_gap: GapRange {
                min: 3e38,
                range: 3e38,
            },
            ..Tuning::default()
        };
        assert_eq!(t.sanitize(), vec!["respawn_gap"]);
        assert_eq!(t.respawn_gap, Tuning::default().respawn_gap);
    }

    #[test]
    fn broken_geometry_falls_back_to_defaults() {
        let mut t = Tuning::default();
        t.geometry.obstacle_width = 0.0;
        t.geometry.despawn_x = f32::NEG_INFINITY;
        assert_eq!(t.sanitize(), vec!["geometry"]);
        assert_eq!(t.geometry, Geometry::default());
    }
}
