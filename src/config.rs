//! Tuning parameters for a [`World`][crate::World].
//!
//! All of these have sensible defaults. With the `serde-types` feature the
//! configuration can be loaded from any serde format, e.g. RON:
//!
//! ```ron
//! (
//!     bounds: (min: (x: 0.0, y: 0.0), max: (x: 2000.0, y: 1000.0)),
//!     layout: Quad,
//!     max_depth: 3,
//! )
//! ```

use crate::math::{Vec2, AABB};

/// Masses at or above this are treated as infinite.
pub const INFINITE_MASS: f64 = 2_147_483_646.0;

/// How the world rectangle is divided between workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum RegionLayout {
    /// One worker owns the whole world.
    Single,
    /// The world is split into four quadrants with one worker each.
    Quad,
}

impl RegionLayout {
    pub fn worker_count(&self) -> usize {
        match self {
            RegionLayout::Single => 1,
            RegionLayout::Quad => 4,
        }
    }
}

/// Constants used by contact resolution.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct SolverParams {
    /// Post-impulse velocities with a squared magnitude below this are snapped to zero.
    pub rest_velocity_sq: f64,
    /// Angular velocity changes smaller than this are snapped to zero.
    pub torque_epsilon: f64,
    /// Multiplier on the angular response to an impulse, further scaled by inverse mass.
    pub angular_response: f64,
    /// Center distance beyond which a separating contact may be forgotten.
    pub removal_distance: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            rest_velocity_sq: 0.5,
            torque_epsilon: 1e-6,
            angular_response: 10.0,
            removal_distance: 3.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct PhysicsConfig {
    /// The world rectangle. Bodies whose center leaves it are dropped.
    pub bounds: AABB,
    pub layout: RegionLayout,
    /// Depth of the partition tree below the world root.
    pub max_depth: usize,
    /// Multiplier applied to measured wall-clock time in free-running mode.
    pub time_scale: f64,
    /// Motion average below which sleep-enabled bodies fall asleep.
    pub sleep_epsilon: f64,
    pub solver: SolverParams,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            bounds: AABB {
                min: Vec2::zero(),
                max: Vec2::new(1000.0, 1000.0),
            },
            layout: RegionLayout::Quad,
            max_depth: 2,
            time_scale: 1.0,
            sleep_epsilon: 0.5,
            solver: SolverParams::default(),
        }
    }
}

impl PhysicsConfig {
    pub fn with_bounds(mut self, bounds: AABB) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_layout(mut self, layout: RegionLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn with_solver(mut self, solver: SolverParams) -> Self {
        self.solver = solver;
        self
    }

    /// The rectangles owned by each worker, indexed by worker.
    pub fn regions(&self) -> Vec<AABB> {
        match self.layout {
            RegionLayout::Single => vec![self.bounds],
            RegionLayout::Quad => self.bounds.quadrants().to_vec(),
        }
    }
}

#[cfg(all(test, feature = "serde-types"))]
mod tests {
    use super::*;

    #[test]
    fn load_partial_config_from_ron() {
        let src = "(
            bounds: (min: (x: 0.0, y: 0.0), max: (x: 200.0, y: 100.0)),
            layout: Single,
            solver: (angular_response: 4.0),
        )";
        let config: PhysicsConfig = ron::from_str(src).expect("Invalid config");
        assert_eq!(config.layout, RegionLayout::Single);
        assert_eq!(config.bounds.width(), 200.0);
        assert_eq!(config.bounds.height(), 100.0);
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.solver.angular_response, 4.0);
        assert_eq!(config.solver.removal_distance, 3.0);
        assert_eq!(config.regions(), vec![config.bounds]);
    }
}
