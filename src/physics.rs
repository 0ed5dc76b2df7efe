use crate::math as m;

//

pub mod body;
pub use body::RigidBody;

pub mod collision;

pub mod contact;
pub use contact::Contact;

pub mod forcefield;
pub use forcefield::ForceField;

pub mod solver;
pub mod worker;
pub mod world;

//

/// Velocity of an object.
///
// Equivalent to a Vec3 but with names for the translational and rotational part.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Velocity {
    /// Linear velocity in units per second.
    pub linear: m::Vec2,
    /// Angular velocity in radians per second.
    pub angular: f64,
}

impl Default for Velocity {
    fn default() -> Self {
        Velocity {
            linear: m::Vec2::zero(),
            angular: 0.0,
        }
    }
}

impl Velocity {
    pub fn new(linear: m::Vec2, angular: f64) -> Self {
        Velocity { linear, angular }
    }
}

impl std::ops::Add for Velocity {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            linear: self.linear + other.linear,
            angular: self.angular + other.angular,
        }
    }
}
impl std::ops::Sub for Velocity {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            linear: self.linear - other.linear,
            angular: self.angular - other.angular,
        }
    }
}
impl std::ops::AddAssign for Velocity {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Errors produced when building bodies or driving the simulation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("A polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("Polygon vertices must be in counterclockwise order (signed edge sum was {edge_sum})")]
    ClockwiseWinding { edge_sum: f64 },
    #[error("Polygon edge {0} has zero length")]
    DegenerateEdge(usize),
    #[error("Got {normals} edge normals for {vertices} vertices")]
    NormalCountMismatch { vertices: usize, normals: usize },
    #[error("Mass must be positive, got {0}")]
    NonPositiveMass(f64),
    #[error("Tried to step the simulation by a negative time {0}")]
    NegativeTimeStep(f64),
    #[error("Worker threads are already running")]
    WorkersRunning,
    #[error("Worker threads are not running")]
    WorkersStopped,
    #[error("Failed to spawn a worker thread: {0}")]
    SpawnFailed(String),
}
