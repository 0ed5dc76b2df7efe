pub mod config;
pub use config::{PhysicsConfig, RegionLayout, SolverParams, INFINITE_MASS};

pub mod math;
pub use math::{uv, Angle, Pose, Rotor2, Unit, Vec2, AABB};

pub mod physics;
pub use physics::{
    body::{BodyId, BoundingBox, ConvexPolygon, Mass, RigidBody, Shape},
    collision::{
        self,
        quadtree::{OverlayNode, Placement, QuadTree},
    },
    contact::Contact,
    forcefield::{self, ForceField},
    solver::{BodyStore, ContactSolver},
    worker::{CancelToken, Phase, RegionView, StepOutcome, Worker},
    world::{Router, SharedRegion, SimContext, World, WorkerMessage},
    PhysicsError, Velocity,
};
