use super::{PhysicsError, Velocity};
use crate::{config::INFINITE_MASS, math as m};

use itertools::Itertools;

/// Unique identifier of a body within a [`World`][crate::World].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub u64);

impl BodyId {
    /// Placeholder for bodies that haven't been added to a world yet.
    pub const UNASSIGNED: BodyId = BodyId(u64::MAX);

    /// An order-independent key for a pair of bodies.
    #[inline]
    pub fn pair(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl Mass {
    /// Values at or above [`INFINITE_MASS`][crate::INFINITE_MASS] become `Infinite`.
    pub fn new(mass: f64) -> Result<Self, PhysicsError> {
        if mass.is_nan() || mass <= 0.0 {
            return Err(PhysicsError::NonPositiveMass(mass));
        }
        if mass >= INFINITE_MASS {
            return Ok(Mass::Infinite);
        }
        Ok(Mass::Finite {
            mass,
            inverse: 1.0 / mass,
        })
    }

    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }

    #[inline]
    pub fn is_infinite(&self) -> bool {
        matches!(self, Mass::Infinite)
    }
}

/// Axis-aligned half extents around a body's center.
/// Only ever used for quick rejection, never as the body's real shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub hw: f64,
    pub hh: f64,
}

impl BoundingBox {
    /// Strict overlap test between two boxes placed at the given centers.
    pub fn overlaps(&self, center: m::Vec2, other: &BoundingBox, other_center: m::Vec2) -> bool {
        (center.x - self.hw) < (other_center.x + other.hw)
            && (center.x + self.hw) > (other_center.x - other.hw)
            && (center.y - self.hh) < (other_center.y + other.hh)
            && (center.y + self.hh) > (other_center.y - other.hh)
    }
}

/// A convex polygon in body space with counterclockwise vertices.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvexPolygon {
    vertices: Vec<m::Vec2>,
    /// Outward unit normal of the edge from vertex `i` to vertex `i + 1`.
    normals: Vec<m::Unit<m::Vec2>>,
}

/// The vertex or pair of tied vertices of a polygon furthest in some direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Support {
    One(usize),
    Two(usize, usize),
}

impl ConvexPolygon {
    pub fn new(vertices: Vec<m::Vec2>) -> Result<Self, PhysicsError> {
        Self::check_vertices(&vertices)?;
        let normals = vertices
            .iter()
            .circular_tuple_windows()
            .map(|(v0, v1)| m::Unit::new_normalize(m::right_normal(*v1 - *v0)))
            .collect();
        Ok(Self { vertices, normals })
    }

    /// Create a polygon with normals that were computed elsewhere,
    /// e.g. loaded alongside the vertices.
    pub fn with_normals(
        vertices: Vec<m::Vec2>,
        normals: Vec<m::Unit<m::Vec2>>,
    ) -> Result<Self, PhysicsError> {
        Self::check_vertices(&vertices)?;
        if normals.len() != vertices.len() {
            return Err(PhysicsError::NormalCountMismatch {
                vertices: vertices.len(),
                normals: normals.len(),
            });
        }
        Ok(Self { vertices, normals })
    }

    /// A rectangle centered on the body origin.
    pub fn rect(width: f64, height: f64) -> Self {
        let hw = width / 2.0;
        let hh = height / 2.0;
        Self {
            vertices: vec![
                m::Vec2::new(-hw, -hh),
                m::Vec2::new(hw, -hh),
                m::Vec2::new(hw, hh),
                m::Vec2::new(-hw, hh),
            ],
            normals: vec![
                m::Unit::new_unchecked(m::Vec2::new(0.0, -1.0)),
                m::Unit::unit_x(),
                m::Unit::unit_y(),
                m::Unit::new_unchecked(m::Vec2::new(-1.0, 0.0)),
            ],
        }
    }

    fn check_vertices(vertices: &[m::Vec2]) -> Result<(), PhysicsError> {
        if vertices.len() < 3 {
            return Err(PhysicsError::TooFewVertices(vertices.len()));
        }
        if let Some(edge) = vertices
            .iter()
            .circular_tuple_windows()
            .position(|(v1, v2)| (*v2 - *v1).mag_sq() == 0.0)
        {
            return Err(PhysicsError::DegenerateEdge(edge));
        }
        // sum over edges (x2 - x1) * (y2 + y1) is negative for counterclockwise order
        let edge_sum: f64 = vertices
            .iter()
            .circular_tuple_windows()
            .map(|(v1, v2)| (v2.x - v1.x) * (v2.y + v1.y))
            .sum();
        if edge_sum >= 0.0 {
            return Err(PhysicsError::ClockwiseWinding { edge_sum });
        }
        Ok(())
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn normals(&self) -> &[m::Unit<m::Vec2>] {
        &self.normals
    }

    pub fn area(&self) -> f64 {
        0.5 * self
            .vertices
            .iter()
            .circular_tuple_windows()
            .map(|(a, b)| m::cross(*a, *b))
            .sum::<f64>()
    }

    /// Second moment of area about the body origin.
    pub fn second_moment_of_area(&self) -> f64 {
        self.vertices
            .iter()
            .circular_tuple_windows()
            .map(|(a, b)| m::cross(*a, *b) * (a.dot(*a) + a.dot(*b) + b.dot(*b)))
            .sum::<f64>()
            / 12.0
    }

    /// Vertices transformed into world space.
    pub fn world_vertices(&self, pose: &m::Pose) -> Vec<m::Vec2> {
        self.vertices.iter().map(|v| m::to_world(pose, *v)).collect()
    }

    /// Find the vertex minimizing the dot product with a body-space direction.
    ///
    /// If two vertices give exactly the same value, both are kept
    /// so that parallel faces produce a contact point between them.
    pub fn support(&self, local_dir: m::Vec2) -> Support {
        let mut best = 0;
        let mut tied = None;
        let mut best_dist = f64::INFINITY;
        for (i, v) in self.vertices.iter().enumerate() {
            let dist = local_dir.dot(*v);
            if dist < best_dist {
                best_dist = dist;
                best = i;
                tied = None;
            } else if dist == best_dist && tied.is_none() {
                tied = Some(i);
            }
        }
        match tied {
            Some(other) => Support::Two(best, other),
            None => Support::One(best),
        }
    }
}

/// The physical shape of a body.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Circle { r: f64 },
    Polygon(ConvexPolygon),
}

impl Shape {
    pub fn area(&self) -> f64 {
        match self {
            Shape::Circle { r } => std::f64::consts::PI * r * r,
            Shape::Polygon(poly) => poly.area(),
        }
    }

    pub fn second_moment_of_area(&self) -> f64 {
        // from https://en.wikipedia.org/wiki/List_of_second_moments_of_area
        match self {
            Shape::Circle { r } => std::f64::consts::PI * r.powi(4) / 2.0,
            Shape::Polygon(poly) => poly.second_moment_of_area(),
        }
    }

    /// Half extents of the shape rotated by the given angle.
    pub fn bounds(&self, orientation: f64) -> BoundingBox {
        match self {
            Shape::Circle { r } => BoundingBox { hw: *r, hh: *r },
            Shape::Polygon(poly) => {
                let rot = m::Rotor2::from_angle(orientation);
                poly.vertices()
                    .iter()
                    .map(|v| rot * *v)
                    .fold(BoundingBox { hw: 0.0, hh: 0.0 }, |b, v| BoundingBox {
                        hw: b.hw.max(v.x.abs()),
                        hh: b.hh.max(v.y.abs()),
                    })
            }
        }
    }
}

/// A rigid body that moves under forces and collides with others.
#[derive(Clone, Debug)]
pub struct RigidBody {
    pub(crate) id: BodyId,
    pub(crate) owner: usize,
    pub(crate) depth: usize,
    shape: Shape,
    center: m::Vec2,
    orientation: f64,
    bounds: BoundingBox,
    pub(crate) velocity: Velocity,
    acceleration: m::Vec2,
    angular_acceleration: f64,
    force: m::Vec2,
    torque: f64,
    mass: Mass,
    moment_of_inertia: Mass,
    restitution: f64,
    damping: f64,
    angular_damping: f64,
    awake: bool,
    can_sleep: bool,
    motion: f64,
}

impl RigidBody {
    pub fn new(shape: Shape, center: m::Vec2) -> Self {
        let bounds = shape.bounds(0.0);
        let mut body = RigidBody {
            id: BodyId::UNASSIGNED,
            owner: 0,
            depth: 0,
            shape,
            center,
            orientation: 0.0,
            bounds,
            velocity: Velocity::default(),
            acceleration: m::Vec2::zero(),
            angular_acceleration: 0.0,
            force: m::Vec2::zero(),
            torque: 0.0,
            mass: Mass::Infinite,
            moment_of_inertia: Mass::Infinite,
            restitution: 1.0,
            damping: 1.0,
            angular_damping: 1.0,
            awake: true,
            can_sleep: false,
            motion: f64::INFINITY,
        };
        body.set_mass(Mass::Finite {
            mass: 1.0,
            inverse: 1.0,
        });
        body
    }

    pub fn new_circle(center: m::Vec2, radius: f64) -> Self {
        Self::new(Shape::Circle { r: radius }, center)
    }

    /// Create a polygon body from counterclockwise body-space vertices.
    pub fn new_polygon(vertices: Vec<m::Vec2>, center: m::Vec2) -> Result<Self, PhysicsError> {
        Ok(Self::new(Shape::Polygon(ConvexPolygon::new(vertices)?), center))
    }

    /// Set the mass, and with it the moment of inertia computed from the shape.
    ///
    /// Masses at or above [`INFINITE_MASS`][crate::INFINITE_MASS] make the body immovable.
    pub fn with_mass(mut self, mass: f64) -> Result<Self, PhysicsError> {
        self.set_mass(Mass::new(mass)?);
        Ok(self)
    }

    /// Make the body immovable.
    pub fn with_infinite_mass(mut self) -> Self {
        self.set_mass(Mass::Infinite);
        self
    }

    pub fn with_velocity(mut self, linear: m::Vec2) -> Self {
        self.velocity.linear = linear;
        self
    }

    pub fn with_angular_velocity(mut self, angular: f64) -> Self {
        self.velocity.angular = angular;
        self
    }

    /// Set a constant acceleration that persists across steps.
    pub fn with_acceleration(mut self, acceleration: m::Vec2) -> Self {
        self.acceleration = acceleration;
        self
    }

    pub fn with_angular_acceleration(mut self, angular: f64) -> Self {
        self.angular_acceleration = angular;
        self
    }

    pub fn with_orientation(mut self, angle: m::Angle) -> Self {
        self.set_orientation(angle.rad());
        self
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Set the fraction of velocity kept after one second.
    /// 1.0 means no damping at all.
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Allow the body to fall asleep when it has been nearly still for a while.
    pub fn with_can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        if !can_sleep {
            self.wake();
        }
        self
    }

    fn set_mass(&mut self, mass: Mass) {
        self.mass = mass;
        self.moment_of_inertia = match mass {
            Mass::Finite { mass, .. } => {
                let area = self.shape.area();
                let moment = self.shape.second_moment_of_area() * mass / area;
                Mass::new(moment).unwrap_or(Mass::Infinite)
            }
            Mass::Infinite => Mass::Infinite,
        };
    }

    // accessors

    #[inline]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Index of the worker currently responsible for this body.
    #[inline]
    pub fn owner(&self) -> usize {
        self.owner
    }

    /// Depth of the partition node this body was last inserted into.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn center(&self) -> m::Vec2 {
        self.center
    }

    /// Orientation in radians, counterclockwise.
    #[inline]
    pub fn orientation(&self) -> f64 {
        self.orientation
    }

    #[inline]
    pub fn pose(&self) -> m::Pose {
        m::pose(self.center, self.orientation)
    }

    #[inline]
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    #[inline]
    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    #[inline]
    pub fn mass(&self) -> Mass {
        self.mass
    }

    #[inline]
    pub fn inverse_mass(&self) -> f64 {
        self.mass.inv()
    }

    #[inline]
    pub fn inverse_moment_of_inertia(&self) -> f64 {
        self.moment_of_inertia.inv()
    }

    #[inline]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Vertices in world space if this is a polygon.
    pub fn world_vertices(&self) -> Option<Vec<m::Vec2>> {
        match &self.shape {
            Shape::Polygon(poly) => Some(poly.world_vertices(&self.pose())),
            Shape::Circle { .. } => None,
        }
    }

    // mutation

    pub fn set_center(&mut self, center: m::Vec2) {
        self.center = center;
    }

    pub fn set_velocity(&mut self, linear: m::Vec2) {
        self.velocity.linear = linear;
    }

    pub fn set_orientation(&mut self, angle: f64) {
        self.orientation = angle;
        self.bounds = self.shape.bounds(angle);
    }

    pub fn rotate_by(&mut self, angle: f64) {
        self.set_orientation(self.orientation + angle);
    }

    /// Add a force through the center of mass for the next step.
    pub fn add_force(&mut self, force: m::Vec2) {
        if self.mass.is_infinite() {
            return;
        }
        self.force += force;
        self.wake();
    }

    pub fn add_torque(&mut self, torque: f64) {
        if self.moment_of_inertia.is_infinite() {
            return;
        }
        self.torque += torque;
        self.wake();
    }

    /// Add a world-space force acting at a world-space point,
    /// producing both a linear force and a torque.
    pub fn add_force_at_point(&mut self, force: m::Vec2, point: m::Vec2) {
        let arm = point - self.center;
        self.add_force(force);
        self.add_torque(m::cross(arm, force));
    }

    /// Apply a change of velocity and position computed by another worker.
    pub(crate) fn nudge(&mut self, velocity: Velocity, translation: m::Vec2) {
        self.velocity += velocity;
        self.center += translation;
        if velocity != Velocity::default() {
            self.wake();
        }
    }

    pub fn wake(&mut self) {
        self.awake = true;
        self.motion = f64::INFINITY;
    }

    fn clear_forces(&mut self) {
        self.force = m::Vec2::zero();
        self.torque = 0.0;
    }

    /// Move the body forward in time by `dt` seconds with semi-implicit Euler.
    ///
    /// Returns whether the body moved.
    pub fn integrate(&mut self, dt: f64, sleep_epsilon: f64) -> Result<bool, PhysicsError> {
        if dt < 0.0 {
            return Err(PhysicsError::NegativeTimeStep(dt));
        }
        if !self.awake {
            self.clear_forces();
            return Ok(false);
        }

        let acceleration = self.acceleration + self.force * self.mass.inv();
        self.velocity.linear =
            (self.velocity.linear + acceleration * dt) * self.damping.powf(dt);
        let angular_acceleration =
            self.angular_acceleration + self.torque * self.moment_of_inertia.inv();
        self.velocity.angular =
            (self.velocity.angular + angular_acceleration * dt) * self.angular_damping.powf(dt);

        let mut moved = false;
        if self.velocity.linear.mag_sq() > 0.0 && dt > 0.0 {
            self.center += self.velocity.linear * dt;
            moved = true;
        }
        if self.velocity.angular != 0.0 && dt > 0.0 {
            self.rotate_by(self.velocity.angular * dt);
            moved = true;
        }

        self.clear_forces();

        if self.can_sleep {
            // recency-weighted average of kinetic motion
            let current = self.velocity.linear.mag_sq() + self.velocity.angular.powi(2);
            let bias = 0.5f64.powf(dt);
            self.motion = bias * self.motion.min(10.0 * sleep_epsilon) + (1.0 - bias) * current;
            if self.motion < sleep_epsilon {
                self.awake = false;
                self.velocity = Velocity::default();
            }
        }

        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> Vec<m::Vec2> {
        let h = side / 2.0;
        vec![
            m::Vec2::new(-h, -h),
            m::Vec2::new(h, -h),
            m::Vec2::new(h, h),
            m::Vec2::new(-h, h),
        ]
    }

    #[test]
    fn clockwise_polygon_is_rejected() {
        let mut verts = square(2.0);
        verts.reverse();
        match RigidBody::new_polygon(verts, m::Vec2::zero()) {
            Err(PhysicsError::ClockwiseWinding { edge_sum }) => assert!(edge_sum > 0.0),
            other => panic!("Expected a winding error, got {:?}", other),
        }
        assert_eq!(
            ConvexPolygon::new(vec![m::Vec2::zero(), m::Vec2::unit_x()]),
            Err(PhysicsError::TooFewVertices(2))
        );
    }

    #[test]
    fn repeated_vertex_is_rejected() {
        let mut verts = square(2.0);
        verts.insert(2, verts[1]);
        assert_eq!(
            ConvexPolygon::new(verts.clone()),
            Err(PhysicsError::DegenerateEdge(1))
        );
        let normals = vec![m::Unit::unit_x(); verts.len()];
        assert_eq!(
            ConvexPolygon::with_normals(verts, normals),
            Err(PhysicsError::DegenerateEdge(1))
        );
        // wrapping edge from the last vertex back to the first
        let mut verts = square(2.0);
        verts.push(verts[0]);
        assert_eq!(
            ConvexPolygon::new(verts),
            Err(PhysicsError::DegenerateEdge(4))
        );
    }

    #[test]
    fn normals_point_outward() {
        let poly = ConvexPolygon::new(square(2.0)).unwrap();
        assert_eq!(poly, ConvexPolygon::rect(2.0, 2.0));
        for (v, n) in poly.vertices().iter().zip(poly.normals()) {
            // for a polygon around the origin every vertex is on the outer side of its edge
            assert!(v.dot(**n) > 0.0);
        }
        assert!(matches!(
            ConvexPolygon::with_normals(square(2.0), vec![m::Unit::unit_x()]),
            Err(PhysicsError::NormalCountMismatch {
                vertices: 4,
                normals: 1
            })
        ));
    }

    #[test]
    fn support_keeps_ties() {
        let poly = ConvexPolygon::rect(2.0, 2.0);
        assert_eq!(poly.support(m::Vec2::new(0.0, 1.0)), Support::Two(0, 1));
        assert_eq!(poly.support(m::Vec2::new(1.0, 1.0)), Support::One(0));
    }

    #[test]
    fn mass_sentinel_and_moment() {
        let body = RigidBody::new_circle(m::Vec2::zero(), 2.0)
            .with_mass(INFINITE_MASS)
            .unwrap();
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.inverse_moment_of_inertia(), 0.0);

        let body = RigidBody::new_circle(m::Vec2::zero(), 2.0)
            .with_mass(4.0)
            .unwrap();
        // solid disc: I = m r^2 / 2
        assert!((body.inverse_moment_of_inertia() - 1.0 / 8.0).abs() < 1e-9);

        let body = RigidBody::new(Shape::Polygon(ConvexPolygon::rect(2.0, 4.0)), m::Vec2::zero())
            .with_mass(3.0)
            .unwrap();
        // rectangle: I = m (w^2 + h^2) / 12
        assert!((body.inverse_moment_of_inertia() - 1.0 / 5.0).abs() < 1e-9);

        assert!(matches!(
            RigidBody::new_circle(m::Vec2::zero(), 1.0).with_mass(0.0),
            Err(PhysicsError::NonPositiveMass(_))
        ));
    }

    #[test]
    fn rotated_bounds_enclose_vertices() {
        let mut body =
            RigidBody::new(Shape::Polygon(ConvexPolygon::rect(4.0, 2.0)), m::Vec2::zero());
        body.rotate_by(std::f64::consts::FRAC_PI_4);
        let bounds = *body.bounds();
        for v in body.world_vertices().unwrap() {
            assert!(v.x.abs() <= bounds.hw + 1e-9);
            assert!(v.y.abs() <= bounds.hh + 1e-9);
        }
        assert!((bounds.hw - 3.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn integrate_applies_forces_once() {
        let mut body = RigidBody::new_circle(m::Vec2::zero(), 1.0)
            .with_mass(2.0)
            .unwrap();
        body.add_force(m::Vec2::new(4.0, 0.0));
        assert!(body.integrate(0.5, 0.5).unwrap());
        assert_eq!(body.velocity().linear, m::Vec2::new(1.0, 0.0));
        assert_eq!(body.center(), m::Vec2::new(0.5, 0.0));
        // force was cleared, velocity stays
        body.integrate(0.5, 0.5).unwrap();
        assert_eq!(body.velocity().linear, m::Vec2::new(1.0, 0.0));

        assert_eq!(
            body.integrate(-0.1, 0.5),
            Err(PhysicsError::NegativeTimeStep(-0.1))
        );
    }

    #[test]
    fn still_body_falls_asleep() {
        let mut body = RigidBody::new_circle(m::Vec2::zero(), 1.0).with_can_sleep(true);
        for _ in 0..20 {
            body.integrate(0.1, 0.5).unwrap();
        }
        assert!(body.is_awake());
        for _ in 0..30 {
            body.integrate(0.1, 0.5).unwrap();
        }
        assert!(!body.is_awake());
        body.add_force(m::Vec2::unit_y());
        assert!(body.is_awake());
    }
}
