use super::body::{BodyId, RigidBody};
use crate::{config::SolverParams, math as m};

/// An intersection between two bodies, found by narrow phase
/// and consumed by a single resolve.
#[derive(Clone, Copy, Debug)]
pub struct Contact {
    pub bodies: [BodyId; 2],
    /// The normal, facing away from the first body.
    pub normal: m::Unit<m::Vec2>,
    /// Point of contact in world space.
    pub point: m::Vec2,
    /// Linear penetration depth, positive when overlapping.
    pub depth: f64,
    pub restitution: f64,
}

impl Contact {
    pub(crate) fn new(
        a: &RigidBody,
        b: &RigidBody,
        normal: m::Unit<m::Vec2>,
        point: m::Vec2,
        depth: f64,
    ) -> Self {
        Contact {
            bodies: [a.id(), b.id()],
            normal,
            point,
            depth,
            // average of the two coefficients
            restitution: (a.restitution() + b.restitution()) / 2.0,
        }
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Swap the roles of the two bodies.
    pub(crate) fn flipped(self) -> Self {
        Contact {
            bodies: [self.bodies[1], self.bodies[0]],
            normal: -self.normal,
            ..self
        }
    }

    /// Relative velocity of the second body with respect to the first, along the normal.
    /// Positive means the bodies are moving apart.
    pub fn velocity_along_normal(&self, a: &RigidBody, b: &RigidBody) -> f64 {
        (b.velocity().linear - a.velocity().linear).dot(*self.normal)
    }

    /// Whether a tracked contact can be forgotten:
    /// the bodies are separating and their centers are not close.
    pub fn can_remove(&self, a: &RigidBody, b: &RigidBody, params: &SolverParams) -> bool {
        self.velocity_along_normal(a, b) > 0.0
            && (b.center() - a.center()).mag() > params.removal_distance
    }

    /// Apply an impulse to separate the bodies' velocities,
    /// then push them out of each other.
    pub fn resolve(&self, a: &mut RigidBody, b: &mut RigidBody, params: &SolverParams) {
        self.resolve_velocity(a, b, params);
        self.resolve_penetration(a, b);
    }

    fn resolve_velocity(&self, a: &mut RigidBody, b: &mut RigidBody, params: &SolverParams) {
        let vn = self.velocity_along_normal(a, b);
        if vn > 0.0 {
            return;
        }
        let inv_mass_a = a.inverse_mass();
        let inv_mass_b = b.inverse_mass();
        let inv_mass_sum = inv_mass_a + inv_mass_b;
        if inv_mass_sum <= 0.0 {
            return;
        }

        let j = -(1.0 + self.restitution) * vn / inv_mass_sum;
        let impulse = *self.normal * j;

        for (body, body_impulse, inv_mass) in [
            (a, -impulse, inv_mass_a),
            (b, impulse, inv_mass_b),
        ] {
            if inv_mass == 0.0 {
                continue;
            }
            let mut linear = body.velocity.linear + body_impulse * inv_mass;
            if linear.mag_sq() < params.rest_velocity_sq {
                linear = m::Vec2::zero();
            }
            body.velocity.linear = linear;

            let arm = self.point - body.center();
            let torque = m::cross(arm, body_impulse);
            let mut d_angular = torque
                * body.inverse_moment_of_inertia()
                * params.angular_response
                * inv_mass;
            if d_angular.abs() < params.torque_epsilon {
                d_angular = 0.0;
            }
            body.velocity.angular += d_angular;
            body.wake();
        }
    }

    fn resolve_penetration(&self, a: &mut RigidBody, b: &mut RigidBody) {
        if self.depth <= 0.0 {
            return;
        }
        let inv_mass_a = a.inverse_mass();
        let inv_mass_b = b.inverse_mass();
        let inv_mass_sum = inv_mass_a + inv_mass_b;
        if inv_mass_sum <= 0.0 {
            return;
        }
        let push = *self.normal * (self.depth / inv_mass_sum);
        if inv_mass_a > 0.0 {
            a.set_center(a.center() - push * inv_mass_a);
        }
        if inv_mass_b > 0.0 {
            b.set_center(b.center() + push * inv_mass_b);
        }
    }
}
