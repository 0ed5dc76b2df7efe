use super::RigidBody;
use crate::math::Vec2;

/// A (possibly) state-dependent force that is applied to every rigid body
/// by its worker before each integration step.
pub trait ForceField {
    fn force_on(&self, body: &RigidBody) -> Vec2;
}

pub struct NoneField;
impl ForceField for NoneField {
    fn force_on(&self, _: &RigidBody) -> Vec2 {
        Vec2::zero()
    }
}

/// A combination of two different force fields.
pub struct Sum<F1: ForceField, F2: ForceField>(pub F1, pub F2);
impl<F1: ForceField, F2: ForceField> ForceField for Sum<F1, F2> {
    fn force_on(&self, body: &RigidBody) -> Vec2 {
        self.0.force_on(body) + self.1.force_on(body)
    }
}

/// Constant gravitational acceleration over all of space.
/// Immovable bodies are not affected.
pub struct Gravity(pub Vec2);
impl ForceField for Gravity {
    fn force_on(&self, body: &RigidBody) -> Vec2 {
        match body.mass() {
            super::body::Mass::Finite { mass, .. } => self.0 * mass,
            super::body::Mass::Infinite => Vec2::zero(),
        }
    }
}

/// Linear drag opposing a body's velocity.
pub struct Drag {
    pub coefficient: f64,
}
impl ForceField for Drag {
    fn force_on(&self, body: &RigidBody) -> Vec2 {
        body.velocity().linear * -self.coefficient
    }
}

/// Gravity that pulls towards a specific point in space.
///
/// With a negative `strength` value this can also be a repulsive force.
pub struct PointGravity {
    /// The position of the gravity source.
    pub position: Vec2,
    /// The strength of gravity at the source.
    pub strength: f64,
    /// How quickly gravity falls off with distance.
    pub falloff: f64,
}
impl ForceField for PointGravity {
    fn force_on(&self, body: &RigidBody) -> Vec2 {
        let dist = self.position - body.center();
        if dist.mag_sq() == 0.0 {
            return Vec2::zero();
        }
        // + 1.0 so that the divisor is 1 at the source
        let strength = self.strength / ((dist.mag_sq() + 1.0) * self.falloff);
        let mass = match body.mass() {
            super::body::Mass::Finite { mass, .. } => mass,
            super::body::Mass::Infinite => 0.0,
        };
        dist.normalized() * strength * mass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_scales_with_mass() {
        let body = RigidBody::new_circle(Vec2::zero(), 1.0)
            .with_mass(3.0)
            .unwrap()
            .with_velocity(Vec2::new(2.0, 0.0));
        let field = Sum(Gravity(Vec2::new(0.0, 10.0)), Drag { coefficient: 0.5 });
        assert_eq!(field.force_on(&body), Vec2::new(-1.0, 30.0));

        let wall = RigidBody::new_circle(Vec2::zero(), 1.0).with_infinite_mass();
        assert_eq!(Gravity(Vec2::new(0.0, 10.0)).force_on(&wall), Vec2::zero());
    }

    #[test]
    fn point_gravity_pulls_inward() {
        let body = RigidBody::new_circle(Vec2::new(3.0, 0.0), 1.0);
        let field = PointGravity {
            position: Vec2::zero(),
            strength: 10.0,
            falloff: 1.0,
        };
        let force = field.force_on(&body);
        assert!(force.x < 0.0);
        assert_eq!(force.y, 0.0);
        assert_eq!(NoneField.force_on(&body), Vec2::zero());
    }
}
