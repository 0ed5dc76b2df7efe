//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// Bodies store their position and orientation angle separately
/// and build a Pose when transforming points between body and world space.
pub type Pose = uv::DIsometry2;
pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// An angle in either degrees or radians.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    #[inline]
    fn from(ang: Angle) -> Rotor2 {
        Rotor2::from_angle(ang.rad())
    }
}
impl From<Rotor2> for Angle {
    #[inline]
    fn from(rotor: Rotor2) -> Self {
        Angle::Rad(-rotor.bv.xy.atan2(rotor.s) * 2.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    pub fn new_normalize(v: Vec2) -> Self {
        Unit(v.normalized())
    }

    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }

    #[inline]
    pub fn into_inner(self) -> Vec2 {
        self.0
    }
}

impl std::ops::Mul<Unit<Vec2>> for Rotor2 {
    type Output = Unit<Vec2>;

    fn mul(self, rhs: Unit<Vec2>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

/// An axis-aligned rectangle given by its minimum and maximum corners.
///
/// The y axis is not assumed to point anywhere in particular,
/// but quadrant names in the partition treat smaller y as "top"
/// to match screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct AABB {
    pub min: Vec2,
    pub max: Vec2,
}

impl AABB {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        AABB {
            min: Vec2::new(x, y),
            max: Vec2::new(x + width, y + height),
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        midpoint(self.min, self.max)
    }

    /// Half-open point test: the minimum edges are inside, the maximum edges are not.
    /// This way a point on a shared edge belongs to exactly one of two adjacent rects.
    #[inline]
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    /// Closed test for a point including all four edges.
    #[inline]
    pub fn encloses_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Split into four equal quadrants in the order
    /// top-left, top-right, bottom-left, bottom-right.
    pub fn quadrants(&self) -> [AABB; 4] {
        let mid = self.center();
        [
            AABB {
                min: self.min,
                max: mid,
            },
            AABB {
                min: Vec2::new(mid.x, self.min.y),
                max: Vec2::new(self.max.x, mid.y),
            },
            AABB {
                min: Vec2::new(self.min.x, mid.y),
                max: Vec2::new(mid.x, self.max.y),
            },
            AABB {
                min: mid,
                max: self.max,
            },
        ]
    }
}

// Vec2 utils

/// Rotate a vector by 90 degrees counterclockwise.
#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
/// Rotate a vector by 270 degrees counterclockwise.
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// The z component of the 3D cross product of two vectors in the xy plane.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.wedge(b).xy
}

#[inline]
pub fn midpoint(a: Vec2, b: Vec2) -> Vec2 {
    (a + b) * 0.5
}

/// Rotate a vector counterclockwise by an angle in radians.
#[inline]
pub fn rotate(v: Vec2, angle: f64) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// The closest point to `p` on the segment from `a` to `b`.
pub fn project_onto_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let edge = b - a;
    let len_sq = edge.mag_sq();
    if len_sq == 0.0 {
        return a;
    }
    let t = (edge.dot(p - a) / len_sq).clamp(0.0, 1.0);
    a + edge * t
}

#[inline]
pub fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    (p - project_onto_segment(p, a, b)).mag()
}

/// Sign of a number that, unlike `f64::signum`, is zero for zero.
#[inline]
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

// pose utils

/// Build a pose from a position and an orientation angle in radians.
#[inline]
pub fn pose(position: Vec2, orientation: f64) -> Pose {
    Pose::new(position, Rotor2::from_angle(orientation))
}

/// Transform a point given in the body space of `pose` into world space.
#[inline]
pub fn to_world(pose: &Pose, p: Vec2) -> Vec2 {
    pose.rotation * p + pose.translation
}

/// Transform a world space point into the body space of `pose`.
#[inline]
pub fn to_body(pose: &Pose, p: Vec2) -> Vec2 {
    pose.rotation.reversed() * (p - pose.translation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Vec2, b: Vec2) -> bool {
        (a - b).mag() < 1e-9
    }

    #[test]
    fn rotor_and_angle_agree() {
        let v = Vec2::new(1.0, 0.0);
        let angle = PI / 3.0;
        assert!(approx_eq(Rotor2::from_angle(angle) * v, rotate(v, angle)));
        assert!((Angle::from(Rotor2::from_angle(angle)).rad() - angle).abs() < 1e-9);
    }

    #[test]
    fn segment_projection_clamps() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert!(approx_eq(
            project_onto_segment(Vec2::new(3.0, 4.0), a, b),
            Vec2::new(3.0, 0.0)
        ));
        assert!(approx_eq(
            project_onto_segment(Vec2::new(-3.0, 4.0), a, b),
            a
        ));
        assert!((distance_to_segment(Vec2::new(13.0, 4.0), a, b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn pose_round_trip() {
        let p = pose(Vec2::new(5.0, -2.0), 0.7);
        let local = Vec2::new(1.5, 3.0);
        assert!(approx_eq(to_body(&p, to_world(&p, local)), local));
    }

    #[test]
    fn half_open_containment() {
        let rects = AABB::new(0.0, 0.0, 100.0, 100.0).quadrants();
        let on_edge = Vec2::new(50.0, 20.0);
        let owners = rects.iter().filter(|r| r.contains_point(on_edge)).count();
        assert_eq!(owners, 1);
        assert!(rects[1].contains_point(on_edge));
    }
}
