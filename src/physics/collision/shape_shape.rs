//! Exact intersection tests between pairs of body shapes.

use crate::math::{self as m, Unit};
use crate::physics::{
    body::{ConvexPolygon, RigidBody, Shape, Support},
    Contact,
};

use itertools::Itertools;

/// Checks two bodies for intersection.
///
/// The resulting contact's normal points from `a` toward `b`.
pub fn detect(a: &RigidBody, b: &RigidBody) -> Option<Contact> {
    if a.inverse_mass() == 0.0 && b.inverse_mass() == 0.0 {
        return None;
    }
    if !a.bounds().overlaps(a.center(), b.bounds(), b.center()) {
        return None;
    }

    use Shape::*;
    match (a.shape(), b.shape()) {
        (Circle { r: r1 }, Circle { r: r2 }) => circle_circle(a, *r1, b, *r2),
        (Circle { r }, Polygon(poly)) => circle_polygon(a, *r, b, poly),
        (Polygon(poly), Circle { r }) => circle_polygon(b, *r, a, poly).map(Contact::flipped),
        (Polygon(poly1), Polygon(poly2)) => polygon_polygon(a, poly1, b, poly2),
    }
}

//
// CIRCLE <-> CIRCLE
//

fn circle_circle(a: &RigidBody, r1: f64, b: &RigidBody, r2: f64) -> Option<Contact> {
    let dist = b.center() - a.center();
    let dist_sq = dist.mag_sq();
    let r_sum = r1 + r2;
    if dist_sq >= r_sum * r_sum {
        return None;
    }

    let normal = if dist_sq == 0.0 {
        // same position, consider penetration to be on x axis
        Unit::unit_x()
    } else {
        Unit::new_normalize(dist)
    };
    let depth = r_sum - dist_sq.sqrt();

    Some(Contact::new(
        a,
        b,
        normal,
        a.center() + *normal * r1,
        depth,
    ))
}

//
// CIRCLE <-> POLYGON
//

fn circle_polygon(
    circle: &RigidBody,
    r: f64,
    poly_body: &RigidBody,
    poly: &ConvexPolygon,
) -> Option<Contact> {
    let center = circle.center();
    let pose = poly_body.pose();
    let verts = poly.world_vertices(&pose);

    let mut inside = true;
    let mut closest: Option<(f64, usize)> = None;
    for (i, (v0, v1)) in verts.iter().circular_tuple_windows().enumerate() {
        let normal = pose.rotation * poly.normals()[i];
        if (center - *v0).dot(*normal) > 0.0 {
            inside = false;
        }
        let dist = m::distance_to_segment(center, *v0, *v1);
        if closest.map_or(true, |(min_dist, _)| dist < min_dist) {
            closest = Some((dist, i));
        }
    }
    let (_, edge) = closest?;
    let v0 = verts[edge];
    let v1 = verts[(edge + 1) % verts.len()];

    // normal from the circle into the polygon
    let normal = -(pose.rotation * poly.normals()[edge]);
    let point = m::project_onto_segment(center - *normal * r, v0, v1);
    let dist = (center - point).mag();

    let depth = if inside {
        r + dist
    } else if dist <= r {
        r - dist
    } else {
        return None;
    };

    Some(Contact::new(circle, poly_body, normal, point, depth))
}

//
// POLYGON <-> POLYGON
//

/// Which edge of which polygon some result was found on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EdgeOf {
    A(usize),
    B(usize),
}

/// Result of the support point scan between two polygons.
#[derive(Clone, Copy, Debug)]
pub(crate) enum PolygonSeparation {
    /// The polygons are disjoint along the normal of this edge.
    /// The scan stops at the first such edge.
    Separated(EdgeOf),
    /// No edge strictly separates the polygons but they don't overlap either.
    Touching,
    Penetrating {
        reference: EdgeOf,
        normal: Unit<m::Vec2>,
        point: m::Vec2,
        depth: f64,
    },
}

struct PolygonInWorld<'a> {
    poly: &'a ConvexPolygon,
    pose: m::Pose,
    verts: Vec<m::Vec2>,
}

impl<'a> PolygonInWorld<'a> {
    fn new(body: &RigidBody, poly: &'a ConvexPolygon) -> Self {
        let pose = body.pose();
        Self {
            poly,
            verts: poly.world_vertices(&pose),
            pose,
        }
    }

    fn edge(&self, i: usize) -> (m::Vec2, m::Vec2, Unit<m::Vec2>) {
        (
            self.verts[i],
            self.verts[(i + 1) % self.verts.len()],
            self.pose.rotation * self.poly.normals()[i],
        )
    }

    /// World-space support vertices minimizing the dot product with a world-space direction.
    fn support(&self, dir: m::Vec2) -> Support {
        self.poly.support(self.pose.rotation.reversed() * dir)
    }
}

struct Deepest {
    separation: f64,
    reference: EdgeOf,
    normal: Unit<m::Vec2>,
    point: m::Vec2,
}

/// Scan the edges of `reference` against the support vertices of `incident`.
///
/// Returns the separating edge on early exit.
fn scan_edges(
    reference: &PolygonInWorld,
    incident: &PolygonInWorld,
    edge_of: fn(usize) -> EdgeOf,
    flip_normal: bool,
    deepest: &mut Option<Deepest>,
) -> Option<EdgeOf> {
    for i in 0..reference.verts.len() {
        let (v0, v1, normal) = reference.edge(i);
        let support = incident.support(*normal);
        let indices = match support {
            Support::One(s) => [Some(s), None],
            Support::Two(s1, s2) => [Some(s1), Some(s2)],
        };

        for s in indices.iter().flatten() {
            let sv = incident.verts[*s];
            // support vertex relative to the edge, i.e. a Minkowski face of the difference
            let mfp0 = sv - v0;
            let mfp1 = sv - v1;
            let face_dist = mfp0.dot(*normal);
            let projection = m::project_onto_segment(m::Vec2::zero(), mfp0, mfp1);
            let separation = projection.mag() * m::sign(face_dist);

            if deepest
                .as_ref()
                .map_or(true, |d| separation > d.separation)
            {
                let support_point = match support {
                    Support::One(_) => sv,
                    Support::Two(s1, s2) => {
                        m::midpoint(incident.verts[s1], incident.verts[s2])
                    }
                };
                *deepest = Some(Deepest {
                    separation,
                    reference: edge_of(i),
                    normal: if flip_normal { -normal } else { normal },
                    point: m::project_onto_segment(support_point, v0, v1),
                });
            }

            if separation > 0.0 {
                return Some(edge_of(i));
            }
        }
    }
    None
}

/// Find the axis of least penetration between two polygons,
/// or the first edge that separates them.
pub(crate) fn polygon_separation(
    a: &RigidBody,
    poly_a: &ConvexPolygon,
    b: &RigidBody,
    poly_b: &ConvexPolygon,
) -> PolygonSeparation {
    let world_a = PolygonInWorld::new(a, poly_a);
    let world_b = PolygonInWorld::new(b, poly_b);

    let mut deepest = None;
    if let Some(edge) = scan_edges(&world_a, &world_b, EdgeOf::A, false, &mut deepest) {
        return PolygonSeparation::Separated(edge);
    }
    // normals of b point toward a, flip them to keep the a -> b convention
    if let Some(edge) = scan_edges(&world_b, &world_a, EdgeOf::B, true, &mut deepest) {
        return PolygonSeparation::Separated(edge);
    }

    match deepest {
        Some(d) if d.separation < 0.0 => PolygonSeparation::Penetrating {
            reference: d.reference,
            normal: d.normal,
            point: d.point,
            depth: -d.separation,
        },
        _ => PolygonSeparation::Touching,
    }
}

fn polygon_polygon(
    a: &RigidBody,
    poly_a: &ConvexPolygon,
    b: &RigidBody,
    poly_b: &ConvexPolygon,
) -> Option<Contact> {
    match polygon_separation(a, poly_a, b, poly_b) {
        PolygonSeparation::Penetrating {
            normal,
            point,
            depth,
            ..
        } => Some(Contact::new(a, b, normal, point, depth)),
        PolygonSeparation::Separated(_) | PolygonSeparation::Touching => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::BodyId;

    fn with_id(mut body: RigidBody, id: u64) -> RigidBody {
        body.id = BodyId(id);
        body
    }

    fn square(x: f64, y: f64, half_extent: f64, id: u64) -> RigidBody {
        let side = half_extent * 2.0;
        with_id(
            RigidBody::new(
                Shape::Polygon(ConvexPolygon::rect(side, side)),
                m::Vec2::new(x, y),
            ),
            id,
        )
    }

    fn as_polygon(body: &RigidBody) -> &ConvexPolygon {
        match body.shape() {
            Shape::Polygon(poly) => poly,
            Shape::Circle { .. } => panic!("Expected a polygon"),
        }
    }

    #[test]
    fn circle_circle_penetration() {
        let a = with_id(RigidBody::new_circle(m::Vec2::zero(), 5.0), 0);
        let b = with_id(RigidBody::new_circle(m::Vec2::new(8.0, 0.0), 5.0), 1);
        let contact = detect(&a, &b).expect("Circles should overlap");
        assert!((contact.depth - 2.0).abs() < 1e-9);
        assert_eq!(*contact.normal, m::Vec2::new(1.0, 0.0));
        assert_eq!(contact.point, m::Vec2::new(5.0, 0.0));
        assert_eq!(contact.bodies, [BodyId(0), BodyId(1)]);

        // sum of radii, not sum of squares: these overlap by 1
        let c = with_id(RigidBody::new_circle(m::Vec2::new(0.0, 9.0), 5.0), 2);
        let contact = detect(&a, &c).unwrap();
        assert!((contact.depth - 1.0).abs() < 1e-9);

        let far = with_id(RigidBody::new_circle(m::Vec2::new(10.0, 0.0), 5.0), 3);
        assert!(detect(&a, &far).is_none());
    }

    #[test]
    fn coincident_circles_push_along_x() {
        let a = with_id(RigidBody::new_circle(m::Vec2::zero(), 2.0), 0);
        let b = with_id(RigidBody::new_circle(m::Vec2::zero(), 3.0), 1);
        let contact = detect(&a, &b).unwrap();
        assert_eq!(contact.normal, Unit::unit_x());
        assert_eq!(contact.depth, 5.0);
    }

    #[test]
    fn separating_axis_exits_early() {
        let a = square(0.0, 0.0, 5.0, 0);
        let b = square(20.0, 0.0, 5.0, 1);
        match polygon_separation(&a, as_polygon(&a), &b, as_polygon(&b)) {
            // the right-hand edge is the second one and proves separation
            PolygonSeparation::Separated(edge) => assert_eq!(edge, EdgeOf::A(1)),
            other => panic!("Expected separation, got {:?}", other),
        }
        assert!(detect(&a, &b).is_none());
    }

    #[test]
    fn overlapping_squares() {
        let a = square(0.0, 0.0, 5.0, 0);
        let b = square(8.0, 0.0, 5.0, 1);
        let contact = detect(&a, &b).expect("Squares should overlap");
        assert!((contact.depth - 2.0).abs() < 1e-9);
        assert!((*contact.normal - m::Vec2::unit_x()).mag() < 1e-9);
        // face to face, so the midpoint of the tied support vertices clamped to a's edge
        assert!((contact.point - m::Vec2::new(5.0, 0.0)).mag() < 1e-9);

        // b on the left of a: the normal still points from a to b
        let c = square(-8.0, 1.0, 5.0, 2);
        let contact = detect(&a, &c).unwrap();
        assert!(contact.normal.x < -0.99);
    }

    #[test]
    fn immovable_pair_is_ignored() {
        let a = square(0.0, 0.0, 5.0, 0).with_infinite_mass();
        let b = square(1.0, 1.0, 5.0, 1).with_infinite_mass();
        assert!(detect(&a, &b).is_none());

        let c = square(1.0, 1.0, 5.0, 2);
        assert!(detect(&a, &c).is_some());
    }

    #[test]
    fn circle_against_polygon() {
        let poly = square(0.0, 0.0, 5.0, 0);
        let circle = with_id(RigidBody::new_circle(m::Vec2::new(7.0, 0.0), 3.0), 1);

        let contact = detect(&circle, &poly).expect("Circle should touch the square");
        assert_eq!(contact.bodies, [BodyId(1), BodyId(0)]);
        assert!((*contact.normal - m::Vec2::new(-1.0, 0.0)).mag() < 1e-9);
        assert!((contact.depth - 1.0).abs() < 1e-9);
        assert!((contact.point - m::Vec2::new(5.0, 0.0)).mag() < 1e-9);

        let flipped = detect(&poly, &circle).unwrap();
        assert_eq!(flipped.bodies, [BodyId(0), BodyId(1)]);
        assert!((*flipped.normal - m::Vec2::new(1.0, 0.0)).mag() < 1e-9);
        assert_eq!(flipped.depth, contact.depth);

        // center inside the polygon
        let deep = with_id(RigidBody::new_circle(m::Vec2::new(4.0, 0.0), 2.0), 2);
        let contact = detect(&deep, &poly).unwrap();
        assert!((contact.depth - 3.0).abs() < 1e-9);

        // near the corner but outside the circle's reach
        let corner = with_id(RigidBody::new_circle(m::Vec2::new(7.5, 7.5), 3.0), 3);
        assert!(detect(&corner, &poly).is_none());
    }

    #[test]
    fn rotated_polygon_overlap() {
        let a = square(0.0, 0.0, 5.0, 0);
        let diamond = square(11.0, 0.0, 5.0, 1).with_orientation(m::Angle::Deg(45.0));
        let contact = detect(&a, &diamond).expect("Diamond tip should poke into the square");
        // tip at 11 - 5 * sqrt(2) reaches past the edge at 5
        let expected = 5.0 - (11.0 - 5.0 * 2f64.sqrt());
        assert!((contact.depth - expected).abs() < 1e-6);
        assert!(contact.normal.x > 0.99);
    }
}
