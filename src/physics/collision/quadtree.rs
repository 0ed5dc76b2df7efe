//! A region quadtree used both to prune collision checks
//! and to split the world between workers.
//!
//! Each body lives in the smallest node whose rectangle fully contains it.
//! Bodies that straddle the children of a node stay in that node,
//! so a query only needs to look at a node and its ancestors.

use crate::{
    math::{Vec2, AABB},
    physics::body::{BodyId, RigidBody, Shape},
};

use std::collections::HashMap;

/// Quadrants of a node in the order their children are stored.
/// "Top" means smaller y.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quadrant {
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

impl Quadrant {
    /// The quadrant of `rect` that a point falls into.
    /// Points exactly on a midline count as left or top.
    pub fn of(rect: &AABB, point: Vec2) -> Self {
        let mid = rect.center();
        match (point.x <= mid.x, point.y <= mid.y) {
            (true, true) => Quadrant::TopLeft,
            (false, true) => Quadrant::TopRight,
            (true, false) => Quadrant::BottomLeft,
            (false, false) => Quadrant::BottomRight,
        }
    }
}

/// Where a body ended up after [`QuadTree::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Stored in a node at the given depth.
    Node { depth: usize },
    /// The tree's root can't contain the body,
    /// so it belongs to whoever owns the parent of this tree.
    Escalated,
}

/// A node as seen by a debug renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayNode {
    pub rect: AABB,
    pub depth: usize,
    pub member_count: usize,
}

#[derive(Clone, Debug)]
struct Node {
    rect: AABB,
    depth: usize,
    parent: Option<usize>,
    children: Option<[usize; 4]>,
    members: Vec<BodyId>,
}

/// A depth-bounded quadtree over a fixed rectangle.
///
/// The shape of the tree never changes after construction,
/// only the membership of its nodes.
#[derive(Clone, Debug)]
pub struct QuadTree {
    nodes: Vec<Node>,
    /// Node that each body is currently a member of.
    locations: HashMap<BodyId, usize>,
    escalate: bool,
}

impl QuadTree {
    /// Create a tree covering the whole world.
    /// Bodies its root can't contain are stored in the root anyway.
    pub fn new(bounds: AABB, max_depth: usize) -> Self {
        Self::build(bounds, 0, max_depth, false)
    }

    /// Create a tree covering one region of the world, rooted at `depth`.
    /// Bodies its root can't contain are rejected with [`Placement::Escalated`].
    pub fn subtree(bounds: AABB, depth: usize, max_depth: usize) -> Self {
        Self::build(bounds, depth, max_depth, true)
    }

    fn build(bounds: AABB, depth: usize, max_depth: usize, escalate: bool) -> Self {
        let mut tree = QuadTree {
            nodes: vec![Node {
                rect: bounds,
                depth,
                parent: None,
                children: None,
                members: Vec::new(),
            }],
            locations: HashMap::new(),
            escalate,
        };

        // breadth-first so that siblings are next to each other
        let mut next = 0;
        while next < tree.nodes.len() {
            let (rect, depth) = (tree.nodes[next].rect, tree.nodes[next].depth);
            if depth < max_depth {
                let child_depth = depth + 1;
                let first_child = tree.nodes.len();
                for rect in rect.quadrants() {
                    tree.nodes.push(Node {
                        rect,
                        depth: child_depth,
                        parent: Some(next),
                        children: None,
                        members: Vec::new(),
                    });
                }
                tree.nodes[next].children = Some([
                    first_child,
                    first_child + 1,
                    first_child + 2,
                    first_child + 3,
                ]);
            }
            next += 1;
        }

        tree
    }

    #[inline]
    pub fn bounds(&self) -> AABB {
        self.nodes[0].rect
    }

    /// Depth of the root of this tree.
    #[inline]
    pub fn depth(&self) -> usize {
        self.nodes[0].depth
    }

    /// Number of bodies in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    #[inline]
    pub fn contains_id(&self, id: BodyId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Index of the node a body is a member of.
    #[inline]
    pub fn node_of(&self, id: BodyId) -> Option<usize> {
        self.locations.get(&id).copied()
    }

    /// Direct members of a node.
    pub fn members(&self, node: usize) -> &[BodyId] {
        &self.nodes[node].members
    }

    /// Whether a node's rectangle fully encloses the exact geometry of a body.
    pub fn contains(&self, node: usize, body: &RigidBody) -> bool {
        encloses(&self.nodes[node].rect, body)
    }

    /// Insert a body into the smallest node that fully contains it
    /// and record the resulting depth on the body.
    ///
    /// A body that is already in the tree is moved.
    pub fn insert(&mut self, body: &mut RigidBody) -> Placement {
        self.remove(body.id());

        if !self.contains(0, body) && self.escalate {
            return Placement::Escalated;
        }

        let mut node_idx = 0;
        while let Some(children) = self.nodes[node_idx].children {
            let quadrant = Quadrant::of(&self.nodes[node_idx].rect, body.center());
            let child = children[quadrant as usize];
            if !self.contains(child, body) {
                break;
            }
            node_idx = child;
        }

        let node = &mut self.nodes[node_idx];
        node.members.push(body.id());
        self.locations.insert(body.id(), node_idx);
        body.depth = node.depth;
        Placement::Node { depth: node.depth }
    }

    /// Remove a body from whichever node it's in.
    ///
    /// Works even if the body has moved since it was inserted.
    /// Returns false if the body wasn't in the tree.
    pub fn remove(&mut self, id: BodyId) -> bool {
        match self.locations.remove(&id) {
            Some(node_idx) => {
                let members = &mut self.nodes[node_idx].members;
                if let Some(pos) = members.iter().position(|m| *m == id) {
                    members.swap_remove(pos);
                }
                true
            }
            None => false,
        }
    }

    /// Every body that could possibly overlap the given one,
    /// i.e. members of its node and all of that node's ancestors.
    ///
    /// Empty if the body isn't in the tree.
    pub fn retrieve_candidates(&self, body: &RigidBody) -> Vec<BodyId> {
        let mut candidates = Vec::new();
        let mut curr = self.node_of(body.id());
        while let Some(node_idx) = curr {
            let node = &self.nodes[node_idx];
            candidates.extend(node.members.iter().filter(|id| **id != body.id()));
            curr = node.parent;
        }
        candidates
    }

    /// Remove all bodies, keeping the shape of the tree.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.members.clear();
        }
        self.locations.clear();
    }

    /// A node is a leaf if it has no children
    /// or all of its children are empty leaves.
    pub fn is_leaf(&self, node: usize) -> bool {
        match self.nodes[node].children {
            None => true,
            Some(children) => children
                .iter()
                .all(|c| self.nodes[*c].members.is_empty() && self.is_leaf(*c)),
        }
    }

    /// Nodes worth drawing in a debug view,
    /// without descending into empty subtrees.
    pub fn overlay(&self) -> Vec<OverlayNode> {
        let mut out = Vec::new();
        let mut stack = vec![0];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            out.push(OverlayNode {
                rect: node.rect,
                depth: node.depth,
                member_count: node.members.len(),
            });
            if let (false, Some(children)) = (self.is_leaf(node_idx), node.children) {
                stack.extend(children.iter().rev());
            }
        }
        out
    }
}

/// Exact containment test with closed bounds.
pub fn encloses(rect: &AABB, body: &RigidBody) -> bool {
    match body.shape() {
        Shape::Circle { r } => {
            let c = body.center();
            c.x - r >= rect.min.x
                && c.x + r <= rect.max.x
                && c.y - r >= rect.min.y
                && c.y + r <= rect.max.y
        }
        Shape::Polygon(poly) => poly
            .world_vertices(&body.pose())
            .iter()
            .all(|v| rect.encloses_point(*v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::ConvexPolygon;
    use rand::{Rng, SeedableRng};

    fn circle(id: u64, x: f64, y: f64, r: f64) -> RigidBody {
        let mut body = RigidBody::new_circle(Vec2::new(x, y), r);
        body.id = BodyId(id);
        body
    }

    fn world() -> AABB {
        AABB::new(0.0, 0.0, 1000.0, 1000.0)
    }

    #[test]
    fn bodies_go_to_smallest_containing_node() {
        let mut tree = QuadTree::new(world(), 2);
        let mut small = circle(0, 100.0, 100.0, 10.0);
        assert_eq!(tree.insert(&mut small), Placement::Node { depth: 2 });
        assert_eq!(small.depth(), 2);

        // straddles the vertical midline at depth 2 but not at depth 1
        let mut mid = circle(1, 250.0, 100.0, 10.0);
        assert_eq!(tree.insert(&mut mid), Placement::Node { depth: 1 });

        // straddles the center of the world
        let mut center = circle(2, 500.0, 500.0, 1.0);
        assert_eq!(tree.insert(&mut center), Placement::Node { depth: 0 });

        // pokes out of the world entirely, root trees keep it anyway
        let mut outside = circle(3, 2.0, 500.0, 5.0);
        assert_eq!(tree.insert(&mut outside), Placement::Node { depth: 0 });

        assert_eq!(tree.len(), 4);
        let candidates = tree.retrieve_candidates(&small);
        assert!(!candidates.contains(&small.id()));
        itertools::assert_equal(
            {
                let mut c = candidates.clone();
                c.sort();
                c
            },
            vec![BodyId(1), BodyId(2), BodyId(3)],
        );
        // nothing at depth 1 or 2 is an ancestor of the root
        itertools::assert_equal(
            {
                let mut c = tree.retrieve_candidates(&center);
                c.sort();
                c
            },
            vec![BodyId(3)],
        );
    }

    #[test]
    fn polygon_containment_uses_vertices() {
        let tree = QuadTree::new(world(), 2);
        let mut square = RigidBody::new(
            Shape::Polygon(ConvexPolygon::rect(20.0, 20.0)),
            Vec2::new(489.0, 100.0),
        );
        square.id = BodyId(0);
        // node 0 is the root, node 1 the top left quadrant
        assert!(tree.contains(1, &square));
        // rotating pushes a corner across x = 500
        square.set_orientation(std::f64::consts::FRAC_PI_4);
        assert!(!tree.contains(1, &square));
    }

    #[test]
    fn subtree_escalates_straddling_bodies() {
        let region = AABB::new(0.0, 0.0, 500.0, 500.0);
        let mut tree = QuadTree::subtree(region, 1, 2);
        let mut straddler = circle(0, 495.0, 100.0, 10.0);
        assert_eq!(tree.insert(&mut straddler), Placement::Escalated);
        assert!(!tree.contains_id(straddler.id()));
        assert!(tree.retrieve_candidates(&straddler).is_empty());

        let mut inside = circle(1, 100.0, 100.0, 10.0);
        assert_eq!(tree.insert(&mut inside), Placement::Node { depth: 2 });
    }

    #[test]
    fn insert_remove_insert_is_idempotent() {
        let mut tree = QuadTree::new(world(), 2);
        let mut other = circle(0, 700.0, 300.0, 5.0);
        tree.insert(&mut other);
        let mut body = circle(1, 260.0, 240.0, 20.0);

        let first = tree.insert(&mut body);
        let node = tree.node_of(body.id()).unwrap();
        let members = tree.members(node).to_vec();

        assert!(tree.remove(body.id()));
        assert!(!tree.contains_id(body.id()));
        assert!(!tree.remove(body.id()));

        assert_eq!(tree.insert(&mut body), first);
        assert_eq!(tree.node_of(body.id()), Some(node));
        assert_eq!(tree.members(node), &members[..]);

        // inserting again without removing doesn't duplicate
        tree.insert(&mut body);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.members(node), &members[..]);
    }

    #[test]
    fn moved_body_can_be_removed() {
        let mut tree = QuadTree::new(world(), 2);
        let mut body = circle(0, 100.0, 100.0, 5.0);
        tree.insert(&mut body);
        body.set_center(Vec2::new(900.0, 900.0));
        assert!(tree.remove(body.id()));
        assert!(tree.is_empty());
    }

    #[test]
    fn no_false_negatives() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        let mut tree = QuadTree::new(world(), 3);
        let mut bodies: Vec<RigidBody> = (0..300)
            .map(|i| {
                circle(
                    i,
                    rng.gen_range(0.0..1000.0),
                    rng.gen_range(0.0..1000.0),
                    rng.gen_range(1.0..40.0),
                )
            })
            .collect();
        for body in &mut bodies {
            tree.insert(body);
        }

        let radius = |b: &RigidBody| match b.shape() {
            Shape::Circle { r } => *r,
            Shape::Polygon(_) => unreachable!(),
        };
        let mut overlapping_pairs = 0;
        for (i, a) in bodies.iter().enumerate() {
            let a_candidates = tree.retrieve_candidates(a);
            for b in &bodies[i + 1..] {
                let overlap = (b.center() - a.center()).mag() < radius(a) + radius(b);
                if overlap {
                    overlapping_pairs += 1;
                    let found = a_candidates.contains(&b.id())
                        || tree.retrieve_candidates(b).contains(&a.id());
                    assert!(found, "Missed overlap between {} and {}", a.id(), b.id());
                }
            }
        }
        assert!(overlapping_pairs > 0);
    }

    #[test]
    fn clear_and_lazy_leaves() {
        let mut tree = QuadTree::new(world(), 2);
        // all children empty, the root is drawn alone
        assert!(tree.is_leaf(0));
        assert_eq!(tree.overlay().len(), 1);

        let mut body = circle(0, 100.0, 100.0, 5.0);
        tree.insert(&mut body);
        assert!(!tree.is_leaf(0));
        let overlay = tree.overlay();
        // root, its four children, and the four grandchildren under the top left one
        assert_eq!(overlay.len(), 9);
        assert_eq!(overlay.iter().map(|n| n.member_count).sum::<usize>(), 1);
        assert!(overlay.iter().any(|n| n.depth == 2 && n.member_count == 1));

        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.is_leaf(0));
        assert_eq!(tree.bounds(), world());
    }
}
