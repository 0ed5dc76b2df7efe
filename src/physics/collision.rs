pub mod quadtree;
pub use quadtree::{Placement, QuadTree};

pub mod shape_shape;
pub use shape_shape::detect;
