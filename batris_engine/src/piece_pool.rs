//! Spawn-shape drawing for a battle.

use rand::{rngs::StdRng, Rng};

use crate::piece::Shape;

/// The set of shapes an opponent lets the player spawn.
///
/// Opponents either restrict the catalog to a subset or force every spawn to a
/// single shape; a forced shape wins over the pool.
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PiecePool {
    shapes: Vec<Shape>,
    forced: Option<Shape>,
}

impl PiecePool {
    /// The standard seven-shape pool.
    pub fn classic() -> Self {
        Self::restricted(Shape::CLASSIC.to_vec())
    }

    /// A pool limited to `shapes`.
    pub fn restricted(shapes: Vec<Shape>) -> Self {
        assert!(!shapes.is_empty(), "empty shape pool");
        PiecePool {
            shapes,
            forced: None,
        }
    }

    /// Mandatory single-shape mode: every draw yields `shape`.
    pub fn single(shape: Shape) -> Self {
        PiecePool {
            shapes: vec![shape],
            forced: Some(shape),
        }
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn forced(&self) -> Option<Shape> {
        self.forced
    }

    /// Draws the next spawn shape, uniformly over the pool.
    pub fn draw(&self, rng: &mut StdRng) -> Shape {
        if let Some(shape) = self.forced {
            return shape;
        }
        self.shapes[rng.gen_range(0..self.shapes.len())]
    }
}

impl Default for PiecePool {
    fn default() -> Self {
        Self::classic()
    }
}
