/*!
The occupancy grid: collision projection, piece locking, and row clearing.

The grid is a fixed `height x width` matrix of cells centered on the world
origin; row 0 is the topmost row. Cells hold an opaque [`BlockId`] handle whose
only purpose is render bookkeeping (adding, moving and removing visual blocks)
- the handle carries no game meaning.
*/

use std::num::NonZeroU32;

use crate::piece::Piece;
use crate::{Feedback, FeedbackEvents, GameTime, CELL, MAX_SPEED};

/// Opaque handle of one locked visual block.
pub type BlockId = NonZeroU32;

/// Points awarded for clearing `cleared` rows at once: 10/25/40/55 for 1-4.
pub fn line_points(cleared: usize) -> u32 {
    if cleared == 0 {
        return 0;
    }
    (10 * cleared + 5 * (cleared - 1)) as u32
}

/// Level reached at `score` points.
pub fn level_for(score: u32) -> u32 {
    score / 100 + 1
}

/// Fall speed at `level`, in world units per tick, capped at [`MAX_SPEED`].
pub fn speed_for(level: u32) -> f64 {
    f64::from(level).min(MAX_SPEED)
}

#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Grid {
    width: usize,
    height: usize,
    /// `[row][col]`, row 0 on top.
    pub(crate) cells: Vec<Vec<Option<BlockId>>>,
    next_block_id: BlockId,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "degenerate grid {width}x{height}");
        Grid {
            width,
            height,
            cells: vec![vec![None; width]; height],
            next_block_id: BlockId::MIN,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// World-space y of the top edge.
    pub fn top_y(&self) -> f64 {
        self.height as f64 / 2.0 * CELL
    }

    /// World-space y of the bottom edge (the floor pieces rest on).
    pub fn bottom_y(&self) -> f64 {
        -self.top_y()
    }

    pub fn width_units(&self) -> f64 {
        self.width as f64 * CELL
    }

    pub fn height_units(&self) -> f64 {
        self.height as f64 * CELL
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<BlockId> {
        self.cells[row][col]
    }

    pub fn row_empty(&self, row: usize) -> bool {
        self.cells[row].iter().all(Option::is_none)
    }

    pub fn row_full(&self, row: usize) -> bool {
        self.cells[row].iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        (0..self.height).all(|row| self.row_empty(row))
    }

    /// Whether `piece`, shifted down by `dy` and left by `dx` world units,
    /// would overlap an occupied cell.
    ///
    /// Projected rows are clamped to the last row, so cells that compute to
    /// above row 0 are folded down rather than separately checked: collision
    /// never guards the top boundary. Cells projecting outside the column
    /// range read as empty; the side walls are the callers' job (movement
    /// checks the border before probing, rotation clamps afterwards).
    /// Both quirks are preserved verbatim from the original game - loss
    /// timing and wall-adjacent rotations depend on them.
    pub fn detect_collision(&self, piece: &Piece, dy: f64, dx: f64) -> bool {
        let top_y = piece.top_y() - dy;
        let left_x = piece.left_x() - dx;
        let start_col = (left_x / CELL + self.width as f64 / 2.0).round() as isize;
        let start_row = (self.height as f64 / 2.0 - (top_y / CELL).floor()).max(0.0) as usize;
        piece.filled().any(|(r, c)| {
            let row = (start_row + r).min(self.height - 1);
            let col = start_col + c as isize;
            if col < 0 || col as usize >= self.width {
                return false;
            }
            self.cells[row][col as usize].is_some()
        })
    }

    /// Commits `piece` into the grid with its bottom edge at `set_bottom_y`,
    /// then clears any completed rows. Returns the number of rows cleared.
    ///
    /// Cells that would land above the grid are dropped silently, and cells
    /// whose destination is already occupied are skipped - both deliberate
    /// guards, not errors. Columns must already be in range; movement and
    /// rotation clamping keep them there.
    pub fn occupy(
        &mut self,
        piece: &Piece,
        set_bottom_y: f64,
        now: GameTime,
        feedback: &mut FeedbackEvents,
    ) -> usize {
        let mut resting = piece.clone();
        resting.set_bottom_y(set_bottom_y);
        let start_col = (resting.left_x() / CELL + self.width as f64 / 2.0).round() as isize;
        let start_row = (self.height as f64 / 2.0 - resting.top_y() / CELL).round() as isize;
        for (r, c) in resting.filled() {
            let row = start_row + r as isize;
            if row < 0 {
                continue;
            }
            let row = (row as usize).min(self.height - 1);
            let col = start_col + c as isize;
            debug_assert!(
                col >= 0 && (col as usize) < self.width,
                "locked cell outside column range: {col}"
            );
            let col = col as usize;
            if self.cells[row][col].is_some() {
                continue;
            }
            let block = self.alloc_block();
            self.cells[row][col] = Some(block);
            feedback.push((
                now,
                Feedback::BlockAdded {
                    block,
                    shape: resting.shape(),
                    row,
                    col,
                },
            ));
        }
        self.clear_full_rows(now, feedback)
    }

    /// Removes every full row, collapsing all rows above it down by one, and
    /// returns how many rows went. A collapse re-checks the same scan position
    /// before moving upward, so stacked full rows all clear in one pass.
    pub fn clear_full_rows(&mut self, now: GameTime, feedback: &mut FeedbackEvents) -> usize {
        let mut cleared = 0;
        let mut y = self.height;
        while y > 0 {
            let row = y - 1;
            if !self.row_full(row) {
                y -= 1;
                continue;
            }
            cleared += 1;
            for cell in self.cells[row].iter_mut() {
                if let Some(block) = cell.take() {
                    feedback.push((now, Feedback::BlockRemoved { block }));
                }
            }
            for dy in (1..=row).rev() {
                for x in 0..self.width {
                    if let Some(block) = self.cells[dy - 1][x].take() {
                        self.cells[dy][x] = Some(block);
                        feedback.push((
                            now,
                            Feedback::BlockMoved {
                                block,
                                row: dy,
                                col: x,
                            },
                        ));
                    }
                }
            }
        }
        cleared
    }

    fn alloc_block(&mut self) -> BlockId {
        let block = self.next_block_id;
        self.next_block_id = block.checked_add(1).expect("block id space exhausted");
        block
    }
}
