use std::{
    collections::{HashMap, VecDeque},
    io::{self, Write},
};

use crossterm::{
    cursor::{MoveTo, MoveToNextLine},
    style::{self, Color, Print, SetForegroundColor},
    terminal, QueueableCommand,
};

use batris_engine::{Battle, BlockId, Feedback, FeedbackEvents, Gauge, Piece, Shape, CELL};

const MESSAGE_LINES: usize = 8;
/// Columns the self-scroll offset may push the board sideways on screen.
const MAX_SCROLL_COLS: isize = 8;

/// Position and look of one locked visual block, tracked purely through the
/// engine's add/move/remove notifications - the handle itself stays opaque.
#[derive(Clone, Copy, Debug)]
struct VisualBlock {
    row: usize,
    col: usize,
    shape: Shape,
}

/// Text renderer for one battle.
#[derive(Clone, Default, Debug)]
pub struct BattleRenderer {
    blocks: HashMap<BlockId, VisualBlock>,
    messages: VecDeque<String>,
}

impl BattleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything; call when a battle restarts.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.messages.clear();
    }

    /// Feeds one tick's feedback into the block bookkeeping and message log.
    pub fn absorb(&mut self, events: &FeedbackEvents) {
        for (_, feedback) in events {
            match feedback {
                Feedback::BlockAdded {
                    block,
                    shape,
                    row,
                    col,
                } => {
                    self.blocks.insert(
                        *block,
                        VisualBlock {
                            row: *row,
                            col: *col,
                            shape: *shape,
                        },
                    );
                }
                Feedback::BlockMoved { block, row, col } => {
                    if let Some(visual) = self.blocks.get_mut(block) {
                        visual.row = *row;
                        visual.col = *col;
                    }
                }
                Feedback::BlockRemoved { block } => {
                    self.blocks.remove(block);
                }
                Feedback::RowsCleared { count, points } => {
                    self.push_message(format!("{count} row(s) cleared, +{points}"));
                }
                Feedback::DamageTick { amount } => {
                    self.push_message(format!("took {amount} damage"));
                }
                Feedback::LevelUp { level } => {
                    self.push_message(format!("level {level}"));
                }
                Feedback::Message(text) => self.push_message(text.clone()),
                Feedback::GaugeChanged { .. } | Feedback::PieceSpawned { .. } => {}
            }
        }
    }

    pub fn render<T>(
        &mut self,
        term: &mut T,
        battle: &Battle,
        opponent_name: &str,
    ) -> io::Result<()>
    where
        T: Write,
    {
        let state = battle.state();
        let grid = &state.grid;
        let (width, height) = (grid.width(), grid.height());

        let mut board = vec![vec!["  "; width]; height];
        for visual in self.blocks.values() {
            if visual.row < height && visual.col < width {
                board[visual.row][visual.col] = glyph(visual.shape);
            }
        }
        if let Some(piece) = &state.current {
            for (row, col) in project(piece, grid) {
                board[row][col] = glyph(piece.shape());
            }
        }

        let indent_cols = ((state.scroll_x / CELL) as isize).clamp(-MAX_SCROLL_COLS, MAX_SCROLL_COLS);
        let indent = " ".repeat((MAX_SCROLL_COLS + indent_cols) as usize);

        term.queue(MoveTo(0, 0))?
            .queue(terminal::Clear(terminal::ClearType::FromCursorDown))?;
        term.queue(Print(format!("=== {opponent_name} ===")))?
            .queue(MoveToNextLine(1))?;
        term.queue(Print(format!(
            "ENEMY {}",
            gauge_bar(state.enemy_hp.current(), Gauge::max(&state.enemy_hp))
        )))?
        .queue(MoveToNextLine(1))?;
        term.queue(Print(format!(
            "YOU   {}",
            gauge_bar(state.player_hp.current(), Gauge::max(&state.player_hp))
        )))?
        .queue(MoveToNextLine(2))?;

        term.queue(Print(format!("{indent}+{}+", "-".repeat(width * 2))))?
            .queue(MoveToNextLine(1))?;
        for line in &board {
            term.queue(Print(format!("{indent}|{}|", line.concat())))?
                .queue(MoveToNextLine(1))?;
        }
        term.queue(Print(format!("{indent}+{}+", "-".repeat(width * 2))))?
            .queue(MoveToNextLine(1))?;

        term.queue(Print(format!(
            "score {:>5}  level {:>2}  total {:>6}  next ",
            state.score, state.level, state.total_score
        )))?;
        match &state.next {
            Some(piece) => {
                let rgb = piece.shape().color();
                term.queue(SetForegroundColor(Color::Rgb {
                    r: (rgb >> 16) as u8,
                    g: (rgb >> 8) as u8,
                    b: rgb as u8,
                }))?
                .queue(Print(format!("{:?}", piece.shape())))?
                .queue(style::ResetColor)?;
            }
            None => {
                term.queue(Print("-"))?;
            }
        }
        term.queue(MoveToNextLine(1))?;
        term.queue(Print(format!(
            "tilt {:+.2}  reel {:+.2}",
            state.tilt.angle(),
            state.reel.angle()
        )))?
        .queue(MoveToNextLine(2))?;

        for message in self.messages.iter().take(MESSAGE_LINES) {
            term.queue(Print(message))?.queue(MoveToNextLine(1))?;
        }
        term.flush()?;
        Ok(())
    }

    fn push_message(&mut self, message: String) {
        self.messages.push_front(message);
        self.messages.truncate(MESSAGE_LINES);
    }
}

/// Grid cells covered by the falling piece, for drawing only.
fn project(piece: &Piece, grid: &batris_engine::Grid) -> Vec<(usize, usize)> {
    let start_col = (piece.left_x() / CELL + grid.width() as f64 / 2.0).round() as isize;
    let start_row =
        (grid.height() as f64 / 2.0 - (piece.top_y() / CELL).floor()).max(0.0) as isize;
    piece
        .filled()
        .filter_map(|(r, c)| {
            let row = start_row + r as isize;
            let col = start_col + c as isize;
            (row >= 0 && (row as usize) < grid.height() && col >= 0 && (col as usize) < grid.width())
                .then(|| (row as usize, col as usize))
        })
        .collect()
}

fn gauge_bar(current: u32, max: u32) -> String {
    let filled = if max == 0 {
        0
    } else {
        (current as usize * 20) / max as usize
    };
    format!(
        "[{}{}] {current} / {max}",
        "#".repeat(filled),
        "-".repeat(20 - filled)
    )
}

fn glyph(shape: Shape) -> &'static str {
    match shape {
        Shape::I => "II",
        Shape::J => "JJ",
        Shape::L => "LL",
        Shape::O => "OO",
        Shape::S => "SS",
        Shape::T => "TT",
        Shape::Z => "ZZ",
        Shape::Dot => "@@",
        Shape::Plus => "++",
        Shape::Ring => "()",
        Shape::Duo => "&&",
    }
}
