/*!
Core engine for a battle falling-block game.

One [`Battle`] pits the player against a single opponent: clearing rows drains
the enemy gauge, while the opponent's damage policy drains the player's. The
battle is a closed, single-threaded simulation driven by an external per-frame
caller: [`Battle::update`] takes the current battle clock and a snapshot of the
held buttons, performs exactly one tick of physics, and returns the feedback
events (block changes, gauge changes, messages) produced by that tick.

Opponents customize a battle through [`OpponentRules`]: restricted or forced
spawn shapes, self-scrolling, randomized movement drift, forced damage ticks,
and the cosmetic tilt/reel board oscillators.
*/

mod gauge;
mod grid;
mod piece;
mod piece_pool;

use std::{ops, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};

pub use gauge::{Gauge, Side};
pub use grid::{level_for, line_points, speed_for, BlockId, Grid};
pub use piece::{Piece, Shape};
pub use piece_pool::PiecePool;

/// Side length of one grid cell in world units.
pub const CELL: f64 = 40.0;
/// Fastest fall per tick, half a cell; also the soft-drop speed.
pub const MAX_SPEED: f64 = CELL / 2.0;
/// Minimum delay between two lateral shifts of the current piece.
pub const MOVE_INTERVAL: GameTime = Duration::from_millis(100);
/// Every how many spawns the passive damage policy fires.
pub const DAMAGE_SPAWN_PERIOD: u32 = 4;
/// Damage rolled per passive damage tick.
pub const DAMAGE_RANGE: ops::RangeInclusive<u32> = 2..=6;
/// Minimum delay between two forced damage ticks under rapid-damage rules.
pub const RAPID_DAMAGE_INTERVAL: GameTime = Duration::from_millis(1200);
/// Gap between the grid's right wall and the preview piece.
const PREVIEW_MARGIN: f64 = CELL;

const DRIFT_CHANCE: f64 = 0.2;
const TILT_BURST_CHANCE: f64 = 0.01;
const TILT_BURST_MAX: f64 = 0.05;
const TILT_STEP: f64 = 0.004;
const TILT_LIMIT: f64 = 0.26;
const REEL_STEP: f64 = 0.003;
const REEL_LIMIT: f64 = 0.18;

/// Battle clock, injected by the driver on every update.
pub type GameTime = Duration;
/// Everything externally observable that a tick produced.
pub type FeedbackEvents = Vec<(GameTime, Feedback)>;
/// Held-state snapshot of the four game buttons, indexed by [`Button`].
pub type ButtonsPressed = [bool; 4];

#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Button {
    MoveLeft,
    MoveRight,
    Rotate,
    SoftDrop,
}

impl<T> ops::Index<Button> for [T; 4] {
    type Output = T;

    fn index(&self, idx: Button) -> &Self::Output {
        match idx {
            Button::MoveLeft => &self[0],
            Button::MoveRight => &self[1],
            Button::Rotate => &self[2],
            Button::SoftDrop => &self[3],
        }
    }
}

impl<T> ops::IndexMut<Button> for [T; 4] {
    fn index_mut(&mut self, idx: Button) -> &mut Self::Output {
        match idx {
            Button::MoveLeft => &mut self[0],
            Button::MoveRight => &mut self[1],
            Button::Rotate => &mut self[2],
            Button::SoftDrop => &mut self[3],
        }
    }
}

/// How a lost battle ended.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GameOver {
    /// Spawning was blocked by an occupied top row.
    TopOut,
    /// The player gauge ran dry.
    Drained,
    Forfeit,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum UpdateError {
    TimeRanBackwards,
}

/// One externally observable change, timestamped with the battle clock.
#[derive(Eq, PartialEq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Feedback {
    BlockAdded {
        block: BlockId,
        shape: Shape,
        row: usize,
        col: usize,
    },
    BlockMoved {
        block: BlockId,
        row: usize,
        col: usize,
    },
    BlockRemoved {
        block: BlockId,
    },
    RowsCleared {
        count: usize,
        points: u32,
    },
    GaugeChanged {
        side: Side,
        current: u32,
        max: u32,
    },
    LevelUp {
        level: u32,
    },
    PieceSpawned {
        shape: Shape,
        next: Shape,
    },
    DamageTick {
        amount: u32,
    },
    Message(String),
}

/// Initial swing direction of a board oscillator.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpinDir {
    Left,
    Right,
}

/// A bounded triangle-wave angle for the cosmetic board tilt/reel.
///
/// Sustained oscillators swing between `-limit` and `limit` forever; an
/// unsustained one sits level but can be jolted (drift opponents' random tilt
/// bursts) and then fades back to zero.
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Oscillator {
    sustained: bool,
    angle: f64,
    step: f64,
    limit: f64,
}

impl Oscillator {
    fn new(dir: Option<SpinDir>, step: f64, limit: f64) -> Self {
        let step = match dir {
            Some(SpinDir::Left) => -step,
            _ => step,
        };
        Oscillator {
            sustained: dir.is_some(),
            angle: 0.0,
            step,
            limit,
        }
    }

    /// Current angle in radians.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Which way the wave is currently swinging.
    pub fn direction(&self) -> SpinDir {
        if self.step < 0.0 {
            SpinDir::Left
        } else {
            SpinDir::Right
        }
    }

    fn advance(&mut self) {
        if self.sustained {
            self.angle += self.step;
            if self.angle.abs() >= self.limit {
                self.angle = self.angle.clamp(-self.limit, self.limit);
                self.step = -self.step;
            }
        } else if self.angle != 0.0 {
            let fade = self.step.abs();
            self.angle = if self.angle.abs() <= fade {
                0.0
            } else {
                self.angle - fade * self.angle.signum()
            };
        }
    }

    fn jolt(&mut self, amount: f64) {
        self.angle = (self.angle + amount).clamp(-self.limit, self.limit);
    }
}

/// Configuration an opponent applies to a battle at its start.
///
/// Nothing here mutates mid-battle; the oscillators these flags enable are the
/// only moving parts.
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpponentRules {
    /// Restricted or single-shape spawn pool.
    pub pool: PiecePool,
    /// Board slides opposite to lateral shifts, as if the piece stayed put.
    pub self_scroll: bool,
    /// Lateral shifts randomly invert, and the board takes random tilt bursts.
    pub drift: bool,
    /// Forced fixed-interval damage instead of the spawn-count policy.
    pub rapid_damage: bool,
    /// Sustained board tilt from battle start.
    pub tilt: Option<SpinDir>,
    /// Sustained board reel from battle start.
    pub reel: Option<SpinDir>,
    /// Both gauges start at this maximum.
    pub gauge_max: u32,
    pub grid_width: usize,
    pub grid_height: usize,
}

impl Default for OpponentRules {
    fn default() -> Self {
        OpponentRules {
            pool: PiecePool::classic(),
            self_scroll: false,
            drift: false,
            rapid_damage: false,
            tilt: None,
            reel: None,
            gauge_max: 100,
            grid_width: 10,
            grid_height: 16,
        }
    }
}

/// The whole mutable state of one battle. Recreated by [`Battle::reset`].
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BattleState {
    pub time: GameTime,
    /// `Some(Ok(()))` is victory, `Some(Err(_))` defeat; terminal until reset.
    pub end: Option<Result<(), GameOver>>,
    pub buttons_pressed: ButtonsPressed,
    pub grid: Grid,
    pub current: Option<Piece>,
    /// Pre-spawned preview piece, positioned beside the grid.
    pub next: Option<Piece>,
    pub score: u32,
    /// Cumulative score across battles; survives [`Battle::reset`].
    pub total_score: u32,
    pub level: u32,
    pub speed: f64,
    pub soft_dropping: bool,
    pub spawn_count: u32,
    pub last_move: GameTime,
    pub last_damage: GameTime,
    /// Cosmetic board offset accumulated by self-scrolling.
    pub scroll_x: f64,
    pub tilt: Oscillator,
    pub reel: Oscillator,
    pub player_hp: Gauge,
    pub enemy_hp: Gauge,
}

/// One battle against one opponent.
pub struct Battle {
    rules: OpponentRules,
    state: BattleState,
    rng: StdRng,
}

impl std::fmt::Debug for Battle {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Battle")
            .field("rules", &self.rules)
            .field("state", &self.state)
            .field("rng", &std::any::type_name_of_val(&self.rng))
            .finish()
    }
}

impl Battle {
    pub fn new(rules: OpponentRules) -> Self {
        Self::with_rng(rules, StdRng::from_entropy())
    }

    /// A battle with a deterministic piece/drift/damage sequence.
    pub fn with_seed(rules: OpponentRules, seed: u64) -> Self {
        Self::with_rng(rules, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rules: OpponentRules, rng: StdRng) -> Self {
        let state = Self::fresh_state(&rules);
        Battle { rules, state, rng }
    }

    fn fresh_state(rules: &OpponentRules) -> BattleState {
        BattleState {
            time: Duration::ZERO,
            end: None,
            buttons_pressed: ButtonsPressed::default(),
            grid: Grid::new(rules.grid_width, rules.grid_height),
            current: None,
            next: None,
            score: 0,
            total_score: 0,
            level: 1,
            speed: speed_for(1),
            soft_dropping: false,
            spawn_count: 0,
            last_move: Duration::ZERO,
            last_damage: Duration::ZERO,
            scroll_x: 0.0,
            tilt: Oscillator::new(rules.tilt, TILT_STEP, TILT_LIMIT),
            reel: Oscillator::new(rules.reel, REEL_STEP, REEL_LIMIT),
            player_hp: Gauge::new(rules.gauge_max),
            enemy_hp: Gauge::new(rules.gauge_max),
        }
    }

    pub fn rules(&self) -> &OpponentRules {
        &self.rules
    }

    pub fn state(&self) -> &BattleState {
        &self.state
    }

    pub fn ended(&self) -> bool {
        self.state.end.is_some()
    }

    pub fn forfeit(&mut self) {
        self.state.end = Some(Err(GameOver::Forfeit));
    }

    /// Reinitializes every piece of battle state for the next attempt or the
    /// next opponent; only the cumulative score carries over.
    pub fn reset(&mut self) {
        let total_score = self.state.total_score;
        self.state = Self::fresh_state(&self.rules);
        self.state.total_score = total_score;
    }

    /// Runs one tick at battle clock `now`.
    ///
    /// `buttons` replaces the held-button snapshot; `None` keeps the previous
    /// one. Rotation fires on the press edge and is applied immediately; the
    /// other buttons are held state consumed by the tick. After the battle has
    /// ended only the cosmetic oscillators keep moving.
    pub fn update(
        &mut self,
        buttons: Option<ButtonsPressed>,
        now: GameTime,
    ) -> Result<FeedbackEvents, UpdateError> {
        if now < self.state.time {
            return Err(UpdateError::TimeRanBackwards);
        }
        self.state.time = now;
        let mut feedback = Vec::new();

        self.state.tilt.advance();
        self.state.reel.advance();
        if self.state.end.is_some() {
            return Ok(feedback);
        }
        if self.rules.drift && self.rng.gen_bool(TILT_BURST_CHANCE) {
            let burst = self.rng.gen_range(-TILT_BURST_MAX..=TILT_BURST_MAX);
            self.state.tilt.jolt(burst);
        }

        if let Some(next) = buttons {
            let prev = self.state.buttons_pressed;
            self.state.buttons_pressed = next;
            if !prev[Button::Rotate] && next[Button::Rotate] {
                self.try_rotate_current();
            }
            if prev[Button::SoftDrop] != next[Button::SoftDrop] {
                self.state.soft_dropping = next[Button::SoftDrop];
            }
        }

        if self.state.current.is_some() {
            self.step_current(now, &mut feedback);
        } else {
            self.spawn_step(now, &mut feedback);
        }
        Ok(feedback)
    }

    /// Lateral movement, then gravity, then possibly locking. Locking leaves
    /// `current` empty; the following tick runs the spawn step.
    fn step_current(&mut self, now: GameTime, feedback: &mut FeedbackEvents) {
        let left = self.state.buttons_pressed[Button::MoveLeft];
        let right = self.state.buttons_pressed[Button::MoveRight];
        if left != right && now.saturating_sub(self.state.last_move) >= MOVE_INTERVAL {
            let mut dir: i8 = if left { -1 } else { 1 };
            if self.rules.drift && self.rng.gen_bool(DRIFT_CHANCE) {
                dir = -dir;
            }
            self.shift_current(dir);
            self.state.last_move = now;
        }

        let speed = if self.state.soft_dropping {
            MAX_SPEED
        } else {
            self.state.speed
        };
        let Some(mut piece) = self.state.current.take() else {
            return;
        };
        let next_bottom = piece.bottom_y() - speed;
        let floor = self.state.grid.bottom_y();
        let resting = if next_bottom <= floor {
            Some(floor)
        } else if self.state.grid.detect_collision(&piece, speed, 0.0) {
            Some((next_bottom / CELL).round() * CELL)
        } else {
            None
        };
        match resting {
            Some(bottom) => {
                let cleared = self.state.grid.occupy(&piece, bottom, now, feedback);
                self.state.soft_dropping = false;
                self.apply_clears(cleared, now, feedback);
            }
            None => {
                piece.y -= speed;
                self.state.current = Some(piece);
            }
        }
    }

    /// Shifts the current piece one cell unless a wall or the stack is in the
    /// way. Self-scrolling boards slide the other way so the piece appears to
    /// stay centered.
    fn shift_current(&mut self, dir: i8) {
        let BattleState {
            grid,
            current,
            scroll_x,
            ..
        } = &mut self.state;
        let Some(piece) = current.as_mut() else {
            return;
        };
        let half = grid.width_units() / 2.0;
        let (no_border, probe_dx) = if dir < 0 {
            (piece.left_x() > -half, CELL)
        } else {
            (piece.right_x() < half, -CELL)
        };
        if no_border && !grid.detect_collision(piece, 0.0, probe_dx) {
            piece.x += f64::from(dir) * CELL;
            if self.rules.self_scroll {
                *scroll_x -= f64::from(dir) * CELL;
            }
        }
    }

    /// Two-phase rotation: validate the turned matrix at the current position,
    /// then commit (left edge anchored) and nudge back inside the side walls.
    /// A rejected turn leaves matrix and position untouched.
    fn try_rotate_current(&mut self) -> bool {
        let BattleState { grid, current, .. } = &mut self.state;
        let Some(piece) = current.as_mut() else {
            return false;
        };
        let candidate = piece.rotation_candidate();
        if grid.detect_collision(&piece.with_matrix(candidate.clone()), 0.0, 0.0) {
            return false;
        }
        piece.commit_rotation(candidate);
        let half = grid.width_units() / 2.0;
        if piece.right_x() > half {
            piece.x = half - piece.width() / 2.0;
        }
        if piece.left_x() < -half {
            piece.x = -half + piece.width() / 2.0;
        }
        true
    }

    /// Loss checks, the passive damage policy, then promotion of the preview
    /// piece to current.
    fn spawn_step(&mut self, now: GameTime, feedback: &mut FeedbackEvents) {
        // A blocked top row is the defined loss condition, not an error.
        if !self.state.grid.row_empty(0) {
            self.finish(Err(GameOver::TopOut), now, feedback);
            return;
        }
        if self.damage_due(now) {
            let amount = self.rng.gen_range(DAMAGE_RANGE);
            self.state.last_damage = now;
            self.state.player_hp.decrease(amount);
            feedback.push((now, Feedback::DamageTick { amount }));
            self.push_gauge(Side::Player, now, feedback);
            if self.state.player_hp.is_dead() {
                self.finish(Err(GameOver::Drained), now, feedback);
                return;
            }
        }
        // The very first spawn of a battle has no preview yet and draws both.
        let mut piece = self
            .state
            .next
            .take()
            .unwrap_or_else(|| Piece::new(self.rules.pool.draw(&mut self.rng)));
        self.place_at_spawn(&mut piece);
        let mut preview = Piece::new(self.rules.pool.draw(&mut self.rng));
        self.place_at_preview(&mut preview);
        feedback.push((
            now,
            Feedback::PieceSpawned {
                shape: piece.shape(),
                next: preview.shape(),
            },
        ));
        self.state.current = Some(piece);
        self.state.next = Some(preview);
        self.state.soft_dropping = false;
        self.state.spawn_count += 1;
    }

    fn damage_due(&self, now: GameTime) -> bool {
        if self.rules.rapid_damage {
            now.saturating_sub(self.state.last_damage) >= RAPID_DAMAGE_INTERVAL
        } else {
            (self.state.spawn_count + 1) % DAMAGE_SPAWN_PERIOD == 0
        }
    }

    fn apply_clears(&mut self, cleared: usize, now: GameTime, feedback: &mut FeedbackEvents) {
        if cleared == 0 {
            return;
        }
        let points = line_points(cleared);
        self.state.score += points;
        self.state.total_score += points;
        feedback.push((
            now,
            Feedback::RowsCleared {
                count: cleared,
                points,
            },
        ));
        self.state.enemy_hp.decrease(points);
        self.push_gauge(Side::Enemy, now, feedback);
        let level = level_for(self.state.score);
        if level != self.state.level {
            self.state.level = level;
            self.state.speed = speed_for(level);
            feedback.push((now, Feedback::LevelUp { level }));
        }
        if self.state.enemy_hp.is_dead() {
            self.finish(Ok(()), now, feedback);
        }
    }

    fn finish(&mut self, outcome: Result<(), GameOver>, now: GameTime, feedback: &mut FeedbackEvents) {
        if self.state.end.is_some() {
            return;
        }
        self.state.end = Some(outcome);
        let note = match outcome {
            Ok(()) => "enemy gauge emptied",
            Err(GameOver::TopOut) => "the stack reached the top",
            Err(GameOver::Drained) => "player gauge emptied",
            Err(GameOver::Forfeit) => "battle forfeited",
        };
        feedback.push((now, Feedback::Message(note.to_string())));
    }

    fn push_gauge(&self, side: Side, now: GameTime, feedback: &mut FeedbackEvents) {
        let gauge = match side {
            Side::Player => &self.state.player_hp,
            Side::Enemy => &self.state.enemy_hp,
        };
        feedback.push((
            now,
            Feedback::GaugeChanged {
                side,
                current: gauge.current(),
                max: gauge.max(),
            },
        ));
    }

    fn place_at_spawn(&self, piece: &mut Piece) {
        let grid = &self.state.grid;
        piece.x = ((grid.width_units() - piece.width()) / 2.0) % CELL;
        piece.y = grid.top_y() - piece.height() / 2.0;
    }

    fn place_at_preview(&self, piece: &mut Piece) {
        let grid = &self.state.grid;
        piece.x = grid.width_units() / 2.0 + PREVIEW_MARGIN + piece.width() / 2.0;
        piece.y = grid.top_y() - piece.height() / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(t: u64) -> GameTime {
        Duration::from_millis(t)
    }

    fn battle_of(shape: Shape) -> Battle {
        let rules = OpponentRules {
            pool: PiecePool::single(shape),
            ..OpponentRules::default()
        };
        Battle::with_seed(rules, 7)
    }

    fn tick(battle: &mut Battle, t: &mut u64) -> FeedbackEvents {
        *t += 1;
        battle.update(None, ms(*t)).unwrap()
    }

    /// Parks the current piece one unit above the floor so the next tick locks
    /// it there.
    fn park_current(battle: &mut Battle) {
        let floor = battle.state.grid.bottom_y();
        battle
            .state
            .current
            .as_mut()
            .expect("no current piece to park")
            .set_bottom_y(floor + 1.0);
    }

    #[test]
    fn first_update_spawns_current_and_preview() {
        let mut battle = battle_of(Shape::O);
        let events = battle.update(None, ms(1)).unwrap();
        assert!(battle.state.current.is_some());
        assert!(battle.state.next.is_some());
        assert_eq!(battle.state.spawn_count, 1);
        assert!(events
            .iter()
            .any(|(_, f)| matches!(f, Feedback::PieceSpawned { shape: Shape::O, .. })));
        // The spawned piece hangs from the top edge, the preview beside the
        // grid.
        let current = battle.state.current.as_ref().unwrap();
        assert_eq!(current.top_y(), battle.state.grid.top_y());
        let preview = battle.state.next.as_ref().unwrap();
        assert!(preview.left_x() >= battle.state.grid.width_units() / 2.0);
    }

    #[test]
    fn o_piece_falls_to_the_bottom_row_pair() {
        let mut battle = battle_of(Shape::O);
        let mut t = 0;
        // Spawn tick, then one gravity unit per tick from bottom y=240 down
        // to the floor at -320.
        for _ in 0..561 {
            tick(&mut battle, &mut t);
        }
        assert!(battle.state.current.is_none(), "piece should have locked");
        for (row, col) in [(14, 4), (14, 5), (15, 4), (15, 5)] {
            assert!(battle.state.grid.cell(row, col).is_some(), "({row},{col})");
        }
        assert!(battle.state.end.is_none());
        // The next tick spawns the follow-up piece.
        tick(&mut battle, &mut t);
        assert_eq!(battle.state.spawn_count, 2);
    }

    #[test]
    fn soft_drop_falls_at_max_speed() {
        let mut battle = battle_of(Shape::O);
        let mut t = 0;
        tick(&mut battle, &mut t);
        let mut held = ButtonsPressed::default();
        held[Button::SoftDrop] = true;
        t += 1;
        battle.update(Some(held), ms(t)).unwrap();
        assert!(battle.state.soft_dropping);
        // 560 units at 20 per tick: locked by the 28th gravity tick.
        for _ in 0..27 {
            t += 1;
            battle.update(Some(held), ms(t)).unwrap();
        }
        assert!(battle.state.current.is_none());
        assert!(!battle.state.soft_dropping, "cleared on lock");
    }

    #[test]
    fn lateral_movement_is_rate_limited_and_stops_at_the_wall() {
        let mut battle = battle_of(Shape::O);
        let mut held = ButtonsPressed::default();
        held[Button::MoveLeft] = true;
        battle.update(Some(held), ms(1)).unwrap();
        // 100 ticks every 10ms: the limiter admits one shift per 100ms, and
        // the wall stops the piece after four cells.
        for i in 2..=100 {
            battle.update(None, ms(i * 10)).unwrap();
        }
        let piece = battle.state.current.as_ref().unwrap();
        assert_eq!(piece.left_x(), -battle.state.grid.width_units() / 2.0);
        assert_eq!(piece.x, -160.0);
    }

    #[test]
    fn two_shifts_in_a_quarter_second() {
        let mut battle = battle_of(Shape::O);
        let mut held = ButtonsPressed::default();
        held[Button::MoveLeft] = true;
        battle.update(Some(held), ms(1)).unwrap();
        for i in 1..=25 {
            battle.update(None, ms(1 + i * 10)).unwrap();
        }
        // Shifts land at the 100ms and 200ms marks only.
        let piece = battle.state.current.as_ref().unwrap();
        assert_eq!(piece.x, -80.0);
    }

    #[test]
    fn drift_inverts_some_shifts() {
        let rules = OpponentRules {
            pool: PiecePool::single(Shape::O),
            drift: true,
            ..OpponentRules::default()
        };
        let mut battle = Battle::with_seed(rules, 11);
        let mut held = ButtonsPressed::default();
        held[Button::MoveRight] = true;
        battle.update(Some(held), ms(1)).unwrap();
        let mut deltas = Vec::new();
        for i in 1..=60 {
            let before = battle.state.current.as_ref().unwrap().x;
            battle.update(None, ms(1 + i * 100)).unwrap();
            let after = battle.state.current.as_ref().unwrap().x;
            deltas.push(after - before);
        }
        assert!(deltas.iter().any(|&d| d > 0.0), "some shifts went right");
        assert!(deltas.iter().any(|&d| d < 0.0), "drift inverted none");
    }

    #[test]
    fn rotation_is_rejected_when_it_would_overlap() {
        let mut battle = battle_of(Shape::I);
        let mut t = 0;
        tick(&mut battle, &mut t);
        {
            let piece = battle.state.current.as_mut().unwrap();
            piece.set_bottom_y(-240.0);
        }
        // Upright the I would sweep rows 12-15 of column 5; block one of them.
        let obstacle = BlockId::new(900).unwrap();
        battle.state.grid.cells[14][5] = Some(obstacle);
        let before = battle.state.current.as_ref().unwrap().clone();
        assert!(!battle.try_rotate_current());
        let piece = battle.state.current.as_ref().unwrap();
        assert_eq!(piece.matrix(), before.matrix());
        assert_eq!((piece.x, piece.y), (before.x, before.y));

        // With the obstacle gone the same turn goes through, left anchored.
        battle.state.grid.cells[14][5] = None;
        assert!(battle.try_rotate_current());
        let piece = battle.state.current.as_ref().unwrap();
        assert_eq!(piece.rows(), 4);
        assert_eq!(piece.x, -20.0);
    }

    #[test]
    fn rotation_is_clamped_back_inside_the_walls() {
        let mut battle = battle_of(Shape::I);
        let mut t = 0;
        tick(&mut battle, &mut t);
        // Upright first (1 cell wide), then push against the right wall and
        // turn flat again: the 4-wide footprint must be translated inside.
        assert!(battle.try_rotate_current());
        let half = battle.state.grid.width_units() / 2.0;
        {
            let piece = battle.state.current.as_mut().unwrap();
            piece.x = half - piece.width() / 2.0;
        }
        assert!(battle.try_rotate_current());
        let piece = battle.state.current.as_ref().unwrap();
        assert!(piece.right_x() <= half);
        assert!(piece.left_x() >= -half);
        // Translated just enough to fit: the right edge sits on the wall.
        assert_eq!(piece.right_x(), half);
        assert_eq!(piece.x, 120.0);
    }

    #[test]
    fn row_clears_drain_the_enemy_gauge_and_win_exactly_once() {
        let rules = OpponentRules {
            gauge_max: 50,
            ..OpponentRules::default()
        };
        let mut battle = Battle::with_seed(rules, 7);
        let mut feedback = Vec::new();
        battle.apply_clears(2, ms(1), &mut feedback);
        assert_eq!(battle.state.score, 25);
        assert_eq!(battle.state.enemy_hp.current(), 25);
        battle.apply_clears(1, ms(2), &mut feedback);
        assert_eq!(battle.state.enemy_hp.current(), 15);
        assert!(battle.state.end.is_none());
        battle.apply_clears(2, ms(3), &mut feedback);
        assert_eq!(battle.state.end, Some(Ok(())));
        let wins = feedback
            .iter()
            .filter(|(_, f)| matches!(f, Feedback::Message(_)))
            .count();
        assert_eq!(wins, 1);
        // Terminal: further updates change nothing but the oscillators.
        let score = battle.state.score;
        let events = battle.update(None, ms(10)).unwrap();
        assert!(events.is_empty());
        assert_eq!(battle.state.score, score);
    }

    #[test]
    fn locking_an_o_into_two_prepared_rows_clears_both() {
        let rules = OpponentRules {
            pool: PiecePool::single(Shape::O),
            gauge_max: 50,
            ..OpponentRules::default()
        };
        let mut battle = Battle::with_seed(rules, 7);
        let mut t = 0;
        tick(&mut battle, &mut t);
        for row in [14, 15] {
            for col in 0..10 {
                if col == 4 || col == 5 {
                    continue;
                }
                let id = BlockId::new((row * 16 + col + 1) as u32).unwrap();
                battle.state.grid.cells[row][col] = Some(id);
            }
        }
        park_current(&mut battle);
        let events = tick(&mut battle, &mut t);
        assert_eq!(battle.state.score, 25);
        assert_eq!(battle.state.enemy_hp.current(), 25);
        assert!(battle.state.grid.is_empty());
        assert!(events
            .iter()
            .any(|(_, f)| matches!(f, Feedback::RowsCleared { count: 2, points: 25 })));
    }

    #[test]
    fn a_dot_plugging_the_last_hole_scores_ten() {
        let mut battle = battle_of(Shape::Dot);
        let mut t = 0;
        tick(&mut battle, &mut t);
        // Bottom row full except the spawn column, plus a marker above it.
        for col in 0..10 {
            if col == 5 {
                continue;
            }
            battle.state.grid.cells[15][col] = Some(BlockId::new(col as u32 + 1).unwrap());
        }
        battle.state.grid.cells[14][0] = Some(BlockId::new(64).unwrap());
        park_current(&mut battle);
        tick(&mut battle, &mut t);
        assert_eq!(battle.state.score, 10);
        assert_eq!(battle.state.enemy_hp.current(), 90);
        // The row above collapsed down by one, column alignment intact.
        assert!(battle.state.grid.cell(15, 0).is_some());
        assert!(battle.state.grid.row_empty(14));
    }

    #[test]
    fn blocked_top_row_is_the_loss_condition() {
        let mut battle = battle_of(Shape::O);
        let mut t = 0;
        tick(&mut battle, &mut t);
        battle.state.current = None;
        battle.state.grid.cells[0][3] = Some(BlockId::new(1).unwrap());
        tick(&mut battle, &mut t);
        assert_eq!(battle.state.end, Some(Err(GameOver::TopOut)));
    }

    #[test]
    fn every_fourth_spawn_rolls_passive_damage() {
        let mut battle = battle_of(Shape::Dot);
        let mut t = 0;
        for spawn in 1..=3 {
            tick(&mut battle, &mut t);
            assert_eq!(battle.state.spawn_count, spawn);
            assert_eq!(battle.state.player_hp.current(), 100);
            park_current(&mut battle);
            tick(&mut battle, &mut t);
            assert!(battle.state.current.is_none());
        }
        let events = tick(&mut battle, &mut t);
        assert_eq!(battle.state.spawn_count, 4);
        let hp = battle.state.player_hp.current();
        assert!((94..=98).contains(&hp), "rolled damage in range, hp {hp}");
        assert!(events
            .iter()
            .any(|(_, f)| matches!(f, Feedback::DamageTick { .. })));
    }

    #[test]
    fn rapid_damage_fires_on_its_interval_instead() {
        let rules = OpponentRules {
            pool: PiecePool::single(Shape::Dot),
            rapid_damage: true,
            ..OpponentRules::default()
        };
        let mut battle = Battle::with_seed(rules, 7);
        battle.update(None, ms(1)).unwrap();
        assert_eq!(battle.state.player_hp.current(), 100);
        park_current(&mut battle);
        battle.update(None, ms(2)).unwrap();
        // Second spawn arrives long before the interval: no damage.
        battle.update(None, ms(3)).unwrap();
        assert_eq!(battle.state.player_hp.current(), 100);
        park_current(&mut battle);
        battle.update(None, ms(1300)).unwrap();
        // Third spawn crosses the 1200ms mark.
        let events = battle.update(None, ms(1350)).unwrap();
        assert!(battle.state.player_hp.current() < 100);
        assert_eq!(battle.state.last_damage, ms(1350));
        assert!(events
            .iter()
            .any(|(_, f)| matches!(f, Feedback::DamageTick { .. })));
    }

    #[test]
    fn reset_restores_a_pristine_battle_but_keeps_the_total() {
        let mut battle = battle_of(Shape::Dot);
        let mut t = 0;
        tick(&mut battle, &mut t);
        park_current(&mut battle);
        tick(&mut battle, &mut t);
        let mut feedback = Vec::new();
        battle.apply_clears(1, ms(t), &mut feedback);
        assert_eq!(battle.state.total_score, 10);

        battle.reset();
        assert!(battle.state.grid.is_empty());
        assert_eq!(battle.state.score, 0);
        assert_eq!(battle.state.total_score, 10);
        assert_eq!(battle.state.level, 1);
        assert_eq!(battle.state.speed, 1.0);
        assert!(battle.state.current.is_none());
        assert!(battle.state.next.is_none());
        assert!(battle.state.end.is_none());
        assert_eq!(battle.state.spawn_count, 0);
        assert_eq!(battle.state.player_hp.current(), 100);
        assert_eq!(battle.state.enemy_hp.current(), 100);
    }

    #[test]
    fn level_ups_raise_the_speed() {
        let mut battle = battle_of(Shape::O);
        let mut feedback = Vec::new();
        // Nine singles: 90 points, still level 1; one more crosses 100.
        for i in 0..10 {
            battle.apply_clears(1, ms(i), &mut feedback);
        }
        assert_eq!(battle.state.score, 100);
        assert_eq!(battle.state.level, 2);
        assert_eq!(battle.state.speed, 2.0);
        assert!(feedback
            .iter()
            .any(|(_, f)| matches!(f, Feedback::LevelUp { level: 2 })));
    }

    #[test]
    fn update_rejects_time_running_backwards() {
        let mut battle = battle_of(Shape::O);
        battle.update(None, ms(100)).unwrap();
        assert!(matches!(
            battle.update(None, ms(50)),
            Err(UpdateError::TimeRanBackwards)
        ));
    }

    #[test]
    fn forfeit_is_terminal_until_reset() {
        let mut battle = battle_of(Shape::O);
        battle.update(None, ms(1)).unwrap();
        battle.forfeit();
        assert_eq!(battle.state.end, Some(Err(GameOver::Forfeit)));
        battle.update(None, ms(2)).unwrap();
        assert_eq!(battle.state.end, Some(Err(GameOver::Forfeit)));
        battle.reset();
        assert!(battle.state.end.is_none());
    }

    #[test]
    fn sustained_tilt_keeps_swinging_after_the_end() {
        let rules = OpponentRules {
            tilt: Some(SpinDir::Right),
            ..OpponentRules::default()
        };
        let mut battle = Battle::with_seed(rules, 7);
        battle.update(None, ms(1)).unwrap();
        battle.forfeit();
        let before = battle.state.tilt.angle();
        battle.update(None, ms(2)).unwrap();
        assert_ne!(battle.state.tilt.angle(), before);
    }

    #[test]
    fn oscillator_triangle_wave_stays_bounded() {
        let mut wave = Oscillator::new(Some(SpinDir::Right), 0.05, 0.2);
        let mut seen_left = false;
        let mut seen_right = false;
        for _ in 0..100 {
            wave.advance();
            assert!(wave.angle().abs() <= 0.2 + f64::EPSILON);
            match wave.direction() {
                SpinDir::Left => seen_left = true,
                SpinDir::Right => seen_right = true,
            }
        }
        assert!(seen_left && seen_right, "wave reversed at both bounds");
    }

    #[test]
    fn oscillator_burst_fades_back_to_level() {
        let mut wave = Oscillator::new(None, 0.05, 0.2);
        wave.jolt(0.13);
        assert!(wave.angle() > 0.0);
        for _ in 0..10 {
            wave.advance();
        }
        assert_eq!(wave.angle(), 0.0);
    }

    #[test]
    fn self_scroll_slides_the_board_against_the_shift() {
        let rules = OpponentRules {
            pool: PiecePool::single(Shape::O),
            self_scroll: true,
            ..OpponentRules::default()
        };
        let mut battle = Battle::with_seed(rules, 7);
        let mut held = ButtonsPressed::default();
        held[Button::MoveRight] = true;
        battle.update(Some(held), ms(1)).unwrap();
        battle.update(None, ms(150)).unwrap();
        assert_eq!(battle.state.scroll_x, -CELL);
    }

    #[test]
    fn the_preview_piece_becomes_the_next_current() {
        let mut battle = Battle::with_seed(OpponentRules::default(), 42);
        let mut t = 0;
        tick(&mut battle, &mut t);
        let promised = battle.state.next.as_ref().unwrap().shape();
        park_current(&mut battle);
        tick(&mut battle, &mut t);
        tick(&mut battle, &mut t);
        assert_eq!(battle.state.current.as_ref().unwrap().shape(), promised);
    }

    #[test]
    fn buttons_index_by_variant() {
        let mut held = ButtonsPressed::default();
        held[Button::Rotate] = true;
        assert!(held[Button::Rotate]);
        assert!(!held[Button::MoveLeft]);
        assert!(!held[Button::MoveRight]);
        assert!(!held[Button::SoftDrop]);
    }
}
