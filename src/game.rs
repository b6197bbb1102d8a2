//! Deterministic single-player snake environment.
//!
//! The board is a pure function of the snake and apple positions and is
//! re-rendered from scratch after every successful move. All randomness
//! (start position, apple placement) comes from a generator owned by the
//! instance and seeded at construction, so two games built with the same
//! seed and driven by the same directions play out identically.
//!
//! Feature vector layout returned by [`Game::parameters`]:
//!
//! | index  | feature                                                        |
//! |--------|----------------------------------------------------------------|
//! | 0..4   | cell next to the head is blocked (up, down, left, right)       |
//! | 4..8   | distance from head to each edge, normalised to `[0, 1]`        |
//! | 8..12  | free cells before the nearest obstacle on each ray, normalised |
//! | 12..16 | apple is north, south, west, east of the head                  |
//! | 16..20 | current direction, one-hot                                     |
//! | 20     | euclidean distance to apple over the board diagonal            |
//! | 21     | snake length over the number of cells                          |

use crate::error::{Error, Result};
use crate::pos::{Dir, Pos};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const FEATURE_COUNT: usize = 22;
pub const MIN_BOARD_SIDE: u16 = 4;
pub const MAX_BOARD_SIDE: u16 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    SnakeHead,
    SnakeBody,
    Apple,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    Running,
    Won,
    FailedHitWall,
    FailedHitSelf,
    FailedTimeout,
}

impl GameState {
    pub fn is_terminal(self) -> bool {
        self != GameState::Running
    }

    pub fn is_collision(self) -> bool {
        matches!(self, GameState::FailedHitWall | GameState::FailedHitSelf)
    }
}

pub struct Game {
    width: i32,
    height: i32,
    board: Vec<Cell>,
    snake: VecDeque<Pos>,
    dir: Dir,
    apple: Option<Pos>,
    score: usize,
    steps: usize,
    total_steps: usize,
    state: GameState,
    rng: SmallRng,
}

impl Game {
    pub fn new(width: u16, height: u16, seed: u64) -> Result<Self> {
        let side = MIN_BOARD_SIDE..=MAX_BOARD_SIDE;
        if !side.contains(&width) || !side.contains(&height) {
            return Err(Error::InvalidConfig(format!(
                "board {width}x{height} outside {MIN_BOARD_SIDE}..={MAX_BOARD_SIDE} per side"
            )));
        }
        let mut g = Self {
            width: i32::from(width),
            height: i32::from(height),
            board: vec![Cell::Empty; usize::from(width) * usize::from(height)],
            snake: VecDeque::new(),
            dir: Dir::Up,
            apple: None,
            score: 0,
            steps: 0,
            total_steps: 0,
            state: GameState::Running,
            rng: SmallRng::seed_from_u64(seed),
        };
        g.reset();
        Ok(g)
    }

    /// Starts a fresh episode. The generator keeps its sequence, it is not re-seeded.
    pub fn reset(&mut self) {
        self.score = 0;
        self.steps = 0;
        self.total_steps = 0;
        self.snake.clear();
        self.dir = Dir::Up;
        self.state = GameState::Running;

        let (w, h) = (self.width, self.height);
        let x = self.rng.gen_range(w / 4..(3 * w / 4).max(w / 4 + 1));
        let y = self.rng.gen_range(h / 4..(3 * h / 4 - 1).max(h / 4 + 1));
        let head = Pos::new(x, y);
        self.snake.push_back(head);
        self.snake.push_back(head.step(Dir::Down));

        self.render_snake();
        self.place_apple();
        self.render_apple();
    }

    /// Advances the game by one move. Does nothing once a terminal state is reached.
    pub fn update(&mut self) {
        if self.state != GameState::Running {
            return;
        }

        self.steps += 1;
        self.total_steps += 1;
        if self.steps > self.cell_count() {
            self.state = GameState::FailedTimeout;
            return;
        }

        let new_head = self.head().step(self.dir);
        if !self.in_bounds(new_head) {
            self.state = GameState::FailedHitWall;
            return;
        }
        if matches!(self.cell(new_head), Cell::SnakeHead | Cell::SnakeBody) {
            self.state = GameState::FailedHitSelf;
            return;
        }

        self.snake.push_front(new_head);
        if self.apple == Some(new_head) {
            self.score += 1;
            self.steps = 0;
            self.render_snake();
            if !self.place_apple() {
                self.state = GameState::Won;
                return;
            }
        } else {
            self.snake.pop_back();
            self.render_snake();
        }
        self.render_apple();
    }

    /// Requests a new heading. A 180 degree turn is dropped silently.
    pub fn set_direction(&mut self, new_dir: Dir) {
        if new_dir != self.dir.opposite() {
            self.dir = new_dir;
        }
    }

    pub fn direction(&self) -> Dir {
        self.dir
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn score(&self) -> usize {
        self.score
    }

    /// Moves since the last apple was eaten.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Moves since the last reset.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn width(&self) -> u16 {
        self.width as u16
    }

    pub fn height(&self) -> u16 {
        self.height as u16
    }

    pub fn head(&self) -> Pos {
        self.snake[0]
    }

    pub fn snake(&self) -> &VecDeque<Pos> {
        &self.snake
    }

    /// `None` only after the game is won and no empty cell is left.
    pub fn apple(&self) -> Option<Pos> {
        self.apple
    }

    /// Row-major board, `width * height` cells.
    pub fn board(&self) -> &[Cell] {
        &self.board
    }

    pub fn cell_at(&self, x: i32, y: i32) -> Option<Cell> {
        let p = Pos::new(x, y);
        self.in_bounds(p).then(|| self.cell(p))
    }

    pub fn snake_contains(&self, p: Pos) -> bool {
        self.snake.iter().any(|&s| s == p)
    }

    /// Euclidean distance from head to apple in board units, 0 when there is no apple.
    pub fn distance_to_apple(&self) -> f64 {
        self.apple.map_or(0.0, |a| self.head().distance(a))
    }

    pub fn parameter_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Network input features, see the module docs for the layout.
    pub fn parameters(&self) -> Result<Vec<f64>> {
        let head = self.head();
        let mut out = Vec::with_capacity(FEATURE_COUNT);

        for d in Dir::ALL {
            out.push(bool_feature(self.is_blocked(head.step(d))));
        }

        let max_x = f64::from(self.width - 1);
        let max_y = f64::from(self.height - 1);
        out.push(f64::from(head.y) / max_y);
        out.push(f64::from(self.height - 1 - head.y) / max_y);
        out.push(f64::from(head.x) / max_x);
        out.push(f64::from(self.width - 1 - head.x) / max_x);

        for d in Dir::ALL {
            let span = match d {
                Dir::Up | Dir::Down => max_y,
                Dir::Left | Dir::Right => max_x,
            };
            out.push(self.free_run(head, d) as f64 / span);
        }

        match self.apple {
            Some(a) => {
                out.push(bool_feature(a.y < head.y));
                out.push(bool_feature(a.y > head.y));
                out.push(bool_feature(a.x < head.x));
                out.push(bool_feature(a.x > head.x));
            }
            None => out.extend([0.0; 4]),
        }

        for d in Dir::ALL {
            out.push(bool_feature(d == self.dir));
        }

        let diagonal = (max_x * max_x + max_y * max_y).sqrt();
        out.push(self.distance_to_apple() / diagonal);
        out.push(self.snake.len() as f64 / self.cell_count() as f64);

        if out.len() != FEATURE_COUNT {
            return Err(Error::FeatureLength {
                expected: FEATURE_COUNT,
                actual: out.len(),
            });
        }
        Ok(out)
    }

    fn cell_count(&self) -> usize {
        self.board.len()
    }

    fn in_bounds(&self, p: Pos) -> bool {
        p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height
    }

    fn index(&self, p: Pos) -> usize {
        (p.y * self.width + p.x) as usize
    }

    fn cell(&self, p: Pos) -> Cell {
        self.board[self.index(p)]
    }

    fn is_blocked(&self, p: Pos) -> bool {
        !self.in_bounds(p) || matches!(self.cell(p), Cell::SnakeHead | Cell::SnakeBody)
    }

    fn free_run(&self, from: Pos, dir: Dir) -> usize {
        let mut n = 0;
        let mut p = from.step(dir);
        while !self.is_blocked(p) {
            n += 1;
            p = p.step(dir);
        }
        n
    }

    fn render_snake(&mut self) {
        self.board.fill(Cell::Empty);
        for i in 0..self.snake.len() {
            let idx = self.index(self.snake[i]);
            self.board[idx] = if i == 0 { Cell::SnakeHead } else { Cell::SnakeBody };
        }
    }

    fn render_apple(&mut self) {
        if let Some(a) = self.apple {
            let idx = self.index(a);
            self.board[idx] = Cell::Apple;
        }
    }

    // Picks a uniformly random empty cell; false when the board is full.
    fn place_apple(&mut self) -> bool {
        let empty: Vec<usize> = self
            .board
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Cell::Empty)
            .map(|(i, _)| i)
            .collect();
        if empty.is_empty() {
            self.apple = None;
            return false;
        }
        let i = empty[self.rng.gen_range(0..empty.len())] as i32;
        self.apple = Some(Pos::new(i % self.width, i / self.width));
        true
    }
}

fn bool_feature(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
