//! Fitness oracle: a gene vector becomes a network, the network plays a batch
//! of seeded games, and the episode statistics collapse into one score.

use crate::error::Result;
use crate::game::{Game, GameState};
use crate::nn::{Activation, Network};
use crate::policy::{check_controller, step_with_network};
use serde::{Deserialize, Serialize};

/// Aggregated results of a batch of episodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub episodes: usize,
    pub won: usize,
    pub highest_score: usize,
    pub avg_score: f64,
    /// Mean moves since the last apple when the episode ended.
    pub avg_steps: f64,
    /// Wall and self collisions per episode.
    pub avg_deaths: f64,
    pub avg_timeouts: f64,
    /// Episodes cut off by the hard step cap.
    pub avg_capped: f64,
}

impl EpisodeStats {
    pub fn win_rate(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.won as f64 / self.episodes as f64
        }
    }
}

/// Running totals, mergeable so batches can be played in parallel.
#[derive(Clone, Copy, Debug, Default)]
pub struct EpisodeTally {
    episodes: usize,
    won: usize,
    highest_score: usize,
    score_sum: usize,
    step_sum: usize,
    deaths: usize,
    timeouts: usize,
    capped: usize,
}

impl EpisodeTally {
    pub fn record(&mut self, game: &Game, capped: bool) {
        self.episodes += 1;
        self.highest_score = self.highest_score.max(game.score());
        self.score_sum += game.score();
        self.step_sum += game.steps();
        match game.state() {
            GameState::Won => self.won += 1,
            GameState::FailedHitWall | GameState::FailedHitSelf => self.deaths += 1,
            GameState::FailedTimeout => self.timeouts += 1,
            GameState::Running => {}
        }
        if capped {
            self.capped += 1;
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            episodes: self.episodes + other.episodes,
            won: self.won + other.won,
            highest_score: self.highest_score.max(other.highest_score),
            score_sum: self.score_sum + other.score_sum,
            step_sum: self.step_sum + other.step_sum,
            deaths: self.deaths + other.deaths,
            timeouts: self.timeouts + other.timeouts,
            capped: self.capped + other.capped,
        }
    }

    pub fn finish(&self) -> EpisodeStats {
        let n = self.episodes.max(1) as f64;
        EpisodeStats {
            episodes: self.episodes,
            won: self.won,
            highest_score: self.highest_score,
            avg_score: self.score_sum as f64 / n,
            avg_steps: self.step_sum as f64 / n,
            avg_deaths: self.deaths as f64 / n,
            avg_timeouts: self.timeouts as f64 / n,
            avg_capped: self.capped as f64 / n,
        }
    }
}

/// Weights combining [`EpisodeStats`] into a scalar reward.
///
/// `fitness = highest_score*hs + avg_score*avg + win_rate*won
///            - avg_deaths*deaths - avg_steps*steps - (avg_timeouts + avg_capped)*stall`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub highest_score: f64,
    pub avg_score: f64,
    pub won: f64,
    pub deaths: f64,
    pub steps: f64,
    pub stall: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            highest_score: 500.0,
            avg_score: 50.0,
            won: 1000.0,
            deaths: 15.0,
            steps: 10.0,
            stall: 100.0,
        }
    }
}

impl RewardWeights {
    pub fn fitness(&self, s: &EpisodeStats) -> f64 {
        s.highest_score as f64 * self.highest_score + s.avg_score * self.avg_score
            + s.win_rate() * self.won
            - s.avg_deaths * self.deaths
            - s.avg_steps * self.steps
            - (s.avg_timeouts + s.avg_capped) * self.stall
    }
}

/// Plays one episode to a terminal state or until `step_cap` moves.
/// Returns true when the cap cut the episode short.
pub fn run_episode(game: &mut Game, net: &Network, step_cap: usize) -> Result<bool> {
    while game.state() == GameState::Running {
        if game.total_steps() >= step_cap {
            return Ok(true);
        }
        step_with_network(game, net)?;
    }
    Ok(false)
}

/// Plays `episodes` games on one seeded board, resetting between episodes.
pub fn simulate(
    net: &Network,
    width: u16,
    height: u16,
    episodes: usize,
    seed: u64,
    step_cap: usize,
) -> Result<EpisodeStats> {
    check_controller(net)?;
    let mut game = Game::new(width, height, seed)?;
    let mut tally = EpisodeTally::default();
    for i in 0..episodes {
        if i > 0 {
            game.reset();
        }
        let capped = run_episode(&mut game, net, step_cap)?;
        tally.record(&game, capped);
    }
    Ok(tally.finish())
}

/// Everything a fitness task needs; cheap to share across worker threads.
#[derive(Clone, Debug)]
pub struct SnakeFitness {
    pub layers: Vec<usize>,
    pub activations: Vec<Activation>,
    pub board_width: u16,
    pub board_height: u16,
    pub sampling_size: usize,
    pub seed: u64,
    pub step_cap: usize,
    pub reward: RewardWeights,
}

impl SnakeFitness {
    pub fn evaluate(&self, genes: &[f64]) -> Result<f64> {
        let stats = self.stats(genes)?;
        Ok(self.reward.fitness(&stats))
    }

    pub fn stats(&self, genes: &[f64]) -> Result<EpisodeStats> {
        let net = Network::from_parameters(&self.layers, &self.activations, genes)?;
        simulate(
            &net,
            self.board_width,
            self.board_height,
            self.sampling_size,
            self.seed,
            self.step_cap,
        )
    }
}
