//! Training driver: wires the game oracle into the genetic algorithm and keeps
//! the best network on disk as it improves.

use crate::config::TrainConfig;
use crate::error::Result;
use crate::fitness::{EpisodeStats, EpisodeTally, SnakeFitness, run_episode};
use crate::ga::{GenerationStats, GeneticAlgorithm};
use crate::game::Game;
use crate::nn::Network;
use crate::policy::check_controller;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub generations: usize,
    pub best_fitness: f64,
    /// Whether the run stopped because `target_fitness` was reached.
    pub solved: bool,
    pub history: Vec<GenerationStats>,
}

pub struct Trainer {
    config: TrainConfig,
    oracle: SnakeFitness,
    ga: GeneticAlgorithm<f64>,
    best_fitness: f64,
    history: Vec<GenerationStats>,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;

        let episode_seed = config.seed.unwrap_or_else(rand::random);
        let oracle = SnakeFitness {
            layers: config.layers(),
            activations: config.activations.clone(),
            board_width: config.board_width,
            board_height: config.board_height,
            sampling_size: config.sampling_size,
            seed: episode_seed,
            step_cap: config.episode_step_cap,
            reward: config.reward,
        };

        // gene stream is offset from the GA's own selection stream
        let mut gene_rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15),
            None => SmallRng::from_entropy(),
        };
        let range = config.gene_range;
        let random_gene = move || gene_rng.gen_range(-range..=range);

        let task = oracle.clone();
        let ga = GeneticAlgorithm::new(
            config.ga_params(),
            move |genes: &[f64]| task.evaluate(genes),
            random_gene,
        )?;

        info!(
            layers = ?oracle.layers,
            genes = config.genetic_length(),
            population = config.population_size,
            episode_seed,
            "trainer ready"
        );
        Ok(Self {
            config,
            oracle,
            ga,
            best_fitness: f64::NEG_INFINITY,
            history: Vec::new(),
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn algorithm(&self) -> &GeneticAlgorithm<f64> {
        &self.ga
    }

    pub fn history(&self) -> &[GenerationStats] {
        &self.history
    }

    /// Network built from the current best individual.
    pub fn best_network(&self) -> Result<Option<Network>> {
        self.ga
            .best_individual()
            .map(|best| Network::from_parameters(&self.oracle.layers, &self.oracle.activations, best.genes()))
            .transpose()
    }

    /// Episode statistics of the current best individual.
    pub fn best_stats(&self) -> Result<Option<EpisodeStats>> {
        self.ga
            .best_individual()
            .map(|best| self.oracle.stats(best.genes()))
            .transpose()
    }

    /// Runs until `max_generation` or `target_fitness`. Every time the best
    /// fitness improves the champion is written to `model_path`.
    /// `on_generation` sees each generation's stats as it completes.
    pub fn run<F>(&mut self, model_path: impl AsRef<Path>, mut on_generation: F) -> Result<TrainingSummary>
    where
        F: FnMut(&GenerationStats),
    {
        let model_path = model_path.as_ref();
        let mut solved = false;

        while self.ga.generation() < self.config.max_generation {
            if self.ga.generation() == 0 {
                self.ga.create_initial_population()?;
            } else {
                self.ga.create_next_population()?;
            }
            let Some(stats) = self.ga.stats() else {
                break;
            };
            self.history.push(stats);
            on_generation(&stats);

            if stats.best > self.best_fitness {
                self.best_fitness = stats.best;
                if let Some(net) = self.best_network()? {
                    net.save(model_path)?;
                }
                info!(
                    generation = stats.generation,
                    fitness = stats.best,
                    path = %model_path.display(),
                    "new best model saved"
                );
            } else {
                debug!(generation = stats.generation, best = stats.best, mean = stats.mean, "generation done");
            }

            if self.config.target_fitness.is_some_and(|t| stats.best >= t) {
                info!(generation = stats.generation, fitness = stats.best, "target fitness reached");
                solved = true;
                break;
            }
        }

        Ok(TrainingSummary {
            generations: self.ga.generation(),
            best_fitness: self.best_fitness,
            solved,
            history: self.history.clone(),
        })
    }
}

/// Plays `episodes` independent games, one seed per episode derived from
/// `base_seed`, spread over the rayon pool.
pub fn evaluate_model(
    net: &Network,
    width: u16,
    height: u16,
    episodes: usize,
    base_seed: u64,
    step_cap: usize,
) -> Result<EpisodeStats> {
    check_controller(net)?;
    let tally = (0..episodes as u64)
        .into_par_iter()
        .map(|i| -> Result<EpisodeTally> {
            let mut game = Game::new(width, height, base_seed.wrapping_add(i))?;
            let capped = run_episode(&mut game, net, step_cap)?;
            let mut tally = EpisodeTally::default();
            tally.record(&game, capped);
            Ok(tally)
        })
        .try_reduce(EpisodeTally::default, |a, b| Ok(a.merge(b)))?;
    Ok(tally.finish())
}
