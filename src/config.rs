use crate::error::{Error, Result};
use crate::fitness::RewardWeights;
use crate::ga::GaParams;
use crate::game::{FEATURE_COUNT, MAX_BOARD_SIDE, MIN_BOARD_SIDE};
use crate::nn::{Activation, Network};
use crate::policy::DIRECTION_OUTPUTS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Training run configuration, stored as JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub board_width: u16,
    pub board_height: u16,
    /// Hidden layer sizes; the input layer is the game's feature count and
    /// the output layer has one neuron per direction.
    pub hidden_layers: Vec<usize>,
    /// One per layer transition.
    pub activations: Vec<Activation>,

    pub population_size: usize,
    pub parent_ratio: usize,
    pub mutate_probability: usize,
    pub transfer_ratio: usize,
    pub crossover_ratio: usize,

    /// Episodes played per fitness evaluation.
    pub sampling_size: usize,
    pub max_generation: usize,
    /// Stop early once the best fitness reaches this value.
    pub target_fitness: Option<f64>,
    /// Hard cap on moves per episode, independent of the game's own timeout.
    pub episode_step_cap: usize,
    /// Fixes both the gene generator and the game seed for reproducible runs.
    pub seed: Option<u64>,
    pub threads: Option<usize>,
    /// Genes are drawn uniformly from `[-gene_range, gene_range]`.
    pub gene_range: f64,
    pub reward: RewardWeights,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            board_width: 10,
            board_height: 10,
            hidden_layers: vec![FEATURE_COUNT, FEATURE_COUNT / 2],
            activations: Network::default_activations(3),
            population_size: 50,
            parent_ratio: 50,
            mutate_probability: 1,
            transfer_ratio: 15,
            crossover_ratio: 50,
            sampling_size: 200,
            max_generation: 1000,
            target_fitness: None,
            episode_step_cap: 10_000,
            seed: None,
            threads: None,
            gene_range: 1.0,
            reward: RewardWeights::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Full layer list: features, hidden layers, directions.
    pub fn layers(&self) -> Vec<usize> {
        let mut layers = Vec::with_capacity(self.hidden_layers.len() + 2);
        layers.push(FEATURE_COUNT);
        layers.extend(&self.hidden_layers);
        layers.push(DIRECTION_OUTPUTS);
        layers
    }

    pub fn genetic_length(&self) -> usize {
        Network::parameter_count_for(&self.layers())
    }

    pub fn ga_params(&self) -> GaParams {
        GaParams {
            population_size: self.population_size,
            parent_ratio: self.parent_ratio,
            mutate_probability: self.mutate_probability,
            transfer_ratio: self.transfer_ratio,
            crossover_ratio: self.crossover_ratio,
            genetic_length: self.genetic_length(),
            seed: self.seed,
            threads: self.threads,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let side = MIN_BOARD_SIDE..=MAX_BOARD_SIDE;
        if !side.contains(&self.board_width) || !side.contains(&self.board_height) {
            return Err(invalid(format!(
                "board {}x{} outside {MIN_BOARD_SIDE}..={MAX_BOARD_SIDE}",
                self.board_width, self.board_height
            )));
        }
        if self.hidden_layers.is_empty() {
            return Err(invalid("at least one hidden layer is required".into()));
        }
        if self.hidden_layers.contains(&0) {
            return Err(invalid(format!("hidden layer sizes must be non-zero, got {:?}", self.hidden_layers)));
        }
        if self.activations.len() != self.hidden_layers.len() + 1 {
            return Err(Error::ActivationCount {
                expected: self.hidden_layers.len() + 1,
                actual: self.activations.len(),
            });
        }
        if self.population_size < 2 {
            return Err(invalid("population_size must be at least 2".into()));
        }
        if self.sampling_size == 0 || self.episode_step_cap == 0 || self.max_generation == 0 {
            return Err(invalid(
                "sampling_size, episode_step_cap and max_generation must be positive".into(),
            ));
        }
        if !(self.gene_range.is_finite() && self.gene_range > 0.0) {
            return Err(invalid(format!("gene_range must be positive, got {}", self.gene_range)));
        }
        self.ga_params().validate()
    }
}

fn invalid(msg: String) -> Error {
    Error::InvalidConfig(msg)
}
