//! Snake played by a small feed-forward network whose weights are evolved
//! with a genetic algorithm.

pub mod config;
pub mod error;
pub mod fitness;
pub mod ga;
pub mod game;
pub mod nn;
pub mod policy;
pub mod pool;
pub mod pos;
pub mod trainer;

pub use config::TrainConfig;
pub use error::{Error, Result};
pub use fitness::{EpisodeStats, RewardWeights};
pub use ga::{GaParams, GenerationStats, GeneticAlgorithm, Individual};
pub use game::{Cell, FEATURE_COUNT, Game, GameState};
pub use nn::{Activation, Network};
pub use policy::Player;
pub use pool::{TaskHandle, ThreadPool};
pub use pos::{Dir, Pos};
pub use trainer::{Trainer, TrainingSummary, evaluate_model};
