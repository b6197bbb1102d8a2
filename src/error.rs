use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network needs at least 3 layers (input, hidden, output), got {0}")]
    InvalidTopology(usize),
    #[error("layer sizes must be non-zero")]
    ZeroSizedLayer,
    #[error("expected {expected} activations (one per layer transition), got {actual}")]
    ActivationCount { expected: usize, actual: usize },
    #[error("parameter vector has {actual} values, network holds {expected}")]
    ParameterLength { expected: usize, actual: usize },
    #[error("network input has {actual} values, input layer expects {expected}")]
    InputLength { expected: usize, actual: usize },
    #[error("feature vector has {actual} values, expected {expected}")]
    FeatureLength { expected: usize, actual: usize },
    #[error("unknown activation code {0}")]
    UnknownActivation(i64),
    #[error("corrupt model header: {0}")]
    CorruptModel(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("population has not been created yet")]
    EmptyPopulation,
    #[error("can't enqueue a task on a thread pool that is shutting down")]
    PoolShutdown,
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    #[error("fitness evaluation failed: {0}")]
    Fitness(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("model encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("model decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
