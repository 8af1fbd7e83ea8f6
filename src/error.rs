use thiserror::Error;

/// Reasons a [`SimulationConfig`](crate::config::SimulationConfig) is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f32 },
    #[error("{field} {value} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f32 },
    #[error("min speed {min} exceeds max speed {max}")]
    SpeedBounds { min: f32, max: f32 },
    #[error("spread radius {spread} must exceed proximity radius {proximity}")]
    SpreadInsideProximity { spread: f32, proximity: f32 },
}

/// Errors raised by [`Simulation`](crate::simulation::Simulation) operations.
///
/// A failed resize leaves both the population and the provider untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot remove {requested} agents, only {available} exist")]
    RemoveExceedsPopulation { requested: usize, available: usize },
    #[error("population holds {agents} agents but the provider holds {instances} instances")]
    PopulationMismatch { agents: usize, instances: usize },
    #[error("delta time must be finite and non-negative, got {0}")]
    InvalidDeltaTime(f32),
    #[error("provider has no transform for instance {index}")]
    MissingTransform { index: usize },
    #[error("provider rejected the request")]
    ProviderRejected,
    #[error("provider assigned indices {actual:?}, expected {expected:?}")]
    UnexpectedInstanceIndices {
        expected: std::ops::Range<usize>,
        actual: Vec<usize>,
    },
    #[error("neighbor lists cover {lists} agents but the population has {agents}")]
    NeighborListLength { lists: usize, agents: usize },
    #[error("neighbor list for agent {agent} names out-of-range index {candidate}")]
    NeighborIndexOutOfRange { agent: usize, candidate: usize },
}
