//! Error types for scenario setup, configuration loading and chain execution.

use thiserror::Error;

/// Raised while a [`Scenario`](crate::scenario::Scenario) is being assembled,
/// or when a round trip is built from inconsistent parts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("time bin size must be positive and finite, got {0}")]
    InvalidBinSize(f64),
    #[error("number of time bins must be positive")]
    InvalidTimeBinCount,
    #[error("max stay episodes must be in 1..={time_bin_cnt}, got {max}")]
    InvalidMaxStayEpisodes { max: usize, time_bin_cnt: usize },
    #[error("location '{0}' is already registered")]
    DuplicateLocation(String),
    #[error("unknown location '{0}'")]
    UnknownLocation(String),
    #[error("no travel time from '{from}' to '{to}'")]
    MissingTravelTime { from: String, to: String },
    #[error("scenario has no locations")]
    NoLocations,
    #[error("invalid round trip: {0}")]
    InvalidRoundTrip(String),
}

/// Raised while loading a [`SamplerConfig`](crate::config::SamplerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Raised while a chain runs. A rejected candidate is not an error; these
/// variants abort the run.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("no legal transition from a round trip of size {size}")]
    NoLegalTransition { size: usize },
    #[error("log weight must be finite or -inf, got {value}")]
    NonFiniteLogWeight { value: f64 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("i/o failure in state processor: {0}")]
    Io(#[from] std::io::Error),
    #[error("write failure in state processor: {0}")]
    Csv(#[from] csv::Error),
}
