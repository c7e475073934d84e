//! Error type shared by the whole simulation library.
//!
//! Every failure is fatal to the run: nothing here is retried, and a step
//! only counts once it has been gathered onto the aggregator.

/// Errors produced while configuring, building or running a simulation.
#[derive(thiserror::Error, Debug)]
pub enum SimError {
    /// Invalid run parameters, detected before any simulation work
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Output destination already holds results and overwrite was not requested
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Particle data that cannot be simulated (empty, non-finite, non-positive mass)
    #[error("invalid particles: {0}")]
    InvalidParticles(String),

    /// A peer failed to take part in a collective step
    #[error("synchronization failure: {0}")]
    Synchronization(String),

    /// IO error while persisting or loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding or decoding failed
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    /// Run configuration file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
