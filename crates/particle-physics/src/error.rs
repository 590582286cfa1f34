//! Error types for the particle model

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// Box lengths or tilts that do not describe a valid cell
    #[error("invalid box: {0}")]
    InvalidBox(String),

    #[error("type {type_id} out of range (only {n_types} types declared)")]
    TypeOutOfRange { type_id: u32, n_types: u32 },

    #[error("particle {index} out of range ({n_particles} particles)")]
    ParticleOutOfRange { index: usize, n_particles: usize },

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}
