//! Error types for force computes and their execution targets

use particle_physics::PhysicsError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("type {type_id} out of range (only {n_types} types declared)")]
    TypeOutOfRange { type_id: u32, n_types: u32 },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("autotuner period must be positive")]
    InvalidPeriod,

    #[error("invalid autotuner configuration for '{name}': {message}")]
    InvalidTunerConfig { name: String, message: String },

    /// Every launch configuration was refused by the execution target
    #[error("no viable launch configuration left for '{0}'")]
    NoViableLaunchConfig(String),

    /// A single launch configuration was refused; recovered by the autotuner
    #[error("block size {block_size} refused: {reason}")]
    LaunchRejected { block_size: u32, reason: String },

    #[error("device error: {0}")]
    Device(String),

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

impl ComputeError {
    pub fn device(message: impl Into<String>) -> Self {
        ComputeError::Device(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        ComputeError::Config(message.into())
    }
}
