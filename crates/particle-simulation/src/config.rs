//! Runtime configuration for force computes
//!
//! Defaults can be overridden from the environment:
//!
//! | Variable | Values |
//! |----------|--------|
//! | `PARTICLES_BACKEND` | `auto` (default), `cpu`, `gpu` |
//! | `PARTICLES_GPU_ADAPTER` | case-insensitive adapter name substring |
//! | `PARTICLES_TUNER` | `on` (default) / `off` |
//! | `PARTICLES_TUNER_PERIOD` | launches between autotuner sweeps |

use crate::ComputeError;

/// Which execution target force computes run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// GPU when an adapter is available, CPU otherwise
    Auto,
    Cpu,
    Gpu,
}

/// Autotuner settings shared by every compute built from this config
#[derive(Debug, Clone, PartialEq)]
pub struct TunerConfig {
    /// Candidate block sizes (threads per workgroup)
    pub candidates: Vec<u32>,
    /// Timing samples per candidate in one sweep
    pub samples: usize,
    /// Launches between sweeps
    pub period: u32,
    pub enabled: bool,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            candidates: vec![32, 64, 128, 256, 512, 1024],
            samples: 5,
            period: 100_000,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub backend: Backend,
    pub adapter: Option<String>,
    pub tuner: TunerConfig,
    /// Largest block size the CPU target accepts
    pub cpu_max_block_size: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            adapter: None,
            tuner: TunerConfig::default(),
            cpu_max_block_size: 1024,
        }
    }
}

impl SimulationConfig {
    /// Defaults overridden by `PARTICLES_*` environment variables
    pub fn from_env() -> Result<Self, ComputeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ComputeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("PARTICLES_BACKEND") {
            config.backend = match value.trim().to_ascii_lowercase().as_str() {
                "" | "auto" => Backend::Auto,
                "cpu" => Backend::Cpu,
                "gpu" => Backend::Gpu,
                other => {
                    return Err(ComputeError::config(format!(
                        "PARTICLES_BACKEND must be auto, cpu or gpu, got '{other}'"
                    )))
                }
            };
        }

        if let Some(value) = lookup("PARTICLES_GPU_ADAPTER") {
            let value = value.trim();
            if !value.is_empty() {
                config.adapter = Some(value.to_string());
            }
        }

        if let Some(value) = lookup("PARTICLES_TUNER") {
            config.tuner.enabled = match value.trim().to_ascii_lowercase().as_str() {
                "on" | "1" | "true" => true,
                "off" | "0" | "false" => false,
                other => {
                    return Err(ComputeError::config(format!(
                        "PARTICLES_TUNER must be on or off, got '{other}'"
                    )))
                }
            };
        }

        if let Some(value) = lookup("PARTICLES_TUNER_PERIOD") {
            let period: u32 = value.trim().parse().map_err(|_| {
                ComputeError::config(format!(
                    "PARTICLES_TUNER_PERIOD must be a positive integer, got '{value}'"
                ))
            })?;
            if period == 0 {
                return Err(ComputeError::InvalidPeriod);
            }
            config.tuner.period = period;
        }

        Ok(config)
    }
}
