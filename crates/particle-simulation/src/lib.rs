//! # Particle Simulation Engine
//!
//! Bonded force computes running on wgpu compute shaders or a rayon CPU
//! target, with launch block sizes chosen at runtime by an autotuner.

pub mod accumulator;
pub mod autotuner;
pub mod compute;
pub mod config;
mod cpu_kernel;
pub mod dihedral;
pub mod error;
mod gpu_kernel;
pub mod params;
pub mod target;

pub use accumulator::*;
pub use autotuner::*;
pub use compute::*;
pub use config::*;
pub use dihedral::*;
pub use error::*;
pub use params::*;
pub use target::*;
