//! # Particle Physics Model
//!
//! Host-side particle state for potential evaluation: positions, orientations
//! and types, the triclinic simulation box, dihedral topology, and the
//! harmonic dihedral parameter record with its reference evaluation.

pub mod box_dim;
pub mod dihedral;
pub mod error;
pub mod particle;
pub mod system;
pub mod topology;

pub use box_dim::*;
pub use dihedral::*;
pub use error::*;
pub use particle::*;
pub use system::*;
pub use topology::*;
