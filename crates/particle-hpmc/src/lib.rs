//! # Hard Particle Monte Carlo Support
//!
//! External energy contributions consumed by a Monte Carlo driver: the
//! [`ExternalField`] interface with neutral defaults, concrete fields,
//! Metropolis acceptance helpers and move counters.

pub mod counters;
pub mod external_field;
pub mod lattice;
pub mod linear;
pub mod metropolis;
pub mod shape;
pub mod wall;

pub use counters::*;
pub use external_field::*;
pub use lattice::*;
pub use linear::*;
pub use metropolis::*;
pub use shape::*;
pub use wall::*;
