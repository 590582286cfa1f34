//! External field interface
//!
//! An external field contributes energy that does not come from pair or
//! bonded interactions: walls, applied fields, lattice springs. The Monte
//! Carlo driver queries it for moves it does not evaluate itself:
//!
//! - single-particle trials: [`ExternalFieldMono::energy_difference`]
//! - box moves: [`ExternalField::calculate_delta_e`]
//! - other global moves: ratio of Boltzmann weights after and before the
//!   move, compared through [`ExternalField::calculate_log_boltzmann_weight`]
//!   when the field provides it
//!
//! Every method has a neutral default, so a field overrides only what it
//! needs. Queries take `&self` and are evaluated against `current`, the
//! committed state, plus whatever proposal the arguments describe.

use crate::Shape;
use glam::{DQuat, DVec3};
use particle_physics::{BoxDim, ParticleData};

pub trait ExternalField {
    /// Contribution to the Boltzmann factor of the current state. The
    /// default of 0 marks "no contribution"; it is the same before and after
    /// any move, see [`acceptance_from_weights`](crate::acceptance_from_weights).
    fn calculate_boltzmann_weight(&self, _timestep: u64, _current: &ParticleData) -> f64 {
        0.0
    }

    /// Natural log of the Boltzmann weight, `None` for fields that define no
    /// weight. Fields whose weight can underflow (`exp(−E/kT)` with large E)
    /// must provide this; movers compare weights through it.
    fn calculate_log_boltzmann_weight(
        &self,
        _timestep: u64,
        _current: &ParticleData,
    ) -> Option<f64> {
        None
    }

    /// Energy change from the snapshot `old_*` to `current`, for moves that
    /// touch every particle (box resize, shear)
    fn calculate_delta_e(
        &self,
        _timestep: u64,
        _current: &ParticleData,
        _old_positions: &[DVec3],
        _old_orientations: &[DQuat],
        _old_box: &BoxDim,
    ) -> f64 {
        0.0
    }

    /// Whether the field excludes particles from part of space
    fn has_volume(&self) -> bool {
        false
    }

    fn volume(&self) -> f64 {
        0.0
    }

    /// Start of a new step or sweep; drop cached state
    fn reset(&mut self, _timestep: u64, _current: &ParticleData) {}

    /// Per-step bookkeeping
    fn compute(&mut self, _timestep: u64, _current: &ParticleData) {}
}

/// Field that can score single-particle trial moves of shape `S`
pub trait ExternalFieldMono<S: Shape>: ExternalField {
    /// Energy change from moving particle `index` from
    /// `(old_position, old_shape)` to `(new_position, new_shape)`
    #[allow(clippy::too_many_arguments)]
    fn energy_difference(
        &self,
        _timestep: u64,
        _current: &ParticleData,
        _index: usize,
        _old_position: DVec3,
        _old_shape: &S,
        _new_position: DVec3,
        _new_shape: &S,
    ) -> f64 {
        0.0
    }
}

/// Field with no effect on any move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullField;

impl ExternalField for NullField {}

impl<S: Shape> ExternalFieldMono<S> for NullField {}
