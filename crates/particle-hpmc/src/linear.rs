//! Uniform applied field, e.g. gravity or an electric field acting on charges

use crate::{ExternalField, ExternalFieldMono, Shape};
use glam::{DQuat, DVec3};
use particle_physics::{BoxDim, ParticleData, PhysicsError};

/// `E = −Σᵢ s(typeᵢ) ê·rᵢ`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearField {
    direction: DVec3,
    strengths: Vec<f64>,
}

impl LinearField {
    /// `direction` is normalized; every type starts with zero strength
    pub fn new(direction: DVec3, n_types: u32) -> Result<Self, PhysicsError> {
        let direction = direction.try_normalize().ok_or_else(|| {
            PhysicsError::InvalidParams(format!("field direction {direction} cannot be normalized"))
        })?;
        Ok(Self {
            direction,
            strengths: vec![0.0; n_types as usize],
        })
    }

    pub fn set_strength(&mut self, type_id: u32, strength: f64) -> Result<(), PhysicsError> {
        if !strength.is_finite() {
            return Err(PhysicsError::InvalidParams(format!(
                "field strength must be finite, got {strength}"
            )));
        }
        let n_types = self.strengths.len() as u32;
        let slot = self
            .strengths
            .get_mut(type_id as usize)
            .ok_or(PhysicsError::TypeOutOfRange { type_id, n_types })?;
        *slot = strength;
        Ok(())
    }

    pub fn direction(&self) -> DVec3 {
        self.direction
    }

    fn strength(&self, type_id: u32) -> f64 {
        self.strengths.get(type_id as usize).copied().unwrap_or(0.0)
    }

    pub fn energy(&self, positions: &[DVec3], types: &[u32]) -> f64 {
        positions
            .iter()
            .zip(types)
            .map(|(&r, &t)| -self.strength(t) * self.direction.dot(r))
            .sum()
    }
}

impl ExternalField for LinearField {
    fn calculate_delta_e(
        &self,
        _timestep: u64,
        current: &ParticleData,
        old_positions: &[DVec3],
        _old_orientations: &[DQuat],
        _old_box: &BoxDim,
    ) -> f64 {
        let types = current.types();
        self.energy(current.positions(), types) - self.energy(old_positions, types)
    }
}

impl<S: Shape> ExternalFieldMono<S> for LinearField {
    fn energy_difference(
        &self,
        _timestep: u64,
        current: &ParticleData,
        index: usize,
        old_position: DVec3,
        _old_shape: &S,
        new_position: DVec3,
        _new_shape: &S,
    ) -> f64 {
        let Some(&t) = current.types().get(index) else {
            return 0.0;
        };
        -self.strength(t) * self.direction.dot(new_position - old_position)
    }
}
