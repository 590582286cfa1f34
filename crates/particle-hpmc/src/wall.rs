//! Hard spherical confinement

use crate::{ExternalField, ExternalFieldMono, Shape};
use glam::{DQuat, DVec3};
use particle_physics::{BoxDim, ParticleData, PhysicsError};
use std::f64::consts::PI;

/// Particles must lie entirely inside a sphere. Any configuration with a
/// particle poking through the wall has infinite energy.
#[derive(Debug, Clone, PartialEq)]
pub struct SphericalWall {
    center: DVec3,
    radius: f64,
    /// Circumsphere diameter per particle type, used by every query
    diameters: Vec<f64>,
}

impl SphericalWall {
    /// Wall treating every particle as a point until
    /// [`set_diameter`](Self::set_diameter) is called
    pub fn new(center: DVec3, radius: f64, n_types: u32) -> Result<Self, PhysicsError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(PhysicsError::InvalidParams(format!(
                "wall radius must be positive, got {radius}"
            )));
        }
        Ok(Self {
            center,
            radius,
            diameters: vec![0.0; n_types as usize],
        })
    }

    /// Wall with one type per entry of `shape_params`, each sized by the
    /// circumsphere of its shape
    pub fn for_shapes<S: Shape>(
        center: DVec3,
        radius: f64,
        shape_params: &[S::Params],
    ) -> Result<Self, PhysicsError> {
        let mut wall = Self::new(center, radius, shape_params.len() as u32)?;
        for (type_id, params) in shape_params.iter().enumerate() {
            let diameter = S::new(DQuat::IDENTITY, params).circumsphere_diameter();
            wall.set_diameter(type_id as u32, diameter)?;
        }
        Ok(wall)
    }

    pub fn set_diameter(&mut self, type_id: u32, diameter: f64) -> Result<(), PhysicsError> {
        if !(diameter.is_finite() && diameter >= 0.0) {
            return Err(PhysicsError::InvalidParams(format!(
                "diameter must be non-negative, got {diameter}"
            )));
        }
        let n_types = self.diameters.len() as u32;
        let slot = self
            .diameters
            .get_mut(type_id as usize)
            .ok_or(PhysicsError::TypeOutOfRange { type_id, n_types })?;
        *slot = diameter;
        Ok(())
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Diameter used for particles of `type_id` (0 for undeclared types)
    pub fn diameter(&self, type_id: u32) -> f64 {
        self.diameters.get(type_id as usize).copied().unwrap_or(0.0)
    }

    /// Whether a particle of `diameter` at `position` fits inside
    pub fn contains(&self, position: DVec3, diameter: f64, box_dim: &BoxDim) -> bool {
        let d = box_dim.min_image(position - self.center);
        d.length() + 0.5 * diameter <= self.radius
    }

    fn all_inside(&self, positions: &[DVec3], types: &[u32], box_dim: &BoxDim) -> bool {
        positions
            .iter()
            .zip(types)
            .all(|(&r, &t)| self.contains(r, self.diameter(t), box_dim))
    }
}

impl ExternalField for SphericalWall {
    fn calculate_boltzmann_weight(&self, _timestep: u64, current: &ParticleData) -> f64 {
        if self.all_inside(current.positions(), current.types(), current.box_dim()) {
            1.0
        } else {
            0.0
        }
    }

    fn calculate_log_boltzmann_weight(&self, timestep: u64, current: &ParticleData) -> Option<f64> {
        Some(self.calculate_boltzmann_weight(timestep, current).ln())
    }

    fn calculate_delta_e(
        &self,
        _timestep: u64,
        current: &ParticleData,
        _old_positions: &[DVec3],
        _old_orientations: &[DQuat],
        _old_box: &BoxDim,
    ) -> f64 {
        if self.all_inside(current.positions(), current.types(), current.box_dim()) {
            0.0
        } else {
            f64::INFINITY
        }
    }

    fn has_volume(&self) -> bool {
        true
    }

    fn volume(&self) -> f64 {
        4.0 / 3.0 * PI * self.radius.powi(3)
    }
}

impl<S: Shape> ExternalFieldMono<S> for SphericalWall {
    fn energy_difference(
        &self,
        _timestep: u64,
        current: &ParticleData,
        index: usize,
        _old_position: DVec3,
        _old_shape: &S,
        new_position: DVec3,
        _new_shape: &S,
    ) -> f64 {
        let diameter = current
            .types()
            .get(index)
            .map_or(0.0, |&type_id| self.diameter(type_id));
        if self.contains(new_position, diameter, current.box_dim()) {
            0.0
        } else {
            f64::INFINITY
        }
    }
}
