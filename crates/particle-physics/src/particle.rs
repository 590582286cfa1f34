//! Particle state shared by force computes and external fields
//!
//! Positions, orientations and type ids are owned here. Computes and fields
//! only read them; the integrator or Monte Carlo driver commits changes.

use crate::{BoxDim, PhysicsError};
use glam::{DQuat, DVec3};

/// Positions, orientations and types of every particle plus the box they live in
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleData {
    positions: Vec<DVec3>,
    orientations: Vec<DQuat>,
    types: Vec<u32>,
    n_types: u32,
    box_dim: BoxDim,
}

impl ParticleData {
    pub fn new(box_dim: BoxDim, n_types: u32) -> Self {
        Self {
            positions: Vec::new(),
            orientations: Vec::new(),
            types: Vec::new(),
            n_types,
            box_dim,
        }
    }

    /// Add a particle, returning its index
    pub fn add_particle(
        &mut self,
        position: DVec3,
        orientation: DQuat,
        type_id: u32,
    ) -> Result<usize, PhysicsError> {
        if type_id >= self.n_types {
            return Err(PhysicsError::TypeOutOfRange {
                type_id,
                n_types: self.n_types,
            });
        }
        self.positions.push(position);
        self.orientations.push(orientation);
        self.types.push(type_id);
        Ok(self.positions.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn n_types(&self) -> u32 {
        self.n_types
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    pub fn orientations(&self) -> &[DQuat] {
        &self.orientations
    }

    pub fn types(&self) -> &[u32] {
        &self.types
    }

    pub fn box_dim(&self) -> &BoxDim {
        &self.box_dim
    }

    pub fn position(&self, index: usize) -> Result<DVec3, PhysicsError> {
        self.positions
            .get(index)
            .copied()
            .ok_or(PhysicsError::ParticleOutOfRange {
                index,
                n_particles: self.len(),
            })
    }

    pub fn orientation(&self, index: usize) -> Result<DQuat, PhysicsError> {
        self.orientations
            .get(index)
            .copied()
            .ok_or(PhysicsError::ParticleOutOfRange {
                index,
                n_particles: self.len(),
            })
    }

    /// Commit a new position (wrapped into the box)
    pub fn set_position(&mut self, index: usize, position: DVec3) -> Result<(), PhysicsError> {
        let n_particles = self.len();
        let wrapped = self.box_dim.wrap(position);
        let slot = self
            .positions
            .get_mut(index)
            .ok_or(PhysicsError::ParticleOutOfRange { index, n_particles })?;
        *slot = wrapped;
        Ok(())
    }

    pub fn set_orientation(
        &mut self,
        index: usize,
        orientation: DQuat,
    ) -> Result<(), PhysicsError> {
        let n_particles = self.len();
        let slot = self
            .orientations
            .get_mut(index)
            .ok_or(PhysicsError::ParticleOutOfRange { index, n_particles })?;
        *slot = orientation.normalize();
        Ok(())
    }

    /// Replace the box and map every particle to the same fractional
    /// coordinates in the new box.
    pub fn rescale_box(&mut self, new_box: BoxDim) {
        let old_box = self.box_dim;
        for r in &mut self.positions {
            let f = old_box.make_fraction(*r);
            *r = new_box.make_absolute(f);
        }
        self.box_dim = new_box;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_particle_checks_type() {
        let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 2);
        assert_eq!(pdata.add_particle(DVec3::ZERO, DQuat::IDENTITY, 1), Ok(0));
        assert_eq!(
            pdata.add_particle(DVec3::ZERO, DQuat::IDENTITY, 2),
            Err(PhysicsError::TypeOutOfRange {
                type_id: 2,
                n_types: 2
            })
        );
        assert_eq!(pdata.len(), 1);
    }

    #[test]
    fn test_set_position_wraps() {
        let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 1);
        pdata.add_particle(DVec3::ZERO, DQuat::IDENTITY, 0).unwrap();
        pdata.set_position(0, DVec3::new(6.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(pdata.position(0).unwrap().x, -4.0, epsilon = 1e-12);
        assert!(pdata.set_position(3, DVec3::ZERO).is_err());
    }

    #[test]
    fn test_rescale_box_keeps_fractions() {
        let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 1);
        pdata
            .add_particle(DVec3::new(1.0, -2.0, 3.0), DQuat::IDENTITY, 0)
            .unwrap();
        pdata.rescale_box(BoxDim::cube(20.0).unwrap());
        let r = pdata.position(0).unwrap();
        assert_relative_eq!(r.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(r.y, -4.0, epsilon = 1e-12);
        assert_relative_eq!(r.z, 6.0, epsilon = 1e-12);
    }
}
