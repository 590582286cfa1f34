//! System definition: particle state plus bonded topology

use crate::{DihedralData, DihedralGroup, ParticleData, PhysicsError};

/// Everything a force compute is constructed from
#[derive(Debug, Clone)]
pub struct SystemDefinition {
    particles: ParticleData,
    dihedrals: DihedralData,
}

impl SystemDefinition {
    pub fn new(particles: ParticleData, dihedrals: DihedralData) -> Self {
        Self {
            particles,
            dihedrals,
        }
    }

    pub fn particles(&self) -> &ParticleData {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut ParticleData {
        &mut self.particles
    }

    pub fn dihedrals(&self) -> &DihedralData {
        &self.dihedrals
    }

    /// Declare a dihedral between four distinct existing particles
    pub fn add_dihedral(&mut self, members: [u32; 4], type_id: u32) -> Result<usize, PhysicsError> {
        let n_types = self.dihedrals.n_types();
        if type_id >= n_types {
            return Err(PhysicsError::TypeOutOfRange { type_id, n_types });
        }

        let n_particles = self.particles.len();
        if let Some(&m) = members.iter().find(|&&m| m as usize >= n_particles) {
            return Err(PhysicsError::ParticleOutOfRange {
                index: m as usize,
                n_particles,
            });
        }

        for i in 0..4 {
            for j in (i + 1)..4 {
                if members[i] == members[j] {
                    return Err(PhysicsError::InvalidTopology(format!(
                        "dihedral {members:?} repeats particle {}",
                        members[i]
                    )));
                }
            }
        }

        Ok(self.dihedrals.push(DihedralGroup { members, type_id }))
    }

    pub fn clear_dihedrals(&mut self) {
        self.dihedrals.clear();
    }
}
