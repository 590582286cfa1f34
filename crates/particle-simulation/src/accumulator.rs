//! Shared per-particle force, energy and virial buffers
//!
//! Every force compute adds into the same accumulator during a step. The
//! integrator zeroes it once at the start of the step.

use glam::DVec3;

#[derive(Debug, Clone, PartialEq)]
pub struct ForceAccumulator {
    forces: Vec<DVec3>,
    energies: Vec<f64>,
    /// `xx, xy, xz, yy, yz, zz` per particle
    virials: Vec<[f64; 6]>,
}

impl ForceAccumulator {
    pub fn new(n_particles: usize) -> Self {
        Self {
            forces: vec![DVec3::ZERO; n_particles],
            energies: vec![0.0; n_particles],
            virials: vec![[0.0; 6]; n_particles],
        }
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    /// Clear every buffer, resizing to `n_particles`
    pub fn reset(&mut self, n_particles: usize) {
        self.forces.clear();
        self.forces.resize(n_particles, DVec3::ZERO);
        self.energies.clear();
        self.energies.resize(n_particles, 0.0);
        self.virials.clear();
        self.virials.resize(n_particles, [0.0; 6]);
    }

    pub fn zero(&mut self) {
        self.reset(self.len());
    }

    /// Add one particle's contribution
    pub fn add(&mut self, index: usize, force: DVec3, energy: f64, virial: [f64; 6]) {
        self.forces[index] += force;
        self.energies[index] += energy;
        for (acc, v) in self.virials[index].iter_mut().zip(virial) {
            *acc += v;
        }
    }

    pub fn forces(&self) -> &[DVec3] {
        &self.forces
    }

    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    pub fn virials(&self) -> &[[f64; 6]] {
        &self.virials
    }

    pub fn total_energy(&self) -> f64 {
        self.energies.iter().sum()
    }

    pub fn total_virial(&self) -> [f64; 6] {
        let mut total = [0.0; 6];
        for v in &self.virials {
            for (t, c) in total.iter_mut().zip(v) {
                *t += c;
            }
        }
        total
    }

    pub fn net_force(&self) -> DVec3 {
        self.forces.iter().copied().sum()
    }
}
