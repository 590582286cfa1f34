//! Harmonic springs tethering particles to lattice sites
//!
//! `E = Σᵢ ½ k_t |rᵢ − r₀ᵢ|² + ½ k_r min(|qᵢ − q₀ᵢ|², |qᵢ + q₀ᵢ|²)`
//!
//! Sites are stored in fractional coordinates so they follow the box
//! through resize moves. `q` and `−q` describe the same rotation, hence the
//! minimum in the orientational term.

use crate::{ExternalField, ExternalFieldMono, Shape};
use glam::{DQuat, DVec3};
use particle_physics::{BoxDim, ParticleData, PhysicsError};
use std::borrow::Cow;

#[derive(Debug, Clone)]
struct SiteCache {
    box_dim: BoxDim,
    sites: Vec<DVec3>,
}

#[derive(Debug, Clone)]
pub struct HarmonicLattice {
    fractional_sites: Vec<DVec3>,
    reference_orientations: Vec<DQuat>,
    k_translational: f64,
    k_rotational: f64,
    kt: f64,
    cache: SiteCache,
    last_energy: f64,
}

fn check_non_negative(name: &str, value: f64) -> Result<(), PhysicsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidParams(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

impl HarmonicLattice {
    /// Tether every particle to its current position and orientation
    pub fn from_current(
        reference: &ParticleData,
        k_translational: f64,
        k_rotational: f64,
        kt: f64,
    ) -> Result<Self, PhysicsError> {
        check_non_negative("k_translational", k_translational)?;
        check_non_negative("k_rotational", k_rotational)?;
        if !(kt.is_finite() && kt > 0.0) {
            return Err(PhysicsError::InvalidParams(format!("kT must be positive, got {kt}")));
        }

        let box_dim = *reference.box_dim();
        let fractional_sites = reference
            .positions()
            .iter()
            .map(|&r| box_dim.make_fraction(r))
            .collect();

        log::info!(
            "Harmonic lattice field: {} sites, k_t = {}, k_r = {}",
            reference.len(),
            k_translational,
            k_rotational
        );

        Ok(Self {
            fractional_sites,
            reference_orientations: reference.orientations().to_vec(),
            k_translational,
            k_rotational,
            kt,
            cache: SiteCache {
                box_dim,
                sites: reference.positions().to_vec(),
            },
            last_energy: 0.0,
        })
    }

    pub fn k_translational(&self) -> f64 {
        self.k_translational
    }

    pub fn k_rotational(&self) -> f64 {
        self.k_rotational
    }

    pub fn kt(&self) -> f64 {
        self.kt
    }

    /// Total energy recorded by the last `compute`
    pub fn last_energy(&self) -> f64 {
        self.last_energy
    }

    /// Absolute site positions in `box_dim`, from the cache when it matches
    pub fn sites(&self, box_dim: &BoxDim) -> Cow<'_, [DVec3]> {
        if self.cache.box_dim == *box_dim {
            Cow::Borrowed(&self.cache.sites)
        } else {
            Cow::Owned(
                self.fractional_sites
                    .iter()
                    .map(|&f| box_dim.make_absolute(f))
                    .collect(),
            )
        }
    }

    fn translational_energy(&self, r: DVec3, site: DVec3, box_dim: &BoxDim) -> f64 {
        0.5 * self.k_translational * box_dim.min_image(r - site).length_squared()
    }

    fn rotational_energy(&self, q: DQuat, q0: DQuat) -> f64 {
        let d = (q - q0).length_squared().min((q + q0).length_squared());
        0.5 * self.k_rotational * d
    }

    /// Energy of the whole configuration `(positions, orientations, box_dim)`
    pub fn energy(&self, positions: &[DVec3], orientations: &[DQuat], box_dim: &BoxDim) -> f64 {
        let sites = self.sites(box_dim);
        let translational: f64 = positions
            .iter()
            .zip(sites.iter())
            .map(|(&r, &site)| self.translational_energy(r, site, box_dim))
            .sum();
        let rotational: f64 = orientations
            .iter()
            .zip(&self.reference_orientations)
            .map(|(&q, &q0)| self.rotational_energy(q, q0))
            .sum();
        translational + rotational
    }

    fn particle_energy<S: Shape>(
        &self,
        index: usize,
        position: DVec3,
        shape: &S,
        box_dim: &BoxDim,
    ) -> f64 {
        let Some(&f) = self.fractional_sites.get(index) else {
            return 0.0;
        };
        let site = match self.cache.sites.get(index) {
            Some(&cached) if self.cache.box_dim == *box_dim => cached,
            _ => box_dim.make_absolute(f),
        };

        let mut e = self.translational_energy(position, site, box_dim);
        if shape.has_orientation() {
            e += self.rotational_energy(shape.orientation(), self.reference_orientations[index]);
        }
        e
    }
}

impl ExternalField for HarmonicLattice {
    /// `exp(−E/kT)`; underflows to 0 once E exceeds ~745 kT, compare
    /// configurations through the log weight instead
    fn calculate_boltzmann_weight(&self, timestep: u64, current: &ParticleData) -> f64 {
        self.calculate_log_boltzmann_weight(timestep, current)
            .map_or(0.0, f64::exp)
    }

    fn calculate_log_boltzmann_weight(
        &self,
        _timestep: u64,
        current: &ParticleData,
    ) -> Option<f64> {
        let e = self.energy(current.positions(), current.orientations(), current.box_dim());
        Some(-e / self.kt)
    }

    fn calculate_delta_e(
        &self,
        _timestep: u64,
        current: &ParticleData,
        old_positions: &[DVec3],
        old_orientations: &[DQuat],
        old_box: &BoxDim,
    ) -> f64 {
        let new = self.energy(current.positions(), current.orientations(), current.box_dim());
        let old = self.energy(old_positions, old_orientations, old_box);
        new - old
    }

    fn reset(&mut self, _timestep: u64, current: &ParticleData) {
        let box_dim = *current.box_dim();
        if self.cache.box_dim != box_dim {
            self.cache.sites = self.sites(&box_dim).into_owned();
            self.cache.box_dim = box_dim;
        }
    }

    fn compute(&mut self, _timestep: u64, current: &ParticleData) {
        self.last_energy =
            self.energy(current.positions(), current.orientations(), current.box_dim());
    }
}

impl<S: Shape> ExternalFieldMono<S> for HarmonicLattice {
    fn energy_difference(
        &self,
        _timestep: u64,
        current: &ParticleData,
        index: usize,
        old_position: DVec3,
        old_shape: &S,
        new_position: DVec3,
        new_shape: &S,
    ) -> f64 {
        let box_dim = current.box_dim();
        self.particle_energy(index, new_position, new_shape, box_dim)
            - self.particle_energy(index, old_position, old_shape, box_dim)
    }
}
