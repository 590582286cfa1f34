//! Metropolis acceptance and a minimal trial-move driver
//!
//! The driver proposes nothing itself: callers hand it a trial (new position
//! and orientation of one particle, or a new box) and it decides acceptance
//! from the external field, committing to `ParticleData` only on accept.

use crate::{ExternalField, ExternalFieldMono, HpmcCounters, MoveKind, Shape};
use glam::{DQuat, DVec3};
use particle_physics::{BoxDim, ParticleData, PhysicsError};
use rand::Rng;

/// Acceptance probability `min(1, exp(−ΔE / kT))`
pub fn acceptance_from_delta_e(delta_e: f64, kt: f64) -> f64 {
    if delta_e.is_nan() {
        0.0
    } else if delta_e <= 0.0 {
        1.0
    } else {
        (-delta_e / kt).exp()
    }
}

/// Acceptance probability `min(1, after / before)` from raw Boltzmann
/// weights, for fields without a log weight.
///
/// Equal weights accept, which covers fields returning the neutral weight
/// 0 on both sides. Leaving a forbidden state (`before == 0`) always accepts.
pub fn acceptance_from_weights(before: f64, after: f64) -> f64 {
    if after == before {
        return 1.0;
    }
    if !(after >= 0.0) {
        return 0.0;
    }
    if before <= 0.0 {
        return 1.0;
    }
    (after / before).min(1.0)
}

/// Acceptance probability `min(1, exp(ln_after − ln_before))` from log
/// Boltzmann weights. Leaving a forbidden state (`ln_before == −∞`) always
/// accepts.
pub fn acceptance_from_log_weights(ln_before: f64, ln_after: f64) -> f64 {
    if ln_after.is_nan() {
        return 0.0;
    }
    if ln_before == f64::NEG_INFINITY {
        return 1.0;
    }
    let delta = ln_after - ln_before;
    if delta.is_nan() {
        0.0
    } else if delta >= 0.0 {
        1.0
    } else {
        delta.exp()
    }
}

/// Proposed single-particle move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialMove {
    pub index: usize,
    pub position: DVec3,
    pub orientation: DQuat,
    pub kind: MoveKind,
}

/// How a box move is scored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxMoveCriterion {
    /// [`ExternalField::calculate_delta_e`] against the pre-move snapshot
    DeltaE,
    /// Ratio of Boltzmann weights after/before, in log space when the field
    /// provides [`ExternalField::calculate_log_boltzmann_weight`]
    WeightRatio,
}

#[derive(Debug, Clone)]
pub struct MetropolisDriver {
    kt: f64,
    counters: HpmcCounters,
}

impl MetropolisDriver {
    pub fn new(kt: f64) -> Result<Self, PhysicsError> {
        if !(kt.is_finite() && kt > 0.0) {
            return Err(PhysicsError::InvalidParams(format!("kT must be positive, got {kt}")));
        }
        Ok(Self {
            kt,
            counters: HpmcCounters::default(),
        })
    }

    pub fn kt(&self) -> f64 {
        self.kt
    }

    pub fn counters(&self) -> &HpmcCounters {
        &self.counters
    }

    fn accept<R: Rng>(probability: f64, rng: &mut R) -> bool {
        probability >= 1.0 || rng.random::<f64>() < probability
    }

    /// Score `trial` with `field` and commit it if accepted. Returns whether
    /// the move was accepted; a rejected trial leaves `particles` untouched.
    ///
    /// Shapes without an orientation keep their stored orientation, so the
    /// committed state differs from the old one only by what was scored.
    pub fn attempt_move<S, F, R>(
        &mut self,
        timestep: u64,
        particles: &mut ParticleData,
        field: &F,
        shape_params: &[S::Params],
        trial: &TrialMove,
        rng: &mut R,
    ) -> Result<bool, PhysicsError>
    where
        S: Shape,
        F: ExternalFieldMono<S> + ?Sized,
        R: Rng,
    {
        let index = trial.index;
        let old_position = particles.position(index)?;
        let old_orientation = particles.orientation(index)?;
        let type_id = particles.types()[index];
        let params = shape_params
            .get(type_id as usize)
            .ok_or(PhysicsError::TypeOutOfRange {
                type_id,
                n_types: shape_params.len() as u32,
            })?;

        let new_position = particles.box_dim().wrap(trial.position);
        let old_shape = S::new(old_orientation, params);
        let new_orientation = if old_shape.has_orientation() {
            trial.orientation.normalize()
        } else {
            old_orientation
        };
        let new_shape = S::new(new_orientation, params);

        let delta_e = field.energy_difference(
            timestep,
            particles,
            index,
            old_position,
            &old_shape,
            new_position,
            &new_shape,
        );
        let accepted = Self::accept(acceptance_from_delta_e(delta_e, self.kt), rng);

        if accepted {
            particles.set_position(index, new_position)?;
            particles.set_orientation(index, new_orientation)?;
        }
        self.counters.record(trial.kind, accepted);
        Ok(accepted)
    }

    /// Rescale the box to `new_box` (fractional coordinates kept), score the
    /// move with `criterion` and restore the old state on reject
    pub fn attempt_box_move<F, R>(
        &mut self,
        timestep: u64,
        particles: &mut ParticleData,
        field: &F,
        new_box: BoxDim,
        criterion: BoxMoveCriterion,
        rng: &mut R,
    ) -> Result<bool, PhysicsError>
    where
        F: ExternalField + ?Sized,
        R: Rng,
    {
        let snapshot = particles.clone();
        particles.rescale_box(new_box);

        let probability = match criterion {
            BoxMoveCriterion::DeltaE => {
                let delta_e = field.calculate_delta_e(
                    timestep,
                    particles,
                    snapshot.positions(),
                    snapshot.orientations(),
                    snapshot.box_dim(),
                );
                acceptance_from_delta_e(delta_e, self.kt)
            }
            BoxMoveCriterion::WeightRatio => {
                match (
                    field.calculate_log_boltzmann_weight(timestep, &snapshot),
                    field.calculate_log_boltzmann_weight(timestep, particles),
                ) {
                    (Some(ln_before), Some(ln_after)) => {
                        acceptance_from_log_weights(ln_before, ln_after)
                    }
                    _ => {
                        let before = field.calculate_boltzmann_weight(timestep, &snapshot);
                        let after = field.calculate_boltzmann_weight(timestep, particles);
                        acceptance_from_weights(before, after)
                    }
                }
            }
        };

        let accepted = Self::accept(probability, rng);
        if !accepted {
            *particles = snapshot;
        }
        log::trace!(
            "box move to volume {:.4}: p = {:.4}, accepted = {}",
            new_box.volume(),
            probability,
            accepted
        );
        self.counters.record(MoveKind::Box, accepted);
        Ok(accepted)
    }
}
