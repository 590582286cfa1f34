//! Force compute interface used by the integrator

use crate::{ComputeError, ForceAccumulator};
use particle_physics::SystemDefinition;

/// One potential evaluated over the whole system each step.
///
/// Implementations add their contribution to the accumulator and never
/// overwrite what other computes already stored there.
pub trait ForceCompute {
    fn name(&self) -> &str;

    /// Add this potential's forces, energies and virials for `timestep`
    fn compute_forces(
        &mut self,
        timestep: u64,
        sysdef: &SystemDefinition,
        accumulator: &mut ForceAccumulator,
    ) -> Result<(), ComputeError>;

    /// Enable/disable launch tuning and set its period. Computes without an
    /// autotuner ignore this.
    fn set_autotuner_params(&mut self, _enable: bool, _period: u32) -> Result<(), ComputeError> {
        Ok(())
    }
}

/// The computes registered with an integrator
#[derive(Default)]
pub struct ForceSet {
    computes: Vec<Box<dyn ForceCompute>>,
}

impl ForceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, compute: Box<dyn ForceCompute>) {
        log::info!("Registered force compute '{}'", compute.name());
        self.computes.push(compute);
    }

    pub fn len(&self) -> usize {
        self.computes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computes.is_empty()
    }

    /// Zero the accumulator and add every registered compute into it
    pub fn compute(
        &mut self,
        timestep: u64,
        sysdef: &SystemDefinition,
        accumulator: &mut ForceAccumulator,
    ) -> Result<(), ComputeError> {
        accumulator.reset(sysdef.particles().len());
        for compute in &mut self.computes {
            compute.compute_forces(timestep, sysdef, accumulator)?;
        }
        Ok(())
    }

    pub fn set_autotuner_params(&mut self, enable: bool, period: u32) -> Result<(), ComputeError> {
        for compute in &mut self.computes {
            compute.set_autotuner_params(enable, period)?;
        }
        Ok(())
    }
}
