//! Harmonic dihedral force compute
//!
//! Owns the per-type parameter table, the kernel for its execution target
//! and an [`Autotuner`] choosing the launch block size.

use crate::cpu_kernel::CpuDihedralKernel;
use crate::gpu_kernel::GpuDihedralKernel;
use crate::{
    Autotuner, ComputeError, ExecutionTarget, ForceAccumulator, ForceCompute, ParamTable,
    TunerConfig,
};
use particle_physics::{
    DihedralTable, HarmonicDihedralParams, ParticleData, PhysicsError, SystemDefinition,
};

enum DihedralKernel {
    Cpu(CpuDihedralKernel),
    Gpu(Box<GpuDihedralKernel>),
}

impl DihedralKernel {
    fn upload_params(&mut self, params: &[HarmonicDihedralParams]) {
        match self {
            DihedralKernel::Cpu(k) => k.upload_params(params),
            DihedralKernel::Gpu(k) => k.upload_params(params),
        }
    }

    fn upload_table(&mut self, table: &DihedralTable) {
        match self {
            DihedralKernel::Cpu(k) => k.upload_table(table),
            DihedralKernel::Gpu(k) => k.upload_table(table),
        }
    }

    fn prepare(&mut self, block_size: u32, n_particles: usize) -> Result<(), ComputeError> {
        match self {
            DihedralKernel::Cpu(k) => k.prepare(block_size),
            DihedralKernel::Gpu(k) => k.prepare(block_size, n_particles),
        }
    }

    fn launch(&mut self, block_size: u32, particles: &ParticleData) -> Result<(), ComputeError> {
        match self {
            DihedralKernel::Cpu(k) => k.launch(block_size, particles),
            DihedralKernel::Gpu(k) => k.launch(block_size, particles),
        }
    }

    fn accumulate(&self, accumulator: &mut ForceAccumulator) -> Result<(), ComputeError> {
        match self {
            DihedralKernel::Cpu(k) => k.accumulate(accumulator),
            DihedralKernel::Gpu(k) => k.accumulate(accumulator),
        }
    }
}

/// `V(φ) = ½ K [1 + d cos(n φ − φ₀)]` over every declared dihedral
pub struct HarmonicDihedralForceCompute {
    params: ParamTable<HarmonicDihedralParams>,
    type_names: Vec<String>,
    kernel: DihedralKernel,
    tuner: Autotuner,
    /// Topology revision and particle count the uploaded table was built for
    table_key: Option<(u64, usize)>,
}

impl HarmonicDihedralForceCompute {
    pub const NAME: &'static str = "dihedral_harmonic";

    pub fn new(
        target: &ExecutionTarget,
        sysdef: &SystemDefinition,
        tuner_config: &TunerConfig,
    ) -> Result<Self, ComputeError> {
        let n_types = sysdef.dihedrals().n_types();
        if n_types == 0 {
            log::warn!("{}: no dihedral types declared", Self::NAME);
        }

        let kernel = match target {
            ExecutionTarget::Cpu(cpu) => DihedralKernel::Cpu(CpuDihedralKernel::new(*cpu, n_types)),
            ExecutionTarget::Gpu(gpu) => {
                DihedralKernel::Gpu(Box::new(GpuDihedralKernel::new(gpu, n_types)))
            }
        };

        let mut tuner = Autotuner::new(
            Self::NAME,
            tuner_config.candidates.clone(),
            tuner_config.samples,
            tuner_config.period,
        )?
        .with_default(64);
        tuner.set_enabled(tuner_config.enabled);

        log::info!(
            "{}: {} dihedrals, {} types on {}",
            Self::NAME,
            sysdef.dihedrals().len(),
            n_types,
            target.describe()
        );

        Ok(Self {
            params: ParamTable::new(n_types),
            type_names: sysdef.dihedrals().type_names().to_vec(),
            kernel,
            tuner,
            table_key: None,
        })
    }

    /// Replace the whole record of `type_id`. Nothing changes on error.
    pub fn set_params(
        &mut self,
        type_id: u32,
        params: HarmonicDihedralParams,
    ) -> Result<(), ComputeError> {
        self.params.get(type_id)?;
        params.validate().map_err(|e| match e {
            PhysicsError::InvalidParams(message) => ComputeError::InvalidParams(message),
            other => ComputeError::Physics(other),
        })?;

        if params.k <= 0.0 {
            log::warn!(
                "{}: specified K <= 0 for type {} ({})",
                Self::NAME,
                type_id,
                params.k
            );
        }
        self.params.set(type_id, params)
    }

    /// [`set_params`](Self::set_params) addressed by type name
    pub fn set_params_by_name(
        &mut self,
        name: &str,
        params: HarmonicDihedralParams,
    ) -> Result<(), ComputeError> {
        let type_id = self
            .type_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ComputeError::InvalidParams(format!("unknown dihedral type '{name}'")))?;
        self.set_params(type_id as u32, params)
    }

    pub fn params(&self, type_id: u32) -> Result<HarmonicDihedralParams, ComputeError> {
        self.params.get(type_id).copied()
    }

    pub fn selected_block_size(&self) -> u32 {
        self.tuner.selected()
    }

    pub fn autotuner(&self) -> &Autotuner {
        &self.tuner
    }
}

impl ForceCompute for HarmonicDihedralForceCompute {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compute_forces(
        &mut self,
        timestep: u64,
        sysdef: &SystemDefinition,
        accumulator: &mut ForceAccumulator,
    ) -> Result<(), ComputeError> {
        let particles = sysdef.particles();
        let dihedrals = sysdef.dihedrals();
        if accumulator.len() != particles.len() {
            return Err(ComputeError::config(format!(
                "accumulator holds {} particles, system has {}",
                accumulator.len(),
                particles.len()
            )));
        }

        let key = (dihedrals.revision(), particles.len());
        if self.table_key != Some(key) {
            let table = dihedrals.build_table(particles.len());
            log::debug!(
                "{}: rebuilt dihedral table at step {} (width {})",
                Self::NAME,
                timestep,
                table.width
            );
            self.kernel.upload_table(&table);
            self.table_key = Some(key);
        }

        if let Some(records) = self.params.take_dirty() {
            self.kernel.upload_params(records);
        }

        if particles.is_empty() || dihedrals.is_empty() {
            return Ok(());
        }

        loop {
            // Refusals and pipeline compilation stay outside the timed bracket
            let block_size = self.tuner.peek();
            match self.kernel.prepare(block_size, particles.len()) {
                Ok(()) => {}
                Err(ComputeError::LaunchRejected { block_size, reason }) => {
                    log::debug!("{}: block size {} refused: {}", Self::NAME, block_size, reason);
                    self.tuner.reject(block_size)?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            let block_size = self.tuner.begin();
            match self.kernel.launch(block_size, particles) {
                Ok(()) => {
                    self.tuner.end();
                    break;
                }
                Err(ComputeError::LaunchRejected { block_size, reason }) => {
                    log::debug!("{}: block size {} refused: {}", Self::NAME, block_size, reason);
                    self.tuner.reject_current()?;
                }
                Err(e) => return Err(e),
            }
        }

        self.kernel.accumulate(accumulator)
    }

    fn set_autotuner_params(&mut self, enable: bool, period: u32) -> Result<(), ComputeError> {
        self.tuner.set_period(period)?;
        self.tuner.set_enabled(enable);
        Ok(())
    }
}
