//! rayon implementation of the harmonic dihedral kernel
//!
//! Mirrors the GPU kernel: the particle range is split into chunks of
//! `block_size` and each particle sums its own dihedral entries in table
//! order, so the output is identical for every block size.

use crate::{ComputeError, CpuTarget, ForceAccumulator};
use glam::DVec3;
use particle_physics::{
    evaluate_harmonic_dihedral, BoxDim, DihedralTable, HarmonicDihedralParams, ParticleData,
};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ParticleOut {
    force: DVec3,
    energy: f64,
    virial: [f64; 6],
}

#[derive(Debug, Clone)]
pub struct CpuDihedralKernel {
    target: CpuTarget,
    /// Published copy of the per-type records, the only one launches read
    params: Vec<HarmonicDihedralParams>,
    table: DihedralTable,
    output: Vec<ParticleOut>,
}

impl CpuDihedralKernel {
    pub fn new(target: CpuTarget, n_types: u32) -> Self {
        Self {
            target,
            params: vec![HarmonicDihedralParams::default(); n_types as usize],
            table: DihedralTable::build(&[], 0),
            output: Vec::new(),
        }
    }

    pub fn upload_params(&mut self, params: &[HarmonicDihedralParams]) {
        self.params.clear();
        self.params.extend_from_slice(params);
    }

    pub fn upload_table(&mut self, table: &DihedralTable) {
        self.table = table.clone();
        self.output.resize(table.n_particles, ParticleOut::default());
    }

    /// Refuse `block_size` before the launch is timed
    pub fn prepare(&self, block_size: u32) -> Result<(), ComputeError> {
        self.target.check_block_size(block_size)
    }

    pub fn launch(
        &mut self,
        block_size: u32,
        particles: &ParticleData,
    ) -> Result<(), ComputeError> {
        self.target.check_block_size(block_size)?;

        let positions = particles.positions();
        let box_dim = particles.box_dim();
        let table = &self.table;
        let params = &self.params;

        self.output
            .par_chunks_mut(block_size as usize)
            .enumerate()
            .try_for_each(|(block, chunk)| {
                let first = block * block_size as usize;
                for (offset, out) in chunk.iter_mut().enumerate() {
                    *out = evaluate_particle(first + offset, table, params, positions, box_dim)?;
                }
                Ok(())
            })
    }

    pub fn accumulate(&self, accumulator: &mut ForceAccumulator) -> Result<(), ComputeError> {
        for (i, out) in self.output.iter().enumerate() {
            accumulator.add(i, out.force, out.energy, out.virial);
        }
        Ok(())
    }
}

fn evaluate_particle(
    index: usize,
    table: &DihedralTable,
    params: &[HarmonicDihedralParams],
    positions: &[DVec3],
    box_dim: &BoxDim,
) -> Result<ParticleOut, ComputeError> {
    let mut out = ParticleOut::default();
    for entry in table.entries_of(index) {
        let p = params.get(entry.type_id as usize).ok_or(ComputeError::TypeOutOfRange {
            type_id: entry.type_id,
            n_types: params.len() as u32,
        })?;
        let members = entry.members.map(|m| positions[m as usize]);
        let eval = evaluate_harmonic_dihedral(p, members, box_dim);

        out.force += eval.forces[entry.slot as usize];
        out.energy += 0.25 * eval.energy;
        for (acc, v) in out.virial.iter_mut().zip(eval.virial) {
            *acc += 0.25 * v;
        }
    }
    Ok(out)
}
