//! wgpu implementation of the harmonic dihedral kernel
//!
//! One invocation per particle walks that particle's row of the dihedral
//! table. A compute pipeline is built lazily for every workgroup size the
//! autotuner asks for.

use crate::{ComputeError, ForceAccumulator, GpuContext};
use bytemuck::{Pod, Zeroable};
use glam::DVec3;
use particle_physics::{BoxDim, DihedralEntry, DihedralTable, HarmonicDihedralParams, ParticleData};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

const SHADER_SOURCE: &str = include_str!("shaders/harmonic_dihedral.wgsl");
const BLOCK_SIZE_TOKEN: &str = "__BLOCK_SIZE__";

/// Box and size uniform (matches WGSL `SimParams`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SimParams {
    lengths: [f32; 4],
    tilts: [f32; 4],
    sizes: [u32; 4],
}

/// Bit `k` set when axis `k` is periodic
fn periodic_mask(box_dim: &BoxDim) -> u32 {
    let [x, y, z] = box_dim.periodic();
    u32::from(x) | (u32::from(y) << 1) | (u32::from(z) << 2)
}

impl SimParams {
    fn new(box_dim: &BoxDim, n_particles: u32, pitch: u32) -> Self {
        let l = box_dim.lengths();
        let t = box_dim.tilts();
        Self {
            lengths: [
                l.x as f32,
                l.y as f32,
                l.z as f32,
                if box_dim.is_2d() { 1.0 } else { 0.0 },
            ],
            tilts: [t.x as f32, t.y as f32, t.z as f32, 0.0],
            sizes: [n_particles, pitch, periodic_mask(box_dim), 0],
        }
    }
}

/// Per-particle result (matches WGSL `ForceOut`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ForceOut {
    force_energy: [f32; 4],
    virial_a: [f32; 4],
    virial_b: [f32; 4],
}

pub struct GpuDihedralKernel {
    gpu: GpuContext,

    // Buffers
    position_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    table_buffer: wgpu::Buffer,
    count_buffer: wgpu::Buffer,
    sim_buffer: wgpu::Buffer,
    output_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,

    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group: wgpu::BindGroup,
    pipelines: HashMap<u32, wgpu::ComputePipeline>,

    n_particles: usize,
    pitch: usize,
    table_capacity: usize,
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
    extra: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        // Zero-sized bindings are invalid
        size: size.max(16),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | extra,
        mapped_at_creation: false,
    })
}

impl GpuDihedralKernel {
    pub fn new(gpu: &GpuContext, n_types: u32) -> Self {
        let device = gpu.device();
        log::info!("Initializing GPU dihedral kernel...");

        let params = vec![HarmonicDihedralParams::default().to_gpu(); n_types.max(1) as usize];
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Dihedral Params Buffer"),
            contents: bytemuck::cast_slice(&params),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let sim_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Dihedral Sim Params Buffer"),
            contents: bytemuck::cast_slice(&[SimParams::zeroed()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let none = wgpu::BufferUsages::empty();
        let position_buffer = storage_buffer(device, "Position Buffer", 0, none);
        let table_buffer = storage_buffer(device, "Dihedral Table Buffer", 0, none);
        let count_buffer = storage_buffer(device, "Dihedral Count Buffer", 0, none);
        let output_buffer =
            storage_buffer(device, "Dihedral Output Buffer", 0, wgpu::BufferUsages::COPY_SRC);
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Dihedral Staging Buffer"),
            size: 16,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // 0: positions, 1: params, 2: table, 3: counts, 4: sim params, 5: output
        let read_only = wgpu::BufferBindingType::Storage { read_only: true };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Dihedral Bind Group Layout"),
            entries: &[
                buffer_entry(0, read_only),
                buffer_entry(1, read_only),
                buffer_entry(2, read_only),
                buffer_entry(3, read_only),
                buffer_entry(4, wgpu::BufferBindingType::Uniform),
                buffer_entry(5, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Dihedral Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let bind_group = Self::create_bind_group(
            device,
            &bind_group_layout,
            [
                &position_buffer,
                &params_buffer,
                &table_buffer,
                &count_buffer,
                &sim_buffer,
                &output_buffer,
            ],
        );

        Self {
            gpu: gpu.clone(),
            position_buffer,
            params_buffer,
            table_buffer,
            count_buffer,
            sim_buffer,
            output_buffer,
            staging_buffer,
            bind_group_layout,
            pipeline_layout,
            bind_group,
            pipelines: HashMap::new(),
            n_particles: 0,
            pitch: 0,
            table_capacity: 0,
        }
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffers: [&wgpu::Buffer; 6],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dihedral Bind Group"),
            layout,
            entries: &entries,
        })
    }

    fn rebuild_bind_group(&mut self) {
        self.bind_group = Self::create_bind_group(
            self.gpu.device(),
            &self.bind_group_layout,
            [
                &self.position_buffer,
                &self.params_buffer,
                &self.table_buffer,
                &self.count_buffer,
                &self.sim_buffer,
                &self.output_buffer,
            ],
        );
    }

    /// Publish the per-type parameter records
    pub fn upload_params(&mut self, params: &[HarmonicDihedralParams]) {
        let records: Vec<[f32; 4]> = params.iter().map(HarmonicDihedralParams::to_gpu).collect();
        if records.is_empty() {
            return;
        }
        self.gpu
            .queue()
            .write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&records));
    }

    /// Publish a rebuilt dihedral table, growing buffers when the particle
    /// count or table width changed
    pub fn upload_table(&mut self, table: &DihedralTable) {
        let device = self.gpu.device();
        let mut rebuilt = false;

        if table.n_particles != self.n_particles {
            let n = table.n_particles as u64;
            let none = wgpu::BufferUsages::empty();
            self.position_buffer = storage_buffer(device, "Position Buffer", n * 16, none);
            self.count_buffer = storage_buffer(device, "Dihedral Count Buffer", n * 4, none);
            let out_size = n * std::mem::size_of::<ForceOut>() as u64;
            self.output_buffer = storage_buffer(
                device,
                "Dihedral Output Buffer",
                out_size,
                wgpu::BufferUsages::COPY_SRC,
            );
            self.staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Dihedral Staging Buffer"),
                size: out_size.max(16),
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.n_particles = table.n_particles;
            rebuilt = true;
        }

        if table.entries.len() > self.table_capacity {
            let size = (table.entries.len() * std::mem::size_of::<DihedralEntry>()) as u64;
            self.table_buffer = storage_buffer(
                device,
                "Dihedral Table Buffer",
                size,
                wgpu::BufferUsages::empty(),
            );
            self.table_capacity = table.entries.len();
            rebuilt = true;
        }

        if rebuilt {
            log::debug!(
                "Dihedral buffers resized: {} particles, table width {}",
                table.n_particles,
                table.width
            );
            self.rebuild_bind_group();
        }

        let queue = self.gpu.queue();
        if !table.counts.is_empty() {
            queue.write_buffer(&self.count_buffer, 0, bytemuck::cast_slice(&table.counts));
        }
        if !table.entries.is_empty() {
            queue.write_buffer(&self.table_buffer, 0, bytemuck::cast_slice(&table.entries));
        }
        self.pitch = table.n_particles;
    }

    fn pipeline(&mut self, block_size: u32) -> &wgpu::ComputePipeline {
        let device = self.gpu.device();
        let layout = &self.pipeline_layout;
        self.pipelines.entry(block_size).or_insert_with(|| {
            log::debug!("Compiling dihedral pipeline for workgroup size {}", block_size);
            let source = SHADER_SOURCE.replace(BLOCK_SIZE_TOKEN, &block_size.to_string());
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Harmonic Dihedral Shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Harmonic Dihedral Pipeline"),
                layout: Some(layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })
    }

    /// Check `block_size` against the device limits for `n_particles` and
    /// compile its pipeline, so neither is part of a timed launch
    pub fn prepare(&mut self, block_size: u32, n_particles: usize) -> Result<(), ComputeError> {
        self.gpu.check_launch(block_size, n_particles as u32)?;
        self.pipeline(block_size);
        Ok(())
    }

    /// Run the kernel with `block_size` invocations per workgroup and wait
    /// for it to finish
    pub fn launch(
        &mut self,
        block_size: u32,
        particles: &ParticleData,
    ) -> Result<(), ComputeError> {
        let n = particles.len() as u32;
        self.gpu.check_launch(block_size, n)?;

        let positions: Vec<[f32; 4]> = particles
            .positions()
            .iter()
            .map(|r| [r.x as f32, r.y as f32, r.z as f32, 0.0])
            .collect();
        let sim = SimParams::new(particles.box_dim(), n, self.pitch as u32);

        let queue = self.gpu.queue().clone();
        if !positions.is_empty() {
            queue.write_buffer(&self.position_buffer, 0, bytemuck::cast_slice(&positions));
        }
        queue.write_buffer(&self.sim_buffer, 0, bytemuck::cast_slice(&[sim]));

        let workgroup_count = n.div_ceil(block_size);
        let pipeline = self.pipeline(block_size).clone();

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Dihedral Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Harmonic Dihedral Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroup_count, 1, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));

        self.gpu
            .device()
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| ComputeError::device(format!("dihedral kernel did not complete: {e}")))?;
        Ok(())
    }

    /// Copy the last launch's results back and add them to `accumulator`
    pub fn accumulate(&self, accumulator: &mut ForceAccumulator) -> Result<(), ComputeError> {
        if self.n_particles == 0 {
            return Ok(());
        }
        let size = (self.n_particles * std::mem::size_of::<ForceOut>()) as u64;

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Dihedral Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.output_buffer, 0, &self.staging_buffer, 0, size);
        self.gpu.queue().submit(std::iter::once(encoder.finish()));

        let slice = self.staging_buffer.slice(..size);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.gpu
            .device()
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| ComputeError::Readback(e.to_string()))?;
        receiver
            .recv()
            .map_err(|_| ComputeError::Readback("map callback channel closed".into()))?
            .map_err(|e| ComputeError::Readback(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            let results: &[ForceOut] = bytemuck::cast_slice(&data);
            for (i, out) in results.iter().enumerate() {
                let [fx, fy, fz, energy] = out.force_energy;
                let [xx, xy, xz, yy] = out.virial_a;
                let [yz, zz, _, _] = out.virial_b;
                accumulator.add(
                    i,
                    DVec3::new(fx as f64, fy as f64, fz as f64),
                    energy as f64,
                    [xx, xy, xz, yy, yz, zz].map(f64::from),
                );
            }
        }
        self.staging_buffer.unmap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_compiles_outside_launch() {
        let gpu = match pollster::block_on(GpuContext::new(None)) {
            Ok(gpu) => gpu,
            Err(e) => {
                eprintln!("skipping GPU kernel test: {e}");
                return;
            }
        };
        let mut kernel = GpuDihedralKernel::new(&gpu, 1);
        assert!(kernel.pipelines.is_empty());

        kernel.prepare(64, 1000).unwrap();
        assert!(kernel.pipelines.contains_key(&64));
        assert_eq!(kernel.pipelines.len(), 1);

        // Refused sizes are never compiled
        assert!(matches!(
            kernel.prepare(u32::MAX, 1000),
            Err(ComputeError::LaunchRejected { .. })
        ));
        assert!(!kernel.pipelines.contains_key(&u32::MAX));
    }

    #[test]
    fn test_periodic_mask() {
        let mut box_dim = BoxDim::cube(4.0).unwrap();
        assert_eq!(periodic_mask(&box_dim), 0b111);
        box_dim.set_periodic([true, false, false]);
        assert_eq!(periodic_mask(&box_dim), 0b001);
        box_dim.set_periodic([false, true, false]);
        assert_eq!(SimParams::new(&box_dim, 3, 3).sizes, [3, 3, 0b010, 0]);
    }
}
