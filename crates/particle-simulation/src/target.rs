//! Execution targets a force compute can launch its kernel on

use crate::{Backend, ComputeError, SimulationConfig};

/// Data-parallel CPU execution: particles are processed in rayon tasks of
/// `block_size` particles each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTarget {
    /// Block sizes above this are refused
    pub max_block_size: u32,
}

impl Default for CpuTarget {
    fn default() -> Self {
        Self {
            max_block_size: 1024,
        }
    }
}

impl CpuTarget {
    pub fn check_block_size(&self, block_size: u32) -> Result<(), ComputeError> {
        if block_size == 0 || block_size > self.max_block_size {
            return Err(ComputeError::LaunchRejected {
                block_size,
                reason: format!("CPU target accepts 1..={}", self.max_block_size),
            });
        }
        Ok(())
    }
}

/// wgpu device and queue used for compute launches
#[derive(Clone)]
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter_name", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

impl GpuContext {
    /// Request a high-performance adapter. With `adapter_filter`, the adapter
    /// name must contain it (case-insensitive).
    pub async fn new(adapter_filter: Option<&str>) -> Result<Self, ComputeError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ComputeError::device(format!("no GPU adapter: {e}")))?;

        let adapter_name = adapter.get_info().name;
        if let Some(filter) = adapter_filter {
            if !adapter_name
                .to_ascii_lowercase()
                .contains(&filter.to_ascii_lowercase())
            {
                return Err(ComputeError::device(format!(
                    "adapter '{adapter_name}' does not match '{filter}'"
                )));
            }
        }

        log::info!("✓ Using GPU: {}", adapter_name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Potential Compute Device"),
                required_features: wgpu::Features::empty(),
                // Take everything the adapter offers so large workgroups can be tuned
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| ComputeError::device(format!("device request failed: {e}")))?;

        Ok(Self::from_parts(device, queue, adapter_name))
    }

    /// Wrap a device created elsewhere (e.g. shared with a renderer)
    pub fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_name: impl Into<String>,
    ) -> Self {
        Self {
            device,
            queue,
            adapter_name: adapter_name.into(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Refuse block sizes the device cannot run as a single workgroup, or
    /// that would need more workgroups than one dispatch dimension allows.
    pub fn check_launch(&self, block_size: u32, n_threads: u32) -> Result<(), ComputeError> {
        let limits = self.device.limits();
        let max_block = limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x);

        if block_size == 0 || block_size > max_block {
            return Err(ComputeError::LaunchRejected {
                block_size,
                reason: format!("device allows at most {max_block} invocations per workgroup"),
            });
        }

        let groups = n_threads.div_ceil(block_size);
        if groups > limits.max_compute_workgroups_per_dimension {
            return Err(ComputeError::LaunchRejected {
                block_size,
                reason: format!(
                    "{groups} workgroups exceed the per-dimension limit of {}",
                    limits.max_compute_workgroups_per_dimension
                ),
            });
        }
        Ok(())
    }
}

/// Where a compute runs its kernel
#[derive(Debug, Clone)]
pub enum ExecutionTarget {
    Cpu(CpuTarget),
    Gpu(GpuContext),
}

impl ExecutionTarget {
    pub fn cpu() -> Self {
        ExecutionTarget::Cpu(CpuTarget::default())
    }

    /// Select the backend requested by `config`. `Backend::Auto` falls back
    /// to the CPU when no usable adapter exists.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ComputeError> {
        let cpu = CpuTarget {
            max_block_size: config.cpu_max_block_size,
        };
        match config.backend {
            Backend::Cpu => Ok(ExecutionTarget::Cpu(cpu)),
            Backend::Gpu => {
                let gpu = pollster::block_on(GpuContext::new(config.adapter.as_deref()))?;
                Ok(ExecutionTarget::Gpu(gpu))
            }
            Backend::Auto => match pollster::block_on(GpuContext::new(config.adapter.as_deref())) {
                Ok(gpu) => Ok(ExecutionTarget::Gpu(gpu)),
                Err(e) => {
                    log::warn!("GPU unavailable ({e}), falling back to the CPU target");
                    Ok(ExecutionTarget::Cpu(cpu))
                }
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ExecutionTarget::Cpu(cpu) => format!(
                "CPU ({} threads, block size <= {})",
                rayon::current_num_threads(),
                cpu.max_block_size
            ),
            ExecutionTarget::Gpu(gpu) => format!("GPU ({})", gpu.adapter_name()),
        }
    }
}
