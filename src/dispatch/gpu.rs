// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! GPU backend on wgpu.
//!
//! The device is opened and the kernel compiled when the dispatcher is
//! built.  A render then uploads its inputs once, submits one or more
//! launches on the single queue without reading anything back in
//! between, waits for the queue to drain, and downloads the results
//! once.  Every device call runs inside an error scope and any error
//! it reports ends the render.

use std::env;
use std::ops::Deref;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::Strategy;
use crate::error::{RenderError, Result};
use crate::escape::PointState;
use crate::kernel::{KernelSource, ENTRY_POINT};
use crate::planes::SampleGrid;

use super::{launch_count, Dispatcher};

/// Scalar kernel arguments.  Mirrors `Params` in both kernels.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Params {
    xsteps: u32,
    points: u32,
    max_iter: u32,
    max_loop: u32,
}

/// A device buffer that is destroyed when it goes out of scope, on
/// the error paths as well as the normal one.
struct DeviceBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
}

impl DeviceBuffer {
    fn with_contents(
        device: &wgpu::Device,
        label: &'static str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        });
        DeviceBuffer { label, buffer }
    }

    fn empty(
        device: &wgpu::Device,
        label: &'static str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        DeviceBuffer { label, buffer }
    }
}

impl Deref for DeviceBuffer {
    type Target = wgpu::Buffer;

    fn deref(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        trace!("releasing {} buffer", self.label);
        self.buffer.destroy();
    }
}

/// Environment variable that lets software adapters through.
pub const ALLOW_SOFTWARE_ENV: &str = "MANDEL_ALLOW_SOFTWARE_ADAPTER";

/// Which adapters the GPU backend may open.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdapterFilter {
    /// Discrete, integrated and virtual GPUs.
    Hardware,
    /// Software rasterisers as well, such as llvmpipe or WARP.
    AllowSoftware,
}

impl AdapterFilter {
    /// `AllowSoftware` when `MANDEL_ALLOW_SOFTWARE_ADAPTER` is set,
    /// `Hardware` otherwise.
    pub fn from_env() -> Self {
        if env::var_os(ALLOW_SOFTWARE_ENV).is_some() {
            AdapterFilter::AllowSoftware
        } else {
            AdapterFilter::Hardware
        }
    }

    fn accepts(self, device_type: wgpu::DeviceType) -> bool {
        match device_type {
            wgpu::DeviceType::DiscreteGpu
            | wgpu::DeviceType::IntegratedGpu
            | wgpu::DeviceType::VirtualGpu => true,
            wgpu::DeviceType::Cpu | wgpu::DeviceType::Other => {
                self == AdapterFilter::AllowSoftware
            }
        }
    }
}

/// The first device error raised outside an error scope.  wgpu hands
/// those to a callback; the dispatcher checks here after each wait.
#[derive(Clone, Default)]
struct UncapturedErrors(Arc<Mutex<Option<String>>>);

impl UncapturedErrors {
    fn record(&self, message: String) {
        error!("uncaptured device error: {}", message);
        if let Ok(mut first) = self.0.lock() {
            if first.is_none() {
                *first = Some(message);
            }
        }
    }

    fn check(&self) -> Result<()> {
        let first = match self.0.lock() {
            Ok(mut first) => first.take(),
            Err(_) => Some("device error record poisoned".to_string()),
        };
        match first {
            Some(message) => Err(RenderError::Device(message)),
            None => Ok(()),
        }
    }
}

/// Work-group counts along x and y needed to cover `points` work
/// items with groups of `workgroup_size`, folding into the second
/// dimension once `max_per_dimension` groups are exceeded.  The kernel
/// rebuilds the linear index as `y * groups_x * workgroup_size + x`
/// and ignores indices past the end.
pub fn dispatch_size(
    points: u32,
    workgroup_size: u32,
    max_per_dimension: u32,
) -> Result<(u32, u32)> {
    let workgroup_size = u64::from(workgroup_size.max(1));
    let max_per_dimension = u64::from(max_per_dimension.max(1));
    let groups = (u64::from(points) + workgroup_size - 1) / workgroup_size;
    if groups <= max_per_dimension {
        return Ok((groups as u32, 1));
    }
    let rows = (groups + max_per_dimension - 1) / max_per_dimension;
    if rows > max_per_dimension {
        return Err(RenderError::Limit(format!(
            "{} work groups do not fit a {}x{} dispatch",
            groups, max_per_dimension, max_per_dimension
        )));
    }
    Ok((max_per_dimension as u32, rows as u32))
}

fn compilation_log(info: &wgpu::CompilationInfo) -> String {
    info.messages
        .iter()
        .map(|message| {
            let kind = match message.message_type {
                wgpu::CompilationMessageType::Error => "error",
                wgpu::CompilationMessageType::Warning => "warning",
                wgpu::CompilationMessageType::Info => "info",
            };
            match message.location {
                Some(ref location) => format!(
                    "{}:{}: {}: {}",
                    location.line_number, location.line_position, kind, message.message
                ),
                None => format!("{}: {}", kind, message.message),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs the escape evaluator as a wgpu compute pipeline.
pub struct GpuDispatcher {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: wgpu::Limits,
    pipeline: wgpu::ComputePipeline,
    strategy: Strategy,
    workgroup_size: u32,
    uncaptured: UncapturedErrors,
}

impl GpuDispatcher {
    /// Opens the first adapter on any backend that `filter` accepts and
    /// compiles `kernel` for `strategy` with the given work-group size.
    pub fn new(
        kernel: &KernelSource,
        strategy: Strategy,
        workgroup_size: u32,
        filter: AdapterFilter,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .find(|adapter| filter.accepts(adapter.get_info().device_type))
            .ok_or(RenderError::NoAdapter)?;
        let info = adapter.get_info();
        info!(
            "using {} ({:?}, {:?} backend)",
            info.name, info.device_type, info.backend
        );

        let limits = adapter.limits();
        if workgroup_size > limits.max_compute_workgroup_size_x
            || workgroup_size > limits.max_compute_invocations_per_workgroup
        {
            return Err(RenderError::Limit(format!(
                "work-group size {} exceeds the device maximum of {}",
                workgroup_size,
                limits
                    .max_compute_workgroup_size_x
                    .min(limits.max_compute_invocations_per_workgroup)
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("mandel"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

        // Errors outside a scope would otherwise panic inside wgpu.
        let uncaptured = UncapturedErrors::default();
        let sink = uncaptured.clone();
        device.on_uncaptured_error(Box::new(move |e: wgpu::Error| {
            sink.record(e.to_string());
        }));

        let pipeline = GpuDispatcher::build(&device, kernel, workgroup_size)?;
        debug!(
            "built {} from {} with work-group size {}",
            ENTRY_POINT,
            kernel.describe(),
            workgroup_size
        );

        Ok(GpuDispatcher {
            device,
            queue,
            limits,
            pipeline,
            strategy,
            workgroup_size,
            uncaptured,
        })
    }

    /// Compiles the kernel.  A failure carries the compiler messages.
    fn build(
        device: &wgpu::Device,
        kernel: &KernelSource,
        workgroup_size: u32,
    ) -> Result<wgpu::ComputePipeline> {
        let source = kernel.with_workgroup_size(workgroup_size)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(ENTRY_POINT),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let info = pollster::block_on(module.get_compilation_info());
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(ENTRY_POINT),
            layout: None,
            module: &module,
            entry_point: Some(ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        match pollster::block_on(device.pop_error_scope()) {
            None => Ok(pipeline),
            Some(e) => {
                let mut log = compilation_log(&info);
                if !log.is_empty() {
                    log.push('\n');
                }
                log.push_str(&format!("{}: {}", kernel.describe(), e));
                Err(RenderError::KernelBuild { log })
            }
        }
    }

    /// Runs `f` inside an error scope for `filter`, turning a captured
    /// error into `fail`.
    fn scoped<T, F>(
        &self,
        filter: wgpu::ErrorFilter,
        fail: fn(String) -> RenderError,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        self.device.push_error_scope(filter);
        let value = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(e) => Err(fail(e.to_string())),
        }
    }

    fn check_size(&self, label: &str, bytes: u64) -> Result<()> {
        let limit = u64::from(self.limits.max_storage_buffer_binding_size)
            .min(self.limits.max_buffer_size);
        if bytes > limit {
            return Err(RenderError::Limit(format!(
                "{} buffer needs {} bytes, the device allows {}",
                label, bytes, limit
            )));
        }
        Ok(())
    }

    fn uniform(&self, params: &Params) -> DeviceBuffer {
        DeviceBuffer::with_contents(
            &self.device,
            "params",
            bytemuck::bytes_of(params),
            wgpu::BufferUsages::UNIFORM,
        )
    }

    fn staging(&self, size: u64) -> DeviceBuffer {
        DeviceBuffer::empty(
            &self.device,
            "staging",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )
    }

    fn bind_group(&self, buffers: &[&DeviceBuffer]) -> Result<wgpu::BindGroup> {
        let layout = self.pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.scoped(wgpu::ErrorFilter::Validation, RenderError::Device, || {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mandel_iters bindings"),
                layout: &layout,
                entries: &entries,
            })
        })
    }

    /// Submits `launches` dispatches over the whole index space, one
    /// command buffer each, and blocks until the queue has drained.
    fn launch(&self, bind_group: &wgpu::BindGroup, points: u32, launches: u32) -> Result<()> {
        let (groups_x, groups_y) = dispatch_size(
            points,
            self.workgroup_size,
            self.limits.max_compute_workgroups_per_dimension,
        )?;
        debug!(
            "{} launch(es) of {}x{} work groups of {}",
            launches, groups_x, groups_y, self.workgroup_size
        );

        let started = Instant::now();
        let last = self.scoped(wgpu::ErrorFilter::Validation, RenderError::Device, || {
            let mut last = None;
            for launch in 0..launches {
                let mut encoder =
                    self.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("mandel_iters launch"),
                        });
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("mandel_iters"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(groups_x, groups_y, 1);
                }
                last = Some(self.queue.submit(Some(encoder.finish())));
                trace!("submitted launch {}/{}", launch + 1, launches);
            }
            last
        })?;

        if let Some(index) = last {
            self.device.poll(wgpu::Maintain::wait_for(index));
        }
        self.uncaptured.check()?;
        info!(
            "{} launch(es) finished in {:.3}s",
            launches,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Copies `source` into `staging` and reads it back.
    fn download<T: Pod>(&self, source: &DeviceBuffer, staging: &DeviceBuffer) -> Result<Vec<T>> {
        let size = staging.size();
        self.scoped(wgpu::ErrorFilter::Validation, RenderError::Device, || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("download"),
                });
            encoder.copy_buffer_to_buffer(source, 0, staging, 0, size);
            self.queue.submit(Some(encoder.finish()));
        })?;

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Map(e.to_string()))?
            .map_err(|e| RenderError::Map(e.to_string()))?;
        self.uncaptured.check()?;

        let data = slice.get_mapped_range();
        let values = bytemuck::cast_slice::<u8, T>(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(values)
    }

    fn expect_strategy(&self, single_shot: bool) -> Result<()> {
        let built_single_shot = self.strategy == Strategy::SingleShot;
        if built_single_shot != single_shot {
            return Err(RenderError::Config(format!(
                "dispatcher was built for the {:?} kernel",
                self.strategy
            )));
        }
        Ok(())
    }
}

impl Dispatcher for GpuDispatcher {
    fn single_shot(&mut self, grid: &SampleGrid, max_iter: u32) -> Result<Vec<u32>> {
        self.expect_strategy(true)?;
        let points = grid.len() as u32;
        let iters_size = (grid.len() * std::mem::size_of::<u32>()) as u64;
        self.check_size("reals", (grid.width() * std::mem::size_of::<f32>()) as u64)?;
        self.check_size("imags", (grid.height() * std::mem::size_of::<f32>()) as u64)?;
        self.check_size("iters", iters_size)?;

        let params = Params {
            xsteps: grid.width() as u32,
            points,
            max_iter,
            max_loop: max_iter,
        };
        let (params, reals, imags, iters, staging) =
            self.scoped(wgpu::ErrorFilter::OutOfMemory, RenderError::Allocation, || {
                (
                    self.uniform(&params),
                    DeviceBuffer::with_contents(
                        &self.device,
                        "reals",
                        bytemuck::cast_slice(&grid.reals),
                        wgpu::BufferUsages::STORAGE,
                    ),
                    DeviceBuffer::with_contents(
                        &self.device,
                        "imags",
                        bytemuck::cast_slice(&grid.imags),
                        wgpu::BufferUsages::STORAGE,
                    ),
                    DeviceBuffer::empty(
                        &self.device,
                        "iters",
                        iters_size,
                        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    ),
                    self.staging(iters_size),
                )
            })?;
        debug!("uploaded {} columns and {} rows", grid.width(), grid.height());

        let bind_group = self.bind_group(&[&params, &reals, &imags, &iters])?;
        self.launch(&bind_group, points, 1)?;
        self.download(&iters, &staging)
    }

    fn resumable(
        &mut self,
        states: &mut [PointState],
        max_iter: u32,
        max_loop: u32,
    ) -> Result<()> {
        self.expect_strategy(false)?;
        let points = states.len() as u32;
        let state_size = (states.len() * std::mem::size_of::<PointState>()) as u64;
        self.check_size("state", state_size)?;

        let params = Params {
            xsteps: 0,
            points,
            max_iter,
            max_loop,
        };
        let (params, state, staging) =
            self.scoped(wgpu::ErrorFilter::OutOfMemory, RenderError::Allocation, || {
                (
                    self.uniform(&params),
                    DeviceBuffer::with_contents(
                        &self.device,
                        "state",
                        bytemuck::cast_slice(states),
                        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    ),
                    self.staging(state_size),
                )
            })?;
        debug!("uploaded {} point states ({} bytes)", points, state_size);

        let bind_group = self.bind_group(&[&params, &state])?;
        self.launch(&bind_group, points, launch_count(max_iter, max_loop))?;
        let finished: Vec<PointState> = self.download(&state, &staging)?;
        states.copy_from_slice(&finished);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_grids_use_one_dimension() {
        assert_eq!(dispatch_size(800 * 600, 64, 65535).unwrap(), (7500, 1));
        assert_eq!(dispatch_size(1, 256, 65535).unwrap(), (1, 1));
        assert_eq!(dispatch_size(257, 256, 65535).unwrap(), (2, 1));
    }

    #[test]
    fn large_grids_fold_into_two_dimensions() {
        let (x, y) = dispatch_size(10_000, 1, 1000).unwrap();
        assert_eq!((x, y), (1000, 10));
        let (x, y) = dispatch_size(10_001, 1, 1000).unwrap();
        assert_eq!((x, y), (1000, 11));
        assert!(u64::from(x) * u64::from(y) >= 10_001);
    }

    #[test]
    fn oversized_dispatch_is_rejected() {
        assert!(dispatch_size(u32::max_value(), 1, 1000).is_err());
    }

    #[test]
    fn params_match_the_wgsl_layout() {
        assert_eq!(std::mem::size_of::<Params>(), 16);
    }

    #[test]
    fn hardware_filter_refuses_software_adapters() {
        let filter = AdapterFilter::Hardware;
        assert!(filter.accepts(wgpu::DeviceType::DiscreteGpu));
        assert!(filter.accepts(wgpu::DeviceType::IntegratedGpu));
        assert!(filter.accepts(wgpu::DeviceType::VirtualGpu));
        assert!(!filter.accepts(wgpu::DeviceType::Cpu));
        assert!(!filter.accepts(wgpu::DeviceType::Other));
    }

    #[test]
    fn software_filter_takes_anything() {
        let filter = AdapterFilter::AllowSoftware;
        assert!(filter.accepts(wgpu::DeviceType::DiscreteGpu));
        assert!(filter.accepts(wgpu::DeviceType::Cpu));
        assert!(filter.accepts(wgpu::DeviceType::Other));
    }

    #[test]
    fn uncaptured_error_fails_the_next_check() {
        let errors = UncapturedErrors::default();
        assert!(errors.check().is_ok());

        let handler = errors.clone();
        handler.record("buffer destroyed while mapped".to_string());
        handler.record("a later error".to_string());
        match errors.check() {
            Err(RenderError::Device(message)) => {
                assert_eq!(message, "buffer destroyed while mapped")
            }
            other => panic!("expected a device error, got {:?}", other),
        }
        // Reported once.
        assert!(errors.check().is_ok());
    }
}
