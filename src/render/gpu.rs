//! wgpu compute backend.
//!
//! One invocation per pixel composites every circle and writes the pixel's squared error; the
//! host reduces the error buffer. Results are cached by a bit-exact hash of the parameter vector.
//!
//! Any failure after the device has been acquired flips the renderer into a permanent degraded
//! mode in which an internal [`CpuRenderer`] serves every call.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use wgpu::util::DeviceExt as _;

use crate::foundation::core::{Canvas, WHITE};
use crate::foundation::error::{CircleFitError, CircleFitResult};
use crate::params::{Bounds, PARAMS_PER_CIRCLE, circle_count, decode, fingerprint};
use crate::render::backend::{BackendId, Renderer};
use crate::render::cpu::CpuRenderer;
use crate::render::factory::Cleanup;
use crate::render::raster::Paint;

const SHADER: &str = include_str!("shaders/render_cost.wgsl");
const WORKGROUP_SIZE: u32 = 64;
const MAX_GROUPS_X: u32 = 65_535;

/// Uniform block read by the shader; padded to 16 bytes.
#[derive(Copy, Clone)]
struct Dims {
    circle_count: u32,
    width: u32,
    height: u32,
}

impl Dims {
    fn words(self) -> [u32; 4] {
        [self.circle_count, self.width, self.height, 0]
    }
}

/// Device objects owned by one renderer.
///
/// Fields are declared in reverse acquisition order, so dropping releases buffers first and the
/// instance last.
struct GpuResources {
    bind_group: wgpu::BindGroup,
    error_staging: wgpu::Buffer,
    color_staging: wgpu::Buffer,
    error_buf: wgpu::Buffer,
    color_buf: wgpu::Buffer,
    reference_buf: wgpu::Buffer,
    dims_buf: wgpu::Buffer,
    params_buf: wgpu::Buffer,
    pipeline: wgpu::ComputePipeline,
    _bind_group_layout: wgpu::BindGroupLayout,
    _shader: wgpu::ShaderModule,
    queue: wgpu::Queue,
    device: wgpu::Device,
    _adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
}

impl GpuResources {
    fn release(self) {
        for buf in [
            &self.error_staging,
            &self.color_staging,
            &self.error_buf,
            &self.color_buf,
            &self.reference_buf,
            &self.dims_buf,
            &self.params_buf,
        ] {
            buf.destroy();
        }
        drop(self);
        tracing::debug!("gpu resources released");
    }
}

/// Device-side state acquired before any fallible setup step.
struct DeviceHandles {
    queue: wgpu::Queue,
    device: wgpu::Device,
    adapter: wgpu::Adapter,
    instance: wgpu::Instance,
}

fn acquire_device() -> CircleFitResult<DeviceHandles> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .map_err(|e| CircleFitError::backend_unavailable(format!("no gpu adapter: {e}")))?;

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("circlefit"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        experimental_features: wgpu::ExperimentalFeatures::default(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::Off,
    }))
    .map_err(|e| CircleFitError::backend_unavailable(format!("wgpu request_device failed: {e}")))?;

    let info = adapter.get_info();
    tracing::info!(
        adapter = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "gpu adapter selected"
    );

    Ok(DeviceHandles {
        queue,
        device,
        adapter,
        instance,
    })
}

/// Run `f` inside validation and out-of-memory error scopes.
fn scoped<T>(device: &wgpu::Device, what: &str, f: impl FnOnce() -> T) -> CircleFitResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let out = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    match validation.or(oom) {
        Some(e) => Err(CircleFitError::gpu(format!("{what}: {e}"))),
        None => Ok(out),
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn reference_floats(reference: &Canvas) -> Vec<f32> {
    let mut out = Vec::with_capacity(reference.pixel_count() * 4);
    for y in 0..reference.height() {
        out.extend(reference.row(y).iter().map(|&b| f32::from(b) / 255.0));
    }
    out
}

fn build_resources(
    handles: DeviceHandles,
    reference: &Canvas,
    capacity: usize,
) -> CircleFitResult<GpuResources> {
    let DeviceHandles {
        queue,
        device,
        adapter,
        instance,
    } = handles;

    let pixels = reference.pixel_count() as u64;
    let f32_size = std::mem::size_of::<f32>() as u64;
    let params_bytes = (capacity.max(1) * PARAMS_PER_CIRCLE) as u64 * f32_size;
    let color_bytes = pixels * 4 * f32_size;
    let error_bytes = pixels * f32_size;

    let (shader, bind_group_layout, pipeline) = scoped(&device, "pipeline setup", || {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("render_cost.wgsl"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("render_cost bgl"),
            entries: &[
                storage_entry(0, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("render_cost layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("render_cost"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        (shader, bind_group_layout, pipeline)
    })?;

    let buffers = scoped(&device, "buffer allocation", || {
        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | extra,
                mapped_at_creation: false,
            })
        };
        let staging = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let params_buf = storage("params", params_bytes, wgpu::BufferUsages::COPY_DST);
        let dims_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("dims"),
            size: std::mem::size_of::<[u32; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let reference_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("reference"),
            contents: bytemuck::cast_slice(&reference_floats(reference)),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let color_buf = storage("out_color", color_bytes, wgpu::BufferUsages::COPY_SRC);
        let error_buf = storage("out_error", error_bytes, wgpu::BufferUsages::COPY_SRC);
        let color_staging = staging("out_color staging", color_bytes);
        let error_staging = staging("out_error staging", error_bytes);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("render_cost bg"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dims_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: reference_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: color_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: error_buf.as_entire_binding(),
                },
            ],
        });

        (
            bind_group,
            error_staging,
            color_staging,
            error_buf,
            color_buf,
            reference_buf,
            dims_buf,
            params_buf,
        )
    })?;
    let (
        bind_group,
        error_staging,
        color_staging,
        error_buf,
        color_buf,
        reference_buf,
        dims_buf,
        params_buf,
    ) = buffers;

    Ok(GpuResources {
        bind_group,
        error_staging,
        color_staging,
        error_buf,
        color_buf,
        reference_buf,
        dims_buf,
        params_buf,
        pipeline,
        _bind_group_layout: bind_group_layout,
        _shader: shader,
        queue,
        device,
        _adapter: adapter,
        _instance: instance,
    })
}

impl GpuResources {
    /// Dispatch one evaluation, write the image into `canvas` and return the MSE.
    fn evaluate(&self, params: &[f32], circles: usize, canvas: &mut Canvas) -> CircleFitResult<f64> {
        let width = canvas.width();
        let height = canvas.height();
        let pixels = canvas.pixel_count();
        let dims = Dims {
            circle_count: circles as u32,
            width,
            height,
        };
        let groups = (pixels as u64).div_ceil(u64::from(WORKGROUP_SIZE)) as u32;
        let groups_x = groups.clamp(1, MAX_GROUPS_X);
        let groups_y = groups.div_ceil(groups_x).max(1);

        scoped(&self.device, "dispatch", || {
            self.queue
                .write_buffer(&self.params_buf, 0, bytemuck::cast_slice(params));
            self.queue
                .write_buffer(&self.dims_buf, 0, bytemuck::cast_slice(&dims.words()));

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render_cost"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("render_cost"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.dispatch_workgroups(groups_x, groups_y, 1);
            }
            encoder.copy_buffer_to_buffer(
                &self.color_buf,
                0,
                &self.color_staging,
                0,
                self.color_buf.size(),
            );
            encoder.copy_buffer_to_buffer(
                &self.error_buf,
                0,
                &self.error_staging,
                0,
                self.error_buf.size(),
            );
            self.queue.submit(std::iter::once(encoder.finish()));
        })?;

        let color_slice = self.color_staging.slice(..);
        let error_slice = self.error_staging.slice(..);
        let (tx, rx) = mpsc::channel();
        let tx_error = tx.clone();
        color_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        error_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx_error.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| CircleFitError::gpu(format!("wgpu poll failed: {e:?}")))?;
        for _ in 0..2 {
            rx.recv()
                .map_err(|_| CircleFitError::gpu("readback channel closed"))?
                .map_err(|e| CircleFitError::gpu(format!("readback map failed: {e:?}")))?;
        }

        let sum = {
            let color_view = color_slice.get_mapped_range();
            let colors: &[f32] = bytemuck::try_cast_slice(&color_view)
                .map_err(|e| CircleFitError::gpu(format!("color readback: {e}")))?;
            write_canvas(canvas, colors);

            let error_view = error_slice.get_mapped_range();
            let errors: &[f32] = bytemuck::try_cast_slice(&error_view)
                .map_err(|e| CircleFitError::gpu(format!("error readback: {e}")))?;
            errors.iter().map(|&v| f64::from(v)).sum::<f64>()
        };
        self.color_staging.unmap();
        self.error_staging.unmap();

        Ok(sum / (pixels * 3) as f64)
    }
}

fn write_canvas(canvas: &mut Canvas, colors: &[f32]) {
    let width = canvas.width() as usize;
    let stride = canvas.stride();
    let data = canvas.data_mut();
    for (i, px) in colors.chunks_exact(4).enumerate() {
        let off = (i / width) * stride + (i % width) * 4;
        for ch in 0..4 {
            data[off + ch] = (px[ch].clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        }
    }
}

/// wgpu-backed renderer with permanent CPU fallback.
pub struct GpuRenderer {
    resources: Arc<Mutex<Option<GpuResources>>>,
    fallback: CpuRenderer,
    canvas: Canvas,
    upload: Vec<f32>,
    capacity: usize,
    degraded: bool,
    last_hash: u64,
    last_cost: f64,
    last_valid: bool,
}

impl GpuRenderer {
    /// Acquire a device and build the pipeline for up to `k` circles.
    ///
    /// Fails with [`CircleFitError::BackendUnavailable`] when no adapter or device can be
    /// acquired. Any later setup failure yields a renderer that is already degraded.
    pub fn new(reference: Canvas, k: usize) -> CircleFitResult<Self> {
        let handles = acquire_device()?;
        let (resources, degraded) = match build_resources(handles, &reference, k) {
            Ok(res) => (Some(res), false),
            Err(e) => {
                tracing::warn!(reason = %e, "gpu renderer degraded to cpu");
                (None, true)
            }
        };

        Ok(Self {
            resources: Arc::new(Mutex::new(resources)),
            canvas: Canvas::filled_like(&reference, WHITE),
            fallback: CpuRenderer::new(reference, k),
            upload: Vec::with_capacity(k * PARAMS_PER_CIRCLE),
            capacity: k,
            degraded,
            last_hash: 0,
            last_cost: 0.0,
            last_valid: false,
        })
    }

    /// Handle releasing the device objects. Idempotent; later calls on the renderer degrade it.
    pub fn cleanup_handle(&self) -> Cleanup {
        let resources = Arc::clone(&self.resources);
        Cleanup::new(move || {
            let taken = resources
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(res) = taken {
                res.release();
            }
        })
    }

    fn degrade(&mut self, reason: &CircleFitError) {
        self.degraded = true;
        self.last_valid = false;
        tracing::warn!(reason = %reason, "gpu renderer degraded to cpu");
    }

    fn ensure(&mut self, params: &[f64]) -> CircleFitResult<()> {
        let hash = fingerprint(params);
        if self.last_valid && self.last_hash == hash {
            return Ok(());
        }
        self.last_valid = false;

        let circles = circle_count(params);
        if circles == 0 {
            self.canvas.copy_from(self.fallback.background());
            self.last_cost = 0.0;
            self.last_hash = hash;
            self.last_valid = true;
            return Ok(());
        }
        if circles > self.capacity {
            return Err(CircleFitError::gpu(format!(
                "parameter vector holds {circles} circles, renderer capacity is {}",
                self.capacity
            )));
        }

        self.upload.clear();
        for i in 0..circles {
            self.upload.extend_from_slice(&packed_circle(&decode(params, i)));
        }

        let guard = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let res = guard
            .as_ref()
            .ok_or_else(|| CircleFitError::gpu("gpu resources already released"))?;
        let cost = res.evaluate(&self.upload, circles, &mut self.canvas)?;
        drop(guard);

        self.last_cost = cost;
        self.last_hash = hash;
        self.last_valid = true;
        Ok(())
    }
}

// Clamped device layout; circles the CPU would skip are uploaded with zero opacity.
fn packed_circle(c: &crate::params::Circle) -> [f32; PARAMS_PER_CIRCLE] {
    match Paint::from_circle(c) {
        Some(p) => {
            let rgb = p.premul.map(|v| (v / p.alpha) as f32);
            [
                p.cx as f32,
                p.cy as f32,
                p.extent as f32,
                rgb[0],
                rgb[1],
                rgb[2],
                p.alpha as f32,
            ]
        }
        None => [0.0; PARAMS_PER_CIRCLE],
    }
}

impl Renderer for GpuRenderer {
    fn render(&mut self, params: &[f64]) -> &Canvas {
        if !self.degraded {
            match self.ensure(params) {
                Ok(()) => return &self.canvas,
                Err(e) => self.degrade(&e),
            }
        }
        self.fallback.render(params)
    }

    fn cost(&mut self, params: &[f64]) -> f64 {
        if !self.degraded {
            match self.ensure(params) {
                Ok(()) => return self.last_cost,
                Err(e) => self.degrade(&e),
            }
        }
        self.fallback.cost(params)
    }

    fn dim(&self) -> usize {
        self.fallback.dim()
    }

    fn bounds(&self) -> &Bounds {
        self.fallback.bounds()
    }

    fn reference(&self) -> &Canvas {
        self.fallback.reference()
    }

    fn backend(&self) -> BackendId {
        if self.degraded {
            BackendId::Cpu
        } else {
            BackendId::Gpu
        }
    }

    fn is_degraded(&self) -> bool {
        self.degraded
    }
}
